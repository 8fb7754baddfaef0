//! Key translation for credential entry.
//!
//! The compositor's keymap is compiled with xkbcommon and an `xkb::State`
//! follows `wl_keyboard.modifiers`, so the active layout and locked
//! modifiers resolve the same way they do for every other client.

use std::os::fd::OwnedFd;

use xkbcommon::xkb;
use xkbcommon::xkb::keysyms;

use crate::config::types::{LockError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyAction {
    Text(char),
    Backspace,
    Clear,
    Submit,
}

/// Map a resolved keysym to an editing action.
///
/// `codepoint` is the UTF-32 text the key produces in the current state, 0
/// when it produces none. With Control held only Ctrl+U and Ctrl+C do
/// anything.
pub fn classify(sym: u32, ctrl: bool, codepoint: u32) -> Option<KeyAction> {
    match sym {
        keysyms::KEY_Return | keysyms::KEY_KP_Enter => return Some(KeyAction::Submit),
        keysyms::KEY_BackSpace | keysyms::KEY_Delete => return Some(KeyAction::Backspace),
        keysyms::KEY_Escape => return Some(KeyAction::Clear),
        _ => {}
    }
    if ctrl {
        return match sym {
            keysyms::KEY_u | keysyms::KEY_U | keysyms::KEY_c | keysyms::KEY_C => {
                Some(KeyAction::Clear)
            }
            _ => None,
        };
    }
    char::from_u32(codepoint)
        .filter(|ch| *ch != '\0' && !ch.is_control())
        .map(KeyAction::Text)
}

/// Keymap and modifier state for the seat keyboard
pub struct Keyboard {
    context: xkb::Context,
    state: Option<xkb::State>,
}

impl Default for Keyboard {
    fn default() -> Self {
        Self::new()
    }
}

impl Keyboard {
    pub fn new() -> Self {
        Self {
            context: xkb::Context::new(xkb::CONTEXT_NO_FLAGS),
            state: None,
        }
    }

    pub fn has_keymap(&self) -> bool {
        self.state.is_some()
    }

    /// Compile the `xkb_v1` keymap the compositor shared. Replaces any
    /// earlier keymap and resets modifier state.
    pub fn load_keymap(&mut self, fd: OwnedFd, size: u32) -> Result<()> {
        // SAFETY: the fd is a keymap of `size` bytes; xkbcommon maps it
        // privately and read-only and never keeps the mapping.
        let keymap = unsafe {
            xkb::Keymap::new_from_fd(
                &self.context,
                fd,
                size as usize,
                xkb::KEYMAP_FORMAT_TEXT_V1,
                xkb::KEYMAP_COMPILE_NO_FLAGS,
            )
        }
        .map_err(|e| LockError::Protocol(format!("mapping keymap failed: {}", e)))?
        .ok_or_else(|| LockError::Protocol("keymap failed to compile".into()))?;
        self.state = Some(xkb::State::new(&keymap));
        Ok(())
    }

    pub fn update_modifiers(&mut self, depressed: u32, latched: u32, locked: u32, group: u32) {
        if let Some(state) = self.state.as_mut() {
            state.update_mask(depressed, latched, locked, 0, 0, group);
        }
    }

    /// Translate a pressed evdev keycode. Keys without a meaning for
    /// credential entry, and every key before a keymap arrives, yield `None`.
    pub fn key(&self, key: u32) -> Option<KeyAction> {
        let Some(state) = self.state.as_ref() else {
            log::debug!("Key {} pressed before any keymap arrived; ignored", key);
            return None;
        };
        // Wayland sends evdev codes; xkb codes are offset by 8.
        let code = xkb::Keycode::new(key.saturating_add(8));
        let sym = state.key_get_one_sym(code).raw();
        let ctrl = state.mod_name_is_active(xkb::MOD_NAME_CTRL, xkb::STATE_MODS_EFFECTIVE);
        classify(sym, ctrl, state.key_get_utf32(code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const KEY_ESC: u32 = 1;
    const KEY_Y: u32 = 21;
    const KEY_ENTER: u32 = 28;
    const KEY_A: u32 = 30;
    const KEY_LEFTSHIFT: u32 = 42;
    const KEY_Z: u32 = 44;
    const KEY_102ND: u32 = 86;

    /// Compile a layout from the system's xkb data and hand it over through
    /// an fd, the way a compositor does. `None` when the data is missing.
    fn keyboard_for(layout: &str) -> Option<(Keyboard, xkb::Keymap)> {
        let context = xkb::Context::new(xkb::CONTEXT_NO_FLAGS);
        let keymap = xkb::Keymap::new_from_names(
            &context,
            "evdev",
            "pc105",
            layout,
            "",
            None,
            xkb::KEYMAP_COMPILE_NO_FLAGS,
        )?;
        let text = keymap.get_as_string(xkb::KEYMAP_FORMAT_TEXT_V1);
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file.write_all(&[0]).unwrap();

        let mut keyboard = Keyboard::new();
        keyboard
            .load_keymap(OwnedFd::from(file), text.len() as u32 + 1)
            .unwrap();
        Some((keyboard, keymap))
    }

    fn mask(keymap: &xkb::Keymap, name: &str) -> u32 {
        1 << keymap.mod_get_index(name)
    }

    #[test]
    fn editing_keysyms() {
        assert_eq!(classify(keysyms::KEY_Return, false, 13), Some(KeyAction::Submit));
        assert_eq!(classify(keysyms::KEY_KP_Enter, false, 13), Some(KeyAction::Submit));
        assert_eq!(classify(keysyms::KEY_BackSpace, false, 8), Some(KeyAction::Backspace));
        assert_eq!(classify(keysyms::KEY_Escape, false, 27), Some(KeyAction::Clear));
        assert_eq!(classify(keysyms::KEY_u, true, 21), Some(KeyAction::Clear));
        assert_eq!(classify(keysyms::KEY_c, true, 3), Some(KeyAction::Clear));
        assert_eq!(classify(keysyms::KEY_a, true, 1), None);
    }

    #[test]
    fn text_comes_from_the_codepoint() {
        assert_eq!(classify(keysyms::KEY_a, false, 'a' as u32), Some(KeyAction::Text('a')));
        assert_eq!(
            classify(keysyms::KEY_eacute, false, 'é' as u32),
            Some(KeyAction::Text('é'))
        );
        assert_eq!(classify(keysyms::KEY_Shift_L, false, 0), None);
        assert_eq!(classify(keysyms::KEY_Tab, false, '\t' as u32), None);
    }

    #[test]
    fn keys_before_a_keymap_are_ignored() {
        let keyboard = Keyboard::new();
        assert!(!keyboard.has_keymap());
        assert_eq!(keyboard.key(KEY_A), None);
        assert_eq!(keyboard.key(KEY_ENTER), None);
    }

    #[test]
    fn us_layout_follows_shift_and_caps_lock() {
        let Some((mut keyboard, keymap)) = keyboard_for("us") else {
            return;
        };
        assert_eq!(keyboard.key(KEY_A), Some(KeyAction::Text('a')));
        assert_eq!(keyboard.key(KEY_ENTER), Some(KeyAction::Submit));
        assert_eq!(keyboard.key(KEY_ESC), Some(KeyAction::Clear));
        assert_eq!(keyboard.key(KEY_LEFTSHIFT), None);

        keyboard.update_modifiers(mask(&keymap, xkb::MOD_NAME_SHIFT), 0, 0, 0);
        assert_eq!(keyboard.key(KEY_A), Some(KeyAction::Text('A')));

        keyboard.update_modifiers(0, 0, mask(&keymap, xkb::MOD_NAME_CAPS), 0);
        assert_eq!(keyboard.key(KEY_A), Some(KeyAction::Text('A')));

        keyboard.update_modifiers(mask(&keymap, xkb::MOD_NAME_CTRL), 0, 0, 0);
        assert_eq!(keyboard.key(KEY_A), None);
    }

    #[test]
    fn german_layout_swaps_y_and_z() {
        let Some((keyboard, _)) = keyboard_for("de") else {
            return;
        };
        assert_eq!(keyboard.key(KEY_Y), Some(KeyAction::Text('z')));
        assert_eq!(keyboard.key(KEY_Z), Some(KeyAction::Text('y')));
        assert_eq!(keyboard.key(KEY_102ND), Some(KeyAction::Text('<')));
    }
}
