//! Protocol event routing into [`LockCore`](crate::core::LockCore).
//!
//! Each handler converts the raw event into the crate's closed event types
//! and hands it to the core; nothing here keeps state of its own.

use wayland_client::protocol::{
    wl_buffer, wl_compositor, wl_keyboard, wl_output, wl_registry, wl_seat, wl_shm, wl_shm_pool,
    wl_surface,
};
use wayland_client::{delegate_noop, Connection, Dispatch, Proxy, QueueHandle, WEnum};
use wayland_protocols::ext::session_lock::v1::client::{
    ext_session_lock_manager_v1, ext_session_lock_surface_v1, ext_session_lock_v1,
};
use zeroize::Zeroize;

use crate::auth::state::InputEvent;
use crate::session::protocol::{LockEvent, OutputEvent, OutputId, SurfaceEvent};
use crate::wayland::keyboard::KeyAction;
use crate::wayland::WaylandCore;

const COMPOSITOR_VERSION: u32 = 4;
const OUTPUT_MAX_VERSION: u32 = 4;
const SEAT_MAX_VERSION: u32 = 4;

impl Dispatch<wl_registry::WlRegistry, ()> for WaylandCore {
    fn event(
        state: &mut Self,
        registry: &wl_registry::WlRegistry,
        event: wl_registry::Event,
        _: &(),
        _: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        match event {
            wl_registry::Event::Global {
                name,
                interface,
                version,
            } => match interface.as_str() {
                "wl_compositor" => {
                    if version < COMPOSITOR_VERSION {
                        log::debug!("wl_compositor v{} is too old", version);
                        return;
                    }
                    state.backend.compositor =
                        Some(registry.bind(name, COMPOSITOR_VERSION, qh, ()));
                }
                "wl_shm" => state.backend.shm = Some(registry.bind(name, 1, qh, ())),
                "ext_session_lock_manager_v1" => {
                    state.backend.lock_manager = Some(registry.bind(name, 1, qh, ()));
                }
                "wl_seat" => {
                    if state.backend.seat.is_none() {
                        state.backend.seat =
                            Some(registry.bind(name, version.min(SEAT_MAX_VERSION), qh, ()));
                    }
                }
                "wl_output" => {
                    let output: wl_output::WlOutput =
                        registry.bind(name, version.min(OUTPUT_MAX_VERSION), qh, name);
                    log::debug!("Output {} announced", name);
                    state.on_output_added(name, output);
                }
                _ => {}
            },
            wl_registry::Event::GlobalRemove { name } => state.on_output_removed(name),
            _ => {}
        }
    }
}

impl Dispatch<wl_output::WlOutput, OutputId> for WaylandCore {
    fn event(
        state: &mut Self,
        _: &wl_output::WlOutput,
        event: wl_output::Event,
        id: &OutputId,
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        let event = match event {
            wl_output::Event::Mode {
                flags: WEnum::Value(flags),
                width,
                height,
                ..
            } if flags.contains(wl_output::Mode::Current) => OutputEvent::Geometry {
                width: width.max(0) as u32,
                height: height.max(0) as u32,
            },
            wl_output::Event::Scale { factor } => OutputEvent::Scale(factor),
            wl_output::Event::Name { name } => OutputEvent::Name(name),
            wl_output::Event::Done => OutputEvent::Done,
            _ => return,
        };
        state.on_output_event(*id, event);
    }
}

impl Dispatch<ext_session_lock_v1::ExtSessionLockV1, ()> for WaylandCore {
    fn event(
        state: &mut Self,
        _: &ext_session_lock_v1::ExtSessionLockV1,
        event: ext_session_lock_v1::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        match event {
            ext_session_lock_v1::Event::Locked => state.on_lock_event(LockEvent::Locked),
            ext_session_lock_v1::Event::Finished => state.on_lock_event(LockEvent::Finished),
            _ => {}
        }
    }
}

impl Dispatch<ext_session_lock_surface_v1::ExtSessionLockSurfaceV1, OutputId> for WaylandCore {
    fn event(
        state: &mut Self,
        _: &ext_session_lock_surface_v1::ExtSessionLockSurfaceV1,
        event: ext_session_lock_surface_v1::Event,
        id: &OutputId,
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let ext_session_lock_surface_v1::Event::Configure {
            serial,
            width,
            height,
        } = event
        {
            state.on_surface_event(
                *id,
                SurfaceEvent::Configure {
                    serial,
                    width,
                    height,
                },
            );
        }
    }
}

impl Dispatch<wl_seat::WlSeat, ()> for WaylandCore {
    fn event(
        state: &mut Self,
        seat: &wl_seat::WlSeat,
        event: wl_seat::Event,
        _: &(),
        _: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        let wl_seat::Event::Capabilities {
            capabilities: WEnum::Value(capabilities),
        } = event
        else {
            return;
        };
        let has_keyboard = capabilities.contains(wl_seat::Capability::Keyboard);
        match (has_keyboard, state.backend.keyboard.take()) {
            (true, None) => {
                log::debug!("Binding seat keyboard");
                state.backend.keyboard = Some(seat.get_keyboard(qh, ()));
            }
            (false, Some(keyboard)) => {
                log::debug!("Seat lost its keyboard");
                if keyboard.version() >= 3 {
                    keyboard.release();
                }
            }
            (_, current) => state.backend.keyboard = current,
        }
    }
}

impl Dispatch<wl_keyboard::WlKeyboard, ()> for WaylandCore {
    fn event(
        state: &mut Self,
        _: &wl_keyboard::WlKeyboard,
        event: wl_keyboard::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        match event {
            wl_keyboard::Event::Keymap { format, fd, size } => match format {
                WEnum::Value(wl_keyboard::KeymapFormat::XkbV1) => {
                    match state.backend.xkb.load_keymap(fd, size) {
                        Ok(()) => log::debug!("Keymap loaded ({} bytes)", size),
                        Err(e) => log::error!("Keymap rejected, keys stay ignored: {}", e),
                    }
                }
                other => log::warn!("Unsupported keymap format {:?}; keys stay ignored", other),
            },
            wl_keyboard::Event::Modifiers {
                mods_depressed,
                mods_latched,
                mods_locked,
                group,
                ..
            } => {
                state
                    .backend
                    .xkb
                    .update_modifiers(mods_depressed, mods_latched, mods_locked, group);
            }
            wl_keyboard::Event::Key {
                key,
                state: WEnum::Value(wl_keyboard::KeyState::Pressed),
                ..
            } => match state.backend.xkb.key(key) {
                Some(KeyAction::Text(ch)) => {
                    let mut utf8 = [0u8; 4];
                    let len = ch.encode_utf8(&mut utf8).len();
                    state.on_input(InputEvent::Insert(&utf8[..len]));
                    utf8.zeroize();
                }
                Some(KeyAction::Backspace) => state.on_input(InputEvent::Backspace),
                Some(KeyAction::Clear) => state.on_input(InputEvent::Clear),
                Some(KeyAction::Submit) => state.on_input(InputEvent::Submit),
                None => {}
            },
            _ => {}
        }
    }
}

delegate_noop!(WaylandCore: wl_compositor::WlCompositor);
delegate_noop!(WaylandCore: wl_shm_pool::WlShmPool);
delegate_noop!(WaylandCore: ext_session_lock_manager_v1::ExtSessionLockManagerV1);
delegate_noop!(WaylandCore: ignore wl_shm::WlShm);
delegate_noop!(WaylandCore: ignore wl_buffer::WlBuffer);
delegate_noop!(WaylandCore: ignore wl_surface::WlSurface);
