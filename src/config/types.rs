/// Core types shared across the rustlock crate
use serde::{Deserialize, Serialize};
use std::os::unix::io::RawFd;
use std::path::PathBuf;
use thiserror::Error;

use crate::kernel::memlock::BufferError;

/// Hard ceiling on credential length, in bytes.
pub const DEFAULT_MAX_CREDENTIAL_LEN: usize = 1024;

/// Initial credential buffer allocation; grows on demand up to the ceiling.
pub const DEFAULT_INITIAL_CREDENTIAL_LEN: usize = 128;

/// Exit code for a clean unlock (credential success, cancellation, compositor unlock).
pub const EXIT_CLEAN: i32 = 0;

/// Exit code for startup failures (missing protocol capability, bad configuration).
pub const EXIT_STARTUP: i32 = 1;

/// Exit code for lock rejection and fatal runtime failures.
pub const EXIT_FATAL: i32 = 2;

/// RGBA color in `0xRRGGBBAA` form.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color(pub u32);

impl Color {
    pub const WHITE: Color = Color(0xFFFF_FFFF);

    /// Parse `rrggbb` or `rrggbbaa` with an optional leading `#`.
    ///
    /// Anything else yields opaque white, matching how the lock screen has
    /// always treated malformed colors.
    pub fn parse_lenient(input: &str) -> Color {
        let digits = input.strip_prefix('#').unwrap_or(input);
        let parsed = match digits.len() {
            6 => u32::from_str_radix(digits, 16).ok().map(|rgb| (rgb << 8) | 0xFF),
            8 => u32::from_str_radix(digits, 16).ok(),
            _ => None,
        };
        match parsed {
            Some(value) => Color(value),
            None => {
                log::debug!("Invalid color {}, defaulting to 0xFFFFFFFF", input);
                Color::WHITE
            }
        }
    }

    /// Pixel value for an XRGB8888 buffer. Alpha is dropped: lock surfaces are opaque.
    pub fn xrgb(self) -> u32 {
        self.0 >> 8
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// Fill colors per authentication phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseColors {
    pub background: Color,
    pub verifying: Color,
    pub wrong: Color,
    pub cleared: Color,
}

impl Default for PhaseColors {
    fn default() -> Self {
        Self {
            background: Color(0xA3A3_A3FF),
            verifying: Color(0x0072_FFC0),
            wrong: Color(0xFA00_00C0),
            cleared: Color(0xE5A4_45C0),
        }
    }
}

/// Effective lock configuration after merging the config file and command line.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LockConfig {
    /// Enable debug logging
    pub debug: bool,
    /// Skip verification when the credential buffer is empty
    pub ignore_empty_password: bool,
    /// Detach from the controlling terminal once locked
    pub daemonize: bool,
    /// Descriptor written once and closed when the session is locked
    pub ready_fd: Option<RawFd>,
    /// Argon2 PHC hash consulted by the verifier subprocess
    pub password_hash_file: Option<PathBuf>,
    /// Fill colors
    pub colors: PhaseColors,
    /// Credential length ceiling in bytes
    pub max_credential_len: usize,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            debug: false,
            ignore_empty_password: false,
            daemonize: false,
            ready_fd: None,
            password_hash_file: None,
            colors: PhaseColors::default(),
            max_credential_len: DEFAULT_MAX_CREDENTIAL_LEN,
        }
    }
}

/// Rustlock error types
#[derive(Error, Debug)]
pub enum LockError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unable to connect to the compositor: {0}")]
    Connect(String),

    #[error("Missing {0}")]
    MissingCapability(String),

    #[error("Failed to lock session -- is another lockscreen running?")]
    LockRejected,

    #[error("Display protocol error: {0}")]
    Protocol(String),

    #[error("Password checking subprocess crashed: {0}")]
    AuthChannelCrash(String),

    #[error("Malformed verdict byte {0:#04x} from password checking subprocess")]
    MalformedVerdict(u8),

    #[error("Verdict received while no verification was in flight")]
    UnexpectedVerdict,

    #[error("Event loop failure: {0}")]
    Multiplexer(String),

    #[error("Credential buffer error: {0}")]
    Buffer(#[from] BufferError),

    #[error("Privilege error: {0}")]
    Privilege(String),

    #[error("Process error: {0}")]
    Process(String),
}

impl LockError {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            LockError::Config(_)
            | LockError::Connect(_)
            | LockError::MissingCapability(_)
            | LockError::Privilege(_)
            | LockError::Buffer(_) => EXIT_STARTUP,
            LockError::Io(_)
            | LockError::LockRejected
            | LockError::Protocol(_)
            | LockError::AuthChannelCrash(_)
            | LockError::MalformedVerdict(_)
            | LockError::UnexpectedVerdict
            | LockError::Multiplexer(_)
            | LockError::Process(_) => EXIT_FATAL,
        }
    }
}

pub type Result<T> = std::result::Result<T, LockError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn six_digit_color_gets_opaque_alpha() {
        assert_eq!(Color::parse_lenient("a3a3a3"), Color(0xA3A3A3FF));
        assert_eq!(Color::parse_lenient("#0072ff"), Color(0x0072FFFF));
    }

    #[test]
    fn eight_digit_color_keeps_alpha() {
        assert_eq!(Color::parse_lenient("fa0000c0"), Color(0xFA0000C0));
    }

    #[test]
    fn malformed_color_falls_back_to_white() {
        assert_eq!(Color::parse_lenient("red"), Color::WHITE);
        assert_eq!(Color::parse_lenient("zzzzzz"), Color::WHITE);
        assert_eq!(Color::parse_lenient(""), Color::WHITE);
    }

    #[test]
    fn xrgb_drops_alpha() {
        assert_eq!(Color(0x11223344).xrgb(), 0x00112233);
    }

    #[test]
    fn exit_codes_follow_failure_class() {
        assert_eq!(LockError::MissingCapability("wl_shm".into()).exit_code(), 1);
        assert_eq!(LockError::LockRejected.exit_code(), 2);
        assert_eq!(LockError::AuthChannelCrash("eof".into()).exit_code(), 2);
        assert_eq!(LockError::MalformedVerdict(7).exit_code(), 2);
    }

    #[test]
    fn lock_rejected_message_names_likely_cause() {
        let msg = LockError::LockRejected.to_string();
        assert!(msg.contains("another lockscreen"));
    }
}
