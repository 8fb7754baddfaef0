//! UID/GID handling for the unprivileged locking process.
//!
//! CRITICAL: setresgid MUST be called BEFORE setresuid.

mod transition;
mod validation;

pub use transition::{drop_elevated_privileges, ProcessIds};
pub use validation::verify_cannot_regain;
