//! Process control around the lock: the main loop, readiness notification
//! and detaching from the terminal.

pub mod daemonize;
pub mod lock_loop;
pub mod readiness;

pub use lock_loop::{run_lock_loop, LockRuntime};
