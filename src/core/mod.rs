//! Event loop and the state it drives.
//!
//! The multiplexer owns descriptor scheduling; the context owns every
//! piece of lock and auth state. Neither knows about the display library.

pub mod context;
pub mod multiplexer;
pub mod types;

pub use context::{ExitReason, LockCore};
pub use multiplexer::{EventMultiplexer, LoopControl};
pub use types::Readiness;
