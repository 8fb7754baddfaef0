//! Configuration
//!
//! Shared types, the crate error, and config file handling.

pub mod loader;
pub mod types;

pub use types::{Color, LockConfig, LockError, PhaseColors, Result};
