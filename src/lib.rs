//! rustlock: a Wayland session locker with a privilege-separated credential verifier
//! Built on `ext-session-lock-v1`: the compositor keeps the session locked until
//! the locker explicitly unlocks it, even if the locker dies.
//!
//! # Architecture
//!
//! ## Kernel Primitives ([`kernel`])
//! - [`kernel::memlock`]: Pinned, zeroized credential buffer
//! - [`kernel::signal`]: Signal-to-pipe cancellation
//! - [`kernel::credentials`]: Dropping set-uid/set-gid privileges
//!
//! ## Event Loop ([`core`])
//! - [`core::multiplexer`]: Readiness-based descriptor multiplexer
//! - [`core::context`]: Lock core driving session, surfaces and auth state
//!
//! ## Authentication ([`auth`])
//! - [`auth::channel`]: Pipes to the verifier subprocess
//! - [`auth::worker`]: The verifier subprocess loop
//! - [`auth::wire`]: Request framing and verdict bytes
//! - [`auth::verifier`]: Argon2 hash verification
//! - [`auth::state`]: Input buffering and the auth phase machine
//!
//! ## Session Lock ([`session`])
//! - [`session::lock`]: Lock negotiation state machine
//! - [`session::registry`]: One lock surface per output
//! - [`session::protocol`]: Backend trait and protocol events
//!
//! ## Display Adapter ([`wayland`])
//! - [`wayland::backend`]: Shared-memory presenter and protocol objects
//! - [`wayland::dispatch`]: Event routing into the lock core
//! - [`wayland::keyboard`]: xkb keymap and key translation
//!
//! ## Process Control ([`exec`])
//! - [`exec::lock_loop`]: Main loop
//! - [`exec::readiness`]: Ready-fd notification
//! - [`exec::daemonize`]: Detaching after lock
//!
//! ## Configuration ([`config`])
//! - [`config::types`]: Shared types, error and exit codes
//! - [`config::loader`]: Config file discovery
//!
//! # Design Principles
//!
//! 1. **The compositor is the safety barrier** - Crashing never unlocks
//! 2. **Credentials are held in pinned memory** - Wiped on every transition
//! 3. **Minimal privilege** - Only the verifier keeps elevated rights
//! 4. **Minimal unsafe** - Thin wrappers with explicit preconditions

// Kernel Primitives
pub mod kernel;

// Event Loop
pub mod core;

// Authentication
pub mod auth;

// Session Lock
pub mod session;

// Display Adapter
pub mod wayland;

// Process Control
pub mod exec;

// Configuration
pub mod config;

// CLI entrypoint
pub mod cli;

// Re-export commonly used types for convenience
pub use config::types::*;
