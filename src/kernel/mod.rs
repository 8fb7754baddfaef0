//! Thin wrappers around Linux kernel primitives.
//!
//! Most `unsafe` code lives here with explicit SAFETY comments. The
//! remaining sites sit next to the code that needs them and carry their own
//! SAFETY comments: the fork points and the `_exit` after them (`auth`,
//! `exec::daemonize`), adopting the ready fd (`exec::readiness`), `poll(2)`
//! (`core::multiplexer`), and the shm memfd and keymap mapping (`wayland`).
//! Dependency direction: pipe -> memlock -> signal -> credentials

pub mod credentials;
pub mod memlock;
pub mod pipe;
pub mod signal;
