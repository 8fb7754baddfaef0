//! Display-protocol seam for the session lock.
//!
//! Incoming protocol traffic is represented as closed event enums, one per
//! protocol object. Outgoing requests go through [`LockBackend`], which the
//! Wayland adapter implements for real and tests implement with a recorder.

use crate::config::types::{Color, Result};

/// Registry name of an output global. Stable for the lifetime of the output.
pub type OutputId = u32;

/// Events on the lock object
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockEvent {
    /// The compositor confirms every output is covered
    Locked,
    /// The lock was refused or ended by the compositor
    Finished,
}

/// Events on an output handle
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutputEvent {
    /// Current pixel size of the output
    Geometry { width: u32, height: u32 },
    Scale(i32),
    Name(String),
    /// End of an atomic batch of output properties
    Done,
}

/// Events on a per-output lock surface
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SurfaceEvent {
    /// Logical size the surface must be drawn at; `serial` has to be acked
    Configure { serial: u32, width: u32, height: u32 },
}

/// One paint request for a lock surface. Sizes are in buffer pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub scale: i32,
    pub fill: Color,
}

/// Requests the lock state machine and surface registry issue
pub trait LockBackend {
    /// Bound output handle
    type Output;
    /// Lock surface plus whatever presentation state hangs off it
    type Surface;

    /// Ask the lock manager for an exclusive lock.
    fn request_lock(&mut self) -> Result<()>;

    /// Create the lock surface for `output`; configure events for it must be
    /// routed back tagged with `id`.
    fn create_lock_surface(&mut self, id: OutputId, output: &Self::Output)
        -> Result<Self::Surface>;

    fn ack_configure(&mut self, surface: &Self::Surface, serial: u32);

    fn present(&mut self, surface: &mut Self::Surface, frame: &Frame) -> Result<()>;

    fn destroy_surface(&mut self, surface: Self::Surface);

    fn release_output(&mut self, output: Self::Output);

    /// Unlock the session and destroy the lock object. Only valid once locked.
    fn unlock_and_destroy(&mut self);

    /// Destroy the lock object without unlocking.
    fn abandon_lock(&mut self);

    /// Push buffered requests to the compositor.
    fn flush(&mut self) -> Result<()>;
}
