//! Session lock negotiation and per-output lock surfaces.

pub mod lock;
pub mod protocol;
pub mod registry;

pub use lock::{LockPhase, LockTransition, SessionLockClient, Termination};
pub use protocol::{Frame, LockBackend, LockEvent, OutputEvent, OutputId, SurfaceEvent};
pub use registry::{OutputSurface, SurfaceRegistry};
