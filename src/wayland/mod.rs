//! Wayland adapter: connection handling, protocol dispatch and the
//! shared-memory presenter behind [`LockBackend`](crate::session::LockBackend).

pub mod backend;
pub mod dispatch;
pub mod keyboard;

use std::io::ErrorKind;
use std::os::fd::{AsRawFd, RawFd};

use wayland_client::backend::WaylandError;
use wayland_client::{Connection, EventQueue};

use crate::config::types::{LockError, Result};
use crate::core::context::LockCore;

pub use backend::WaylandBackend;

/// Lock core bound to the Wayland backend; the type every handler runs on.
pub type WaylandCore = LockCore<WaylandBackend>;

fn protocol_error(what: &str, err: impl std::fmt::Display) -> LockError {
    LockError::Protocol(format!("{} failed: {}", what, err))
}

/// A full socket buffer is not an error: the rest goes out on the next
/// flush or roundtrip.
pub(crate) fn flush_outcome(result: std::result::Result<(), WaylandError>) -> Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(WaylandError::Io(e)) if e.kind() == ErrorKind::WouldBlock => Ok(()),
        Err(e) => Err(protocol_error("flush", e)),
    }
}

/// Compositor connection plus the event queue feeding [`WaylandCore`]
pub struct Display {
    conn: Connection,
    queue: EventQueue<WaylandCore>,
}

impl Display {
    /// Connect using `WAYLAND_DISPLAY`/`WAYLAND_SOCKET`.
    pub fn connect() -> Result<(Self, WaylandBackend)> {
        let conn = Connection::connect_to_env().map_err(|e| {
            LockError::Connect(format!(
                "{}. If your compositor is running, check or set the WAYLAND_DISPLAY \
                 environment variable.",
                e
            ))
        })?;
        let queue = conn.new_event_queue();
        let backend = WaylandBackend::new(conn.clone(), queue.handle());
        Ok((Self { conn, queue }, backend))
    }

    /// Bind globals and collect the initial output properties.
    pub fn discover(&mut self, core: &mut WaylandCore) -> Result<()> {
        self.conn
            .display()
            .get_registry(core.backend.queue_handle(), ());
        // First roundtrip binds globals, second delivers output properties.
        self.roundtrip(core)?;
        self.roundtrip(core)?;
        core.backend.check_capabilities()
    }

    pub fn fd(&self) -> RawFd {
        self.conn.backend().poll_fd().as_raw_fd()
    }

    pub fn roundtrip(&mut self, core: &mut WaylandCore) -> Result<()> {
        self.queue
            .roundtrip(core)
            .map_err(|e| protocol_error("wl_display_roundtrip", e))?;
        Ok(())
    }

    /// Dispatch anything already queued and flush outgoing requests. Runs
    /// before every wait so no request sits in the buffer while blocked.
    pub fn prepare(&mut self, core: &mut WaylandCore) -> Result<()> {
        self.queue
            .dispatch_pending(core)
            .map_err(|e| protocol_error("dispatch", e))?;
        flush_outcome(self.queue.flush())
    }

    /// Read whatever the socket holds and dispatch it.
    pub fn read_and_dispatch(&mut self, core: &mut WaylandCore) -> Result<()> {
        if let Some(guard) = self.queue.prepare_read() {
            match guard.read() {
                Ok(_) => {}
                Err(WaylandError::Io(e)) if e.kind() == ErrorKind::WouldBlock => {}
                Err(e) => return Err(protocol_error("read", e)),
            }
        }
        self.queue
            .dispatch_pending(core)
            .map_err(|e| protocol_error("dispatch", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_socket_buffer_is_not_fatal() {
        let would_block = WaylandError::Io(std::io::Error::from(ErrorKind::WouldBlock));
        assert!(flush_outcome(Err(would_block)).is_ok());
        assert!(flush_outcome(Ok(())).is_ok());
    }

    #[test]
    fn test_broken_connection_is_a_protocol_error() {
        let broken = WaylandError::Io(std::io::Error::from(ErrorKind::BrokenPipe));
        let err = flush_outcome(Err(broken)).unwrap_err();
        assert!(matches!(err, LockError::Protocol(_)));
        assert_eq!(err.exit_code(), 2);
    }
}
