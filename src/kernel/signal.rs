//! Async-safe cancellation path for rustlock
//!
//! The handler only writes one byte into a non-blocking self-pipe. All state
//! changes happen later on the main loop when the read end becomes readable.

use log::info;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::sync::atomic::{AtomicI32, Ordering};

use crate::config::types::{LockError, Result};
use crate::kernel::pipe::nonblocking_pipe;

/// Write end of the active cancellation pipe (-1 when none is installed)
static CANCEL_PIPE_WRITE: AtomicI32 = AtomicI32::new(-1);

/// Self-pipe fed by signal handlers and drained by the event loop
pub struct CancellationPipe {
    read: OwnedFd,
    write: OwnedFd,
}

impl CancellationPipe {
    /// Create the pipe without installing any handler
    pub fn new() -> Result<Self> {
        let (read, write) = nonblocking_pipe()?;
        Ok(Self { read, write })
    }

    /// Create the pipe and route the given signals into it
    pub fn install(signals: &[Signal]) -> Result<Self> {
        let pipe = Self::new()?;
        CANCEL_PIPE_WRITE.store(pipe.write.as_raw_fd(), Ordering::SeqCst);

        let sig_action = SigAction::new(
            SigHandler::Handler(Self::signal_handler),
            SaFlags::SA_RESTART,
            SigSet::empty(),
        );

        for sig in signals {
            // SAFETY: the handler only performs an atomic load and write(2),
            // both async-signal-safe.
            unsafe { signal::sigaction(*sig, &sig_action) }.map_err(|e| {
                LockError::Process(format!("Failed to install {} handler: {}", sig, e))
            })?;
        }

        info!("Cancellation handlers installed for {:?}", signals);
        Ok(pipe)
    }

    /// Async-safe signal handler
    /// Only performs an atomic load and a single write - no allocations, no locks
    extern "C" fn signal_handler(_signal: libc::c_int) {
        let fd = CANCEL_PIPE_WRITE.load(Ordering::SeqCst);
        if fd >= 0 {
            // SAFETY: write(2) is async-signal-safe; a full pipe just drops the byte,
            // which is fine because one pending byte already requests cancellation.
            let _ = unsafe { libc::write(fd, b"1".as_ptr() as *const libc::c_void, 1) };
        }
    }

    /// Request cancellation from ordinary (non-signal) context
    pub fn notify(&self) -> Result<()> {
        // SAFETY: write end is owned by self and open.
        let rc = unsafe {
            libc::write(
                self.write.as_raw_fd(),
                b"1".as_ptr() as *const libc::c_void,
                1,
            )
        };
        if rc < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() != std::io::ErrorKind::WouldBlock {
                return Err(err.into());
            }
        }
        Ok(())
    }

    /// Drain pending bytes; returns true if cancellation was requested
    pub fn drain(&self) -> bool {
        let mut requested = false;
        let mut buf = [0u8; 64];
        loop {
            // SAFETY: buf is a valid writable buffer of the given length.
            let n = unsafe {
                libc::read(
                    self.read.as_raw_fd(),
                    buf.as_mut_ptr() as *mut libc::c_void,
                    buf.len(),
                )
            };
            if n <= 0 {
                break;
            }
            requested = true;
        }
        requested
    }

    pub fn read_fd(&self) -> RawFd {
        self.read.as_raw_fd()
    }
}

impl Drop for CancellationPipe {
    fn drop(&mut self) {
        let _ = CANCEL_PIPE_WRITE.compare_exchange(
            self.write.as_raw_fd(),
            -1,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }
}
