//! Single-threaded readiness multiplexer.
//!
//! One `poll(2)` per [`EventMultiplexer::run_once`]; every source whose
//! interest (or an always-reported hang-up/error) matches is dispatched in
//! registration order. Callbacks run to completion and must not block.
//! Table changes requested from inside a callback go through
//! [`LoopControl`] and take effect after the current dispatch pass.

use std::os::unix::io::RawFd;
use std::time::Duration;

use crate::config::types::{LockError, Result};
use crate::core::types::Readiness;

/// Boxed source callback. Receives the shared context, a handle for deferred
/// table changes, and the readiness the kernel reported.
pub type Callback<C> = Box<dyn FnMut(&mut C, &mut LoopControl<C>, Readiness) -> Result<()>>;

struct Source<C> {
    fd: RawFd,
    interest: Readiness,
    callback: Callback<C>,
}

/// Deferred registration changes requested by callbacks
pub struct LoopControl<C> {
    added: Vec<Source<C>>,
    removed: Vec<RawFd>,
}

impl<C> LoopControl<C> {
    fn new() -> Self {
        Self {
            added: Vec::new(),
            removed: Vec::new(),
        }
    }

    /// Register a source starting with the next iteration.
    pub fn register<F>(&mut self, fd: RawFd, interest: Readiness, callback: F)
    where
        F: FnMut(&mut C, &mut LoopControl<C>, Readiness) -> Result<()> + 'static,
    {
        self.added.push(Source {
            fd,
            interest,
            callback: Box::new(callback),
        });
    }

    /// Deregister a source. It is not dispatched again, not even later in
    /// the current pass.
    pub fn deregister(&mut self, fd: RawFd) {
        self.removed.push(fd);
    }

    fn is_removed(&self, fd: RawFd) -> bool {
        self.removed.contains(&fd)
    }
}

/// Readiness-driven scheduler over a small fixed set of descriptors
pub struct EventMultiplexer<C> {
    sources: Vec<Source<C>>,
    control: LoopControl<C>,
}

impl<C> Default for EventMultiplexer<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> EventMultiplexer<C> {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            control: LoopControl::new(),
        }
    }

    /// Register `callback` for `fd`. A descriptor registered twice is
    /// dispatched once per registration.
    pub fn register<F>(&mut self, fd: RawFd, interest: Readiness, callback: F)
    where
        F: FnMut(&mut C, &mut LoopControl<C>, Readiness) -> Result<()> + 'static,
    {
        self.sources.push(Source {
            fd,
            interest,
            callback: Box::new(callback),
        });
    }

    /// Remove every registration for `fd`. Returns whether any existed.
    pub fn deregister(&mut self, fd: RawFd) -> bool {
        let before = self.sources.len();
        self.sources.retain(|source| source.fd != fd);
        self.sources.len() != before
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Wait once for readiness and dispatch.
    ///
    /// `None` waits indefinitely. An interrupted wait (`EINTR`) returns
    /// without dispatching; any other poll failure is fatal. The first
    /// callback error aborts the pass and is returned.
    pub fn run_once(&mut self, ctx: &mut C, timeout: Option<Duration>) -> Result<()> {
        let mut pollfds: Vec<libc::pollfd> = self
            .sources
            .iter()
            .map(|source| libc::pollfd {
                fd: source.fd,
                events: source.interest.0,
                revents: 0,
            })
            .collect();

        let timeout_ms = match timeout {
            Some(duration) => duration.as_millis().min(libc::c_int::MAX as u128) as libc::c_int,
            None => -1,
        };

        // SAFETY: pollfds is a valid, exclusively borrowed array of pollfd.
        let rc = unsafe {
            libc::poll(
                pollfds.as_mut_ptr(),
                pollfds.len() as libc::nfds_t,
                timeout_ms,
            )
        };
        if rc < 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                return Ok(());
            }
            return Err(LockError::Multiplexer(format!("poll failed: {}", err)));
        }

        let result = self.dispatch(ctx, &pollfds);
        self.apply_pending();
        result
    }

    fn dispatch(&mut self, ctx: &mut C, pollfds: &[libc::pollfd]) -> Result<()> {
        for (source, pollfd) in self.sources.iter_mut().zip(pollfds) {
            let revents = Readiness(pollfd.revents);
            if !revents.intersects(source.interest | Readiness::ALWAYS) {
                continue;
            }
            if self.control.is_removed(source.fd) {
                continue;
            }
            (source.callback)(ctx, &mut self.control, revents)?;
        }
        Ok(())
    }

    fn apply_pending(&mut self) {
        for fd in std::mem::take(&mut self.control.removed) {
            self.deregister(fd);
        }
        self.sources.append(&mut self.control.added);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::pipe::nonblocking_pipe;
    use std::os::fd::AsRawFd;

    fn write_byte(fd: RawFd) {
        // SAFETY: fd is an open pipe write end owned by the test.
        let n = unsafe { libc::write(fd, b"x".as_ptr() as *const libc::c_void, 1) };
        assert_eq!(n, 1);
    }

    #[test]
    fn timeout_without_readiness_dispatches_nothing() {
        let (read, _write) = nonblocking_pipe().unwrap();
        let mut mux: EventMultiplexer<Vec<&'static str>> = EventMultiplexer::new();
        mux.register(read.as_raw_fd(), Readiness::READABLE, |log, _, _| {
            log.push("read");
            Ok(())
        });
        let mut log = Vec::new();
        mux.run_once(&mut log, Some(Duration::from_millis(0))).unwrap();
        assert!(log.is_empty());
    }

    #[test]
    fn ready_sources_dispatch_in_registration_order() {
        let (a_read, a_write) = nonblocking_pipe().unwrap();
        let (b_read, b_write) = nonblocking_pipe().unwrap();
        let mut mux: EventMultiplexer<Vec<char>> = EventMultiplexer::new();
        mux.register(b_read.as_raw_fd(), Readiness::READABLE, |log, _, _| {
            log.push('b');
            Ok(())
        });
        mux.register(a_read.as_raw_fd(), Readiness::READABLE, |log, _, _| {
            log.push('a');
            Ok(())
        });
        write_byte(a_write.as_raw_fd());
        write_byte(b_write.as_raw_fd());

        let mut log = Vec::new();
        mux.run_once(&mut log, Some(Duration::from_millis(100))).unwrap();
        assert_eq!(log, vec!['b', 'a']);
    }

    #[test]
    fn hangup_is_reported_without_interest() {
        let (read, write) = nonblocking_pipe().unwrap();
        drop(write);
        let mut mux: EventMultiplexer<Option<Readiness>> = EventMultiplexer::new();
        mux.register(read.as_raw_fd(), Readiness::NONE, |seen, _, readiness| {
            *seen = Some(readiness);
            Ok(())
        });
        let mut seen = None;
        mux.run_once(&mut seen, Some(Duration::from_millis(100))).unwrap();
        assert!(seen.expect("hang-up dispatched").is_hangup());
    }

    #[test]
    fn callback_error_propagates() {
        let (read, write) = nonblocking_pipe().unwrap();
        write_byte(write.as_raw_fd());
        let mut mux: EventMultiplexer<()> = EventMultiplexer::new();
        mux.register(read.as_raw_fd(), Readiness::READABLE, |_, _, _| {
            Err(LockError::Multiplexer("boom".into()))
        });
        let err = mux.run_once(&mut (), Some(Duration::from_millis(100))).unwrap_err();
        assert!(matches!(err, LockError::Multiplexer(_)));
    }

    #[test]
    fn deferred_deregistration_skips_rest_of_pass() {
        let (a_read, a_write) = nonblocking_pipe().unwrap();
        let (b_read, b_write) = nonblocking_pipe().unwrap();
        let b_fd = b_read.as_raw_fd();
        let mut mux: EventMultiplexer<Vec<char>> = EventMultiplexer::new();
        mux.register(a_read.as_raw_fd(), Readiness::READABLE, move |log, control, _| {
            log.push('a');
            control.deregister(b_fd);
            Ok(())
        });
        mux.register(b_fd, Readiness::READABLE, |log, _, _| {
            log.push('b');
            Ok(())
        });
        write_byte(a_write.as_raw_fd());
        write_byte(b_write.as_raw_fd());

        let mut log = Vec::new();
        mux.run_once(&mut log, Some(Duration::from_millis(100))).unwrap();
        assert_eq!(log, vec!['a']);
        assert_eq!(mux.len(), 1);
    }

    #[test]
    fn deferred_registration_applies_next_iteration() {
        let (a_read, a_write) = nonblocking_pipe().unwrap();
        let (b_read, b_write) = nonblocking_pipe().unwrap();
        let b_fd = b_read.as_raw_fd();
        let mut registered = false;
        let mut mux: EventMultiplexer<Vec<char>> = EventMultiplexer::new();
        mux.register(a_read.as_raw_fd(), Readiness::READABLE, move |log, control, _| {
            log.push('a');
            if !registered {
                registered = true;
                control.register(b_fd, Readiness::READABLE, |log, _, _| {
                    log.push('b');
                    Ok(())
                });
            }
            Ok(())
        });
        write_byte(a_write.as_raw_fd());
        write_byte(b_write.as_raw_fd());

        let mut log = Vec::new();
        mux.run_once(&mut log, Some(Duration::from_millis(100))).unwrap();
        assert_eq!(log, vec!['a']);
        assert_eq!(mux.len(), 2);

        mux.run_once(&mut log, Some(Duration::from_millis(100))).unwrap();
        assert_eq!(log, vec!['a', 'a', 'b']);
    }
}
