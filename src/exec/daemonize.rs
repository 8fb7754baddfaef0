//! Detach from the invoking terminal once the session is locked.
//!
//! The parent blocks until the detached child reports that it finished
//! setting itself up, then exits without running destructors: the child
//! owns the lock, the verifier pipes and the compositor connection from
//! here on.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::fd::AsRawFd;

use nix::unistd::{dup2, fork, setsid, ForkResult};

use crate::config::types::{LockError, Result, EXIT_CLEAN, EXIT_STARTUP};
use crate::kernel::pipe::cloexec_pipe;

const SETUP_OK: u8 = 1;
const SETUP_FAILED: u8 = 0;

fn child_setup() -> Result<()> {
    setsid().map_err(|e| LockError::Process(format!("setsid failed: {}", e)))?;
    let devnull = OpenOptions::new().read(true).write(true).open("/dev/null")?;
    for target in [libc::STDOUT_FILENO, libc::STDERR_FILENO] {
        dup2(devnull.as_raw_fd(), target)
            .map_err(|e| LockError::Process(format!("dup2({}) failed: {}", target, e)))?;
    }
    std::env::set_current_dir("/")?;
    Ok(())
}

/// Fork into the background. Returns only in the detached child.
pub fn daemonize() -> Result<()> {
    let (read, write) = cloexec_pipe()?;
    let mut status_read = File::from(read);
    let mut status_write = File::from(write);

    // SAFETY: the process is single-threaded at this point.
    match unsafe { fork() }.map_err(|e| LockError::Process(format!("fork failed: {}", e)))? {
        ForkResult::Child => {
            drop(status_read);
            let outcome = child_setup();
            let byte = if outcome.is_ok() { SETUP_OK } else { SETUP_FAILED };
            status_write.write_all(&[byte])?;
            drop(status_write);
            outcome
        }
        ForkResult::Parent { child } => {
            drop(status_write);
            let mut byte = [SETUP_FAILED];
            let code = match status_read.read_exact(&mut byte) {
                Ok(()) if byte[0] == SETUP_OK => {
                    log::debug!("Detached as pid {}", child);
                    EXIT_CLEAN
                }
                _ => {
                    log::error!("Failed to daemonize");
                    EXIT_STARTUP
                }
            };
            // SAFETY: _exit skips destructors that would tear down state now
            // owned by the child.
            unsafe { libc::_exit(code) }
        }
    }
}
