//! Readiness notification for supervisors.

use std::fs::File;
use std::io::Write;
use std::os::fd::{FromRawFd, RawFd};

use crate::config::types::{LockError, Result};

/// Write one newline to `fd` and close it.
///
/// Takes ownership of the descriptor: it is closed whether or not the write
/// succeeds.
pub fn notify_ready(fd: RawFd) -> Result<()> {
    if fd < 0 {
        return Err(LockError::Config(format!("invalid ready fd {}", fd)));
    }
    // SAFETY: the descriptor was handed to us on the command line for this
    // single use; nothing else in the process refers to it.
    let mut file = unsafe { File::from_raw_fd(fd) };
    file.write_all(b"\n").map_err(|e| {
        LockError::Process(format!("Failed to send readiness notification: {}", e))
    })?;
    log::debug!("Readiness notification sent on fd {}", fd);
    Ok(())
}
