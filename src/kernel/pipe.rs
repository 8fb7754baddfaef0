//! Pipe creation for the verifier channel, the cancellation self-pipe and
//! the daemonize handshake.

use std::os::fd::{FromRawFd, IntoRawFd, OwnedFd, RawFd};

use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::unistd::pipe2;

use crate::config::types::{LockError, Result};

fn owned<F: IntoRawFd>(fd: F) -> OwnedFd {
    // SAFETY: the descriptor was just created by pipe2 and nothing else owns it.
    unsafe { OwnedFd::from_raw_fd(fd.into_raw_fd()) }
}

fn pipe_with(flags: OFlag) -> Result<(OwnedFd, OwnedFd)> {
    let (read, write) =
        pipe2(flags).map_err(|e| LockError::Process(format!("pipe2 failed: {}", e)))?;
    Ok((owned(read), owned(write)))
}

/// Blocking pipe, both ends close-on-exec.
pub fn cloexec_pipe() -> Result<(OwnedFd, OwnedFd)> {
    pipe_with(OFlag::O_CLOEXEC)
}

/// Non-blocking pipe, both ends close-on-exec.
pub fn nonblocking_pipe() -> Result<(OwnedFd, OwnedFd)> {
    pipe_with(OFlag::O_CLOEXEC | OFlag::O_NONBLOCK)
}

pub fn set_nonblocking(fd: RawFd) -> Result<()> {
    let flags = fcntl(fd, FcntlArg::F_GETFL)
        .map_err(|e| LockError::Process(format!("fcntl(F_GETFL) failed: {}", e)))?;
    let flags = OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK;
    fcntl(fd, FcntlArg::F_SETFL(flags))
        .map_err(|e| LockError::Process(format!("fcntl(F_SETFL) failed: {}", e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::{ErrorKind, Read, Write};
    use std::os::fd::AsRawFd;

    #[test]
    fn test_cloexec_pipe_carries_bytes() {
        let (read, write) = cloexec_pipe().unwrap();
        File::from(write).write_all(b"ok").unwrap();
        let mut got = Vec::new();
        File::from(read).read_to_end(&mut got).unwrap();
        assert_eq!(got, b"ok");
    }

    #[test]
    fn test_nonblocking_pipe_read_would_block() {
        let (read, _write) = nonblocking_pipe().unwrap();
        let mut byte = [0u8; 1];
        let err = File::from(read).read(&mut byte).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WouldBlock);
    }

    #[test]
    fn test_set_nonblocking_on_blocking_pipe() {
        let (read, _write) = cloexec_pipe().unwrap();
        set_nonblocking(read.as_raw_fd()).unwrap();
        let mut byte = [0u8; 1];
        let err = File::from(read).read(&mut byte).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WouldBlock);
    }
}
