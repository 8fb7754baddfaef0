//! Parent side of the privilege-separated verifier.
//!
//! The verifier runs in a forked subprocess and is reached through two
//! pipes: framed credentials go out on one, single verdict bytes come back
//! on the other. The reply end is non-blocking so it can sit in the event
//! loop next to the display connection.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};

use nix::sys::wait::{waitpid, WaitPidFlag};
use nix::unistd::{fork, ForkResult, Pid};

use crate::auth::verifier::CredentialVerifier;
use crate::auth::wire::{write_request, AuthVerdict};
use crate::auth::worker::run_worker_main;
use crate::config::types::{LockError, Result};
use crate::kernel::pipe::{cloexec_pipe, set_nonblocking};

/// Handle on the verifier subprocess
pub struct AuthChannel {
    requests: Option<File>,
    replies: File,
    child: Option<Pid>,
}

impl AuthChannel {
    /// Fork the verifier subprocess.
    ///
    /// The child keeps `verifier` and whatever privileges the process holds
    /// right now; the parent drops its copy of `verifier` before returning.
    pub fn spawn<V>(verifier: V, max_len: usize) -> Result<Self>
    where
        V: CredentialVerifier,
    {
        let (request_read, request_write) = cloexec_pipe()?;
        let (reply_read, reply_write) = cloexec_pipe()?;

        // SAFETY: the child only runs the worker loop and then _exits.
        match unsafe { fork() }
            .map_err(|e| LockError::Process(format!("fork(verifier) failed: {}", e)))?
        {
            ForkResult::Child => {
                drop(request_write);
                drop(reply_read);
                run_worker_main(
                    File::from(request_read),
                    File::from(reply_write),
                    verifier,
                    max_len,
                );
            }
            ForkResult::Parent { child } => {
                drop(verifier);
                drop(request_read);
                drop(reply_write);
                log::debug!("Password verifier running as pid {}", child);
                let mut channel = Self::from_fds(request_write, reply_read)?;
                channel.child = Some(child);
                Ok(channel)
            }
        }
    }

    /// Wrap an already connected pipe pair. The reply end is switched to
    /// non-blocking mode.
    pub fn from_fds(requests: OwnedFd, replies: OwnedFd) -> Result<Self> {
        set_nonblocking(replies.as_raw_fd())?;
        Ok(Self {
            requests: Some(File::from(requests)),
            replies: File::from(replies),
            child: None,
        })
    }

    /// Descriptor the event loop watches for verdicts.
    pub fn reply_fd(&self) -> RawFd {
        self.replies.as_raw_fd()
    }

    pub fn child_pid(&self) -> Option<Pid> {
        self.child
    }

    /// Send one credential for verification. Does not wait for the verdict.
    pub fn submit(&mut self, credential: &[u8]) -> Result<()> {
        let requests = self
            .requests
            .as_mut()
            .ok_or_else(|| LockError::AuthChannelCrash("request pipe already closed".into()))?;
        write_request(requests, credential).map_err(|e| match e {
            LockError::Io(io) if io.kind() == ErrorKind::BrokenPipe => {
                LockError::AuthChannelCrash("verifier stopped reading requests".into())
            }
            other => other,
        })
    }

    /// Decode at most one verdict.
    ///
    /// `Ok(None)` means nothing is available yet. End-of-stream is a crash,
    /// never an implicit answer.
    pub fn poll_reply(&mut self) -> Result<Option<AuthVerdict>> {
        let mut byte = [0u8; 1];
        loop {
            match self.replies.read(&mut byte) {
                Ok(0) => {
                    return Err(LockError::AuthChannelCrash(
                        "verifier closed its reply pipe".into(),
                    ))
                }
                Ok(_) => return AuthVerdict::from_byte(byte[0]).map(Some),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(None),
                Err(e) => return Err(LockError::AuthChannelCrash(e.to_string())),
            }
        }
    }

    /// Close the request pipe so the verifier sees EOF and exits.
    pub fn shutdown(&mut self) {
        self.requests = None;
        if let Some(child) = self.child.take() {
            match waitpid(child, Some(WaitPidFlag::WNOHANG)) {
                Ok(status) => log::debug!("Password verifier status: {:?}", status),
                Err(e) => log::debug!("waitpid({}) failed: {}", child, e),
            }
        }
    }
}

impl Drop for AuthChannel {
    fn drop(&mut self) {
        self.shutdown();
    }
}
