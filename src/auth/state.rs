//! User-facing authentication state.
//!
//! Glues keyboard input, the credential buffer and verifier verdicts
//! together. At most one verification is in flight: input and submissions
//! arriving while `Validating` are refused, not queued.

use serde::Serialize;

use crate::auth::channel::AuthChannel;
use crate::auth::wire::AuthVerdict;
use crate::config::types::{LockError, Result};
use crate::kernel::memlock::{BufferError, SecureBuffer};

/// Where submitted credentials go
pub trait CredentialSink {
    fn submit(&mut self, credential: &[u8]) -> Result<()>;
}

impl CredentialSink for AuthChannel {
    fn submit(&mut self, credential: &[u8]) -> Result<()> {
        AuthChannel::submit(self, credential)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum AuthPhase {
    Idle,
    Validating,
    Invalid,
    Cleared,
}

/// Input already translated from key events
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputEvent<'a> {
    /// UTF-8 text produced by a key press
    Insert(&'a [u8]),
    Backspace,
    Clear,
    Submit,
}

/// What the caller has to do after a state change
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthOutcome {
    Unchanged,
    /// Phase changed; every surface needs repainting
    Redraw,
    /// Credential accepted; begin unlocking
    Unlock,
}

pub struct AuthState {
    phase: AuthPhase,
    failed_attempts: u32,
    buffer: SecureBuffer,
    ignore_empty: bool,
}

impl AuthState {
    pub fn new(buffer: SecureBuffer, ignore_empty: bool) -> Self {
        Self {
            phase: AuthPhase::Idle,
            failed_attempts: 0,
            buffer,
            ignore_empty,
        }
    }

    pub fn phase(&self) -> AuthPhase {
        self.phase
    }

    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }

    pub fn credential_len(&self) -> usize {
        self.buffer.len()
    }

    fn enter(&mut self, phase: AuthPhase) -> AuthOutcome {
        if matches!(phase, AuthPhase::Invalid | AuthPhase::Cleared) {
            self.buffer.clear();
        }
        if self.phase == phase {
            return AuthOutcome::Unchanged;
        }
        log::debug!("Auth phase {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
        AuthOutcome::Redraw
    }

    pub fn handle_input<S>(&mut self, event: InputEvent<'_>, sink: &mut S) -> Result<AuthOutcome>
    where
        S: CredentialSink + ?Sized,
    {
        if self.phase == AuthPhase::Validating {
            log::debug!("Ignoring input while a verification is in flight");
            return Ok(AuthOutcome::Unchanged);
        }

        match event {
            InputEvent::Insert(bytes) => match self.buffer.append(bytes) {
                Ok(()) => Ok(self.enter(AuthPhase::Idle)),
                Err(BufferError::CapacityExceeded { max }) => {
                    log::debug!("Credential already at {} bytes; key dropped", max);
                    Ok(AuthOutcome::Unchanged)
                }
                Err(e) => {
                    log::warn!("Key dropped: {}", e);
                    Ok(AuthOutcome::Unchanged)
                }
            },
            InputEvent::Backspace => {
                if self.buffer.is_empty() {
                    return Ok(self.enter(AuthPhase::Cleared));
                }
                let cut = last_scalar_start(self.buffer.as_slice());
                self.buffer.truncate(cut);
                if self.buffer.is_empty() {
                    Ok(self.enter(AuthPhase::Cleared))
                } else {
                    Ok(self.enter(AuthPhase::Idle))
                }
            }
            InputEvent::Clear => Ok(self.enter(AuthPhase::Cleared)),
            InputEvent::Submit => {
                if self.buffer.is_empty() && self.ignore_empty {
                    log::debug!("Empty credential ignored");
                    return Ok(AuthOutcome::Unchanged);
                }
                let sent = sink.submit(self.buffer.as_slice());
                self.buffer.clear();
                sent?;
                self.phase = AuthPhase::Validating;
                Ok(AuthOutcome::Redraw)
            }
        }
    }

    /// Apply a verdict from the verifier. A verdict with nothing in flight
    /// means request/reply pairing is broken and is fatal.
    pub fn handle_verdict(&mut self, verdict: AuthVerdict) -> Result<AuthOutcome> {
        if self.phase != AuthPhase::Validating {
            return Err(LockError::UnexpectedVerdict);
        }
        self.buffer.clear();
        match verdict {
            AuthVerdict::Success => {
                log::debug!("Credential accepted");
                self.phase = AuthPhase::Idle;
                Ok(AuthOutcome::Unlock)
            }
            AuthVerdict::Failure => {
                self.failed_attempts = self.failed_attempts.saturating_add(1);
                log::debug!("Credential rejected ({} failed attempts)", self.failed_attempts);
                self.enter(AuthPhase::Invalid);
                Ok(AuthOutcome::Redraw)
            }
        }
    }
}

/// Offset of the last UTF-8 scalar; stray continuation bytes count as part of it.
fn last_scalar_start(bytes: &[u8]) -> usize {
    bytes
        .iter()
        .rposition(|&b| b & 0xC0 != 0x80)
        .unwrap_or(0)
}
