//! Negotiation state of the exclusive session lock.

use serde::Serialize;

use crate::config::types::{LockError, Result};
use crate::session::protocol::{LockBackend, LockEvent};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Termination {
    /// Unlocked on purpose, or the compositor ended an established lock
    Clean,
    /// `finished` arrived before `locked`
    Rejected,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum LockPhase {
    /// Not requested yet
    Idle,
    Pending,
    Locked,
    Unlocking,
    Terminated(Termination),
}

/// Result of feeding a lock event into the client
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockTransition {
    None,
    /// First `locked`: the screen is secured from here on
    Secured,
    /// The compositor dropped an established lock
    EndedByCompositor,
}

/// Lock negotiation with the compositor's lock manager.
///
/// Once terminated, no further protocol request is made through the backend.
#[derive(Debug)]
pub struct SessionLockClient {
    phase: LockPhase,
}

impl Default for SessionLockClient {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionLockClient {
    pub fn new() -> Self {
        Self {
            phase: LockPhase::Idle,
        }
    }

    pub fn phase(&self) -> LockPhase {
        self.phase
    }

    pub fn is_locked(&self) -> bool {
        self.phase == LockPhase::Locked
    }

    /// Whether the lock object exists and accepts lock-surface creation.
    pub fn is_active(&self) -> bool {
        matches!(self.phase, LockPhase::Pending | LockPhase::Locked)
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self.phase, LockPhase::Terminated(_))
    }

    pub fn request<B: LockBackend>(&mut self, backend: &mut B) -> Result<()> {
        if self.phase != LockPhase::Idle {
            return Err(LockError::Protocol(format!(
                "lock already requested (phase {:?})",
                self.phase
            )));
        }
        backend.request_lock()?;
        self.phase = LockPhase::Pending;
        log::debug!("Session lock requested");
        Ok(())
    }

    pub fn handle<B: LockBackend>(
        &mut self,
        event: LockEvent,
        backend: &mut B,
    ) -> Result<LockTransition> {
        match (event, self.phase) {
            (LockEvent::Locked, LockPhase::Pending) => {
                self.phase = LockPhase::Locked;
                log::debug!("Session locked");
                Ok(LockTransition::Secured)
            }
            (LockEvent::Finished, LockPhase::Pending) => {
                backend.abandon_lock();
                self.phase = LockPhase::Terminated(Termination::Rejected);
                Err(LockError::LockRejected)
            }
            (LockEvent::Finished, LockPhase::Locked) => {
                backend.abandon_lock();
                self.phase = LockPhase::Terminated(Termination::Clean);
                log::info!("Compositor ended the session lock");
                Ok(LockTransition::EndedByCompositor)
            }
            (event, phase) => {
                log::debug!("Ignoring {:?} in phase {:?}", event, phase);
                Ok(LockTransition::None)
            }
        }
    }

    /// Voluntary shutdown: unlock an established lock, or withdraw one
    /// that was never confirmed.
    pub fn begin_unlock<B: LockBackend>(&mut self, backend: &mut B) {
        match self.phase {
            LockPhase::Locked => {
                backend.unlock_and_destroy();
                self.phase = LockPhase::Unlocking;
            }
            LockPhase::Pending => {
                backend.abandon_lock();
                self.phase = LockPhase::Unlocking;
            }
            LockPhase::Idle => self.phase = LockPhase::Unlocking,
            LockPhase::Unlocking | LockPhase::Terminated(_) => {}
        }
    }

    /// Called once the unlock request has been flushed.
    pub fn complete_unlock(&mut self) {
        if self.phase == LockPhase::Unlocking {
            self.phase = LockPhase::Terminated(Termination::Clean);
        }
    }
}
