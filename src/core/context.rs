//! Shared state threaded through every event source.
//!
//! [`LockCore`] owns the lock negotiation, the surface registry and the
//! auth state, plus the backend and credential sink they talk through.
//! Protocol adapters feed events in via the `on_*` methods. Errors raised
//! inside protocol dispatch cannot be returned through the display library,
//! so they are parked here and collected by the event loop with
//! [`LockCore::take_fatal`].

use crate::auth::channel::AuthChannel;
use crate::auth::state::{AuthOutcome, AuthPhase, AuthState, CredentialSink, InputEvent};
use crate::auth::wire::AuthVerdict;
use crate::config::types::{Color, LockError, PhaseColors, Result};
use crate::session::lock::{LockTransition, SessionLockClient};
use crate::session::protocol::{LockBackend, LockEvent, OutputEvent, OutputId, SurfaceEvent};
use crate::session::registry::SurfaceRegistry;

/// Why the event loop should stop
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitReason {
    /// The verifier accepted a credential
    Authenticated,
    /// A cancellation signal arrived; no credential was checked
    Cancelled,
    /// The compositor ended the lock on its own
    CompositorEnded,
}

pub struct LockCore<B: LockBackend, S: CredentialSink = AuthChannel> {
    pub backend: B,
    pub sink: S,
    pub session: SessionLockClient,
    pub surfaces: SurfaceRegistry<B>,
    pub auth: AuthState,
    colors: PhaseColors,
    fatal: Option<LockError>,
    newly_locked: bool,
    exit: Option<ExitReason>,
}

impl<B: LockBackend, S: CredentialSink> LockCore<B, S> {
    pub fn new(backend: B, sink: S, auth: AuthState, colors: PhaseColors) -> Self {
        Self {
            backend,
            sink,
            session: SessionLockClient::new(),
            surfaces: SurfaceRegistry::new(),
            auth,
            colors,
            fatal: None,
            newly_locked: false,
            exit: None,
        }
    }

    /// Request the lock and cover every output already known.
    pub fn start(&mut self) -> Result<()> {
        self.session.request(&mut self.backend)?;
        self.surfaces.ensure_lock_surfaces(&mut self.backend)
    }

    /// Fill color for the current auth phase.
    pub fn fill_color(&self) -> Color {
        match self.auth.phase() {
            AuthPhase::Idle => self.colors.background,
            AuthPhase::Validating => self.colors.verifying,
            AuthPhase::Invalid => self.colors.wrong,
            AuthPhase::Cleared => self.colors.cleared,
        }
    }

    fn park(&mut self, result: Result<()>) {
        if let Err(err) = result {
            if self.fatal.is_none() {
                self.fatal = Some(err);
            } else {
                log::debug!("Further error after fatal: {}", err);
            }
        }
    }

    pub fn take_fatal(&mut self) -> Option<LockError> {
        self.fatal.take()
    }

    pub fn has_fatal(&self) -> bool {
        self.fatal.is_some()
    }

    /// True exactly once, after the first `locked` event.
    pub fn take_newly_locked(&mut self) -> bool {
        std::mem::take(&mut self.newly_locked)
    }

    pub fn exit_reason(&self) -> Option<ExitReason> {
        self.exit
    }

    pub fn should_exit(&self) -> bool {
        self.exit.is_some() || self.fatal.is_some()
    }

    fn request_exit(&mut self, reason: ExitReason) {
        if self.exit.is_none() {
            log::debug!("Leaving event loop: {:?}", reason);
            self.exit = Some(reason);
        }
    }

    pub fn on_lock_event(&mut self, event: LockEvent) {
        let result = self.session.handle(event, &mut self.backend);
        match result {
            Ok(LockTransition::Secured) => self.newly_locked = true,
            Ok(LockTransition::EndedByCompositor) => {
                self.surfaces.teardown(&mut self.backend);
                self.request_exit(ExitReason::CompositorEnded);
            }
            Ok(LockTransition::None) => {}
            Err(err) => self.park(Err(err)),
        }
    }

    pub fn on_output_added(&mut self, id: OutputId, output: B::Output) {
        self.surfaces.add_output(id, output, &mut self.backend);
    }

    /// Output property changes land atomically on `Done`, which is when a
    /// surface whose size or scale moved gets repainted.
    pub fn on_output_event(&mut self, id: OutputId, event: OutputEvent) {
        let lock_active = self.session.is_active();
        let settled = matches!(event, OutputEvent::Done);
        let fill = self.fill_color();
        let result = self
            .surfaces
            .handle_output_event(id, event, lock_active, &mut self.backend)
            .and_then(|()| {
                if settled {
                    self.surfaces.render(&mut self.backend, fill)?;
                }
                Ok(())
            });
        self.park(result);
    }

    pub fn on_output_removed(&mut self, id: OutputId) {
        self.surfaces.remove_output(id, &mut self.backend);
    }

    pub fn on_surface_event(&mut self, id: OutputId, event: SurfaceEvent) {
        let fill = self.fill_color();
        let result = self
            .surfaces
            .handle_surface_event(id, event, fill, &mut self.backend);
        self.park(result);
    }

    fn apply(&mut self, outcome: AuthOutcome) -> Result<()> {
        match outcome {
            AuthOutcome::Unchanged => Ok(()),
            AuthOutcome::Redraw => self.redraw(),
            AuthOutcome::Unlock => {
                self.request_exit(ExitReason::Authenticated);
                Ok(())
            }
        }
    }

    /// Repaint every configured surface in the current phase color.
    pub fn redraw(&mut self) -> Result<()> {
        let fill = self.fill_color();
        self.surfaces.damage_all();
        self.surfaces.render(&mut self.backend, fill)?;
        Ok(())
    }

    pub fn on_input(&mut self, event: InputEvent<'_>) {
        if self.should_exit() {
            return;
        }
        let result = self
            .auth
            .handle_input(event, &mut self.sink)
            .and_then(|outcome| self.apply(outcome));
        self.park(result);
    }

    pub fn on_verdict(&mut self, verdict: AuthVerdict) -> Result<()> {
        let outcome = self.auth.handle_verdict(verdict)?;
        self.apply(outcome)
    }

    /// External cancellation. Unlocks without a credential check.
    pub fn on_cancel(&mut self) {
        log::warn!("Cancellation signal received; releasing the lock without authentication");
        self.request_exit(ExitReason::Cancelled);
    }

    /// Release the lock and every surface, then flush.
    pub fn shutdown(&mut self) -> Result<()> {
        self.session.begin_unlock(&mut self.backend);
        self.surfaces.teardown(&mut self.backend);
        self.backend.flush()?;
        self.session.complete_unlock();
        Ok(())
    }
}

impl<B: LockBackend> LockCore<B, AuthChannel> {
    /// The verifier's reply pipe polled readable or hung up.
    pub fn on_auth_readable(&mut self) -> Result<()> {
        match self.sink.poll_reply()? {
            Some(verdict) => self.on_verdict(verdict),
            None => Ok(()),
        }
    }
}
