//! The locker's main loop.
//!
//! Three sources feed one multiplexer: the compositor connection, the
//! verifier's reply pipe and the cancellation self-pipe. Outgoing protocol
//! requests are flushed before every wait; errors parked by protocol
//! handlers are collected right after each dispatch pass.

use crate::config::types::{LockConfig, LockError, Result};
use crate::core::context::ExitReason;
use crate::core::multiplexer::EventMultiplexer;
use crate::core::types::Readiness;
use crate::exec::daemonize::daemonize;
use crate::exec::readiness::notify_ready;
use crate::kernel::signal::CancellationPipe;
use crate::wayland::{Display, WaylandCore};

/// Everything the loop callbacks touch
pub struct LockRuntime {
    pub display: Display,
    pub core: WaylandCore,
    pub cancel: CancellationPipe,
}

fn on_display(rt: &mut LockRuntime, readiness: Readiness) -> Result<()> {
    if readiness.is_readable() {
        rt.display.read_and_dispatch(&mut rt.core)?;
    } else if readiness.is_hangup() {
        return Err(LockError::Protocol("compositor connection closed".into()));
    }
    Ok(())
}

fn on_cancel(rt: &mut LockRuntime) -> Result<()> {
    if rt.cancel.drain() {
        rt.core.on_cancel();
    }
    Ok(())
}

/// Readiness notification and detaching, once the lock is confirmed.
fn on_locked(config: &LockConfig) -> Result<()> {
    if let Some(fd) = config.ready_fd {
        notify_ready(fd)?;
    }
    if config.daemonize {
        daemonize()?;
    }
    Ok(())
}

/// Run until an exit condition is reached, then release the lock.
pub fn run_lock_loop(rt: &mut LockRuntime, config: &LockConfig) -> Result<ExitReason> {
    let mut mux: EventMultiplexer<LockRuntime> = EventMultiplexer::new();
    mux.register(rt.display.fd(), Readiness::READABLE, |rt, _, readiness| {
        on_display(rt, readiness)
    });
    mux.register(rt.core.sink.reply_fd(), Readiness::READABLE, |rt, _, _| {
        rt.core.on_auth_readable()
    });
    mux.register(rt.cancel.read_fd(), Readiness::READABLE, |rt, _, _| {
        on_cancel(rt)
    });

    let reason = loop {
        rt.display.prepare(&mut rt.core)?;
        if let Some(err) = rt.core.take_fatal() {
            return Err(err);
        }
        if rt.core.take_newly_locked() {
            on_locked(config)?;
        }
        if let Some(reason) = rt.core.exit_reason() {
            break reason;
        }
        mux.run_once(rt, None)?;
    };

    log::debug!("Unlocking ({:?})", reason);
    // The roundtrip runs even when the flush failed: it is what carries a
    // queued unlock request to the compositor.
    let released = rt.core.shutdown();
    if let Err(e) = rt.display.roundtrip(&mut rt.core) {
        log::debug!("Final roundtrip failed: {}", e);
    }
    released?;
    Ok(reason)
}
