//! # Shutdown coordinator.
//!
//! Turns OS termination signals into a one-shot cancellation broadcast.
//!
//! ```text
//! SIGINT / SIGTERM (Ctrl-C off Unix)
//!        │  listener task
//!        ▼
//!   mpsc<Signal> ──► drive()
//!                     ├─ 1st signal → publish(ShutdownRequested), token.cancel()
//!                     └─ 2nd signal → publish(ForceQuit), terminate(ForceQuit)
//! ```
//!
//! ## Rules
//! - [`install`] succeeds once per process; later calls return
//!   [`RuntimeError::SignalHandlerInstalled`] and install nothing.
//! - The token is cancelled exactly once.
//! - The second signal bypasses the grace period entirely.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::terminate::{ExitStatus, Terminate};
use crate::error::RuntimeError;
use crate::events::{Bus, Event, EventKind};

static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Termination signal observed by the coordinator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Signal {
    /// SIGINT or Ctrl-C.
    Interrupt,
    /// SIGTERM.
    Terminate,
}

impl Signal {
    /// Returns the conventional signal name.
    pub fn as_str(self) -> &'static str {
        match self {
            Signal::Interrupt => "SIGINT",
            Signal::Terminate => "SIGTERM",
        }
    }
}

/// Installs the process-wide signal handler and returns the shutdown token.
///
/// Must be called inside a tokio runtime.
pub fn install(bus: Bus, terminator: Arc<dyn Terminate>) -> Result<CancellationToken, RuntimeError> {
    if INSTALLED
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        return Err(RuntimeError::SignalHandlerInstalled);
    }

    let (tx, rx) = mpsc::channel(4);
    if let Err(e) = listen(tx) {
        INSTALLED.store(false, Ordering::Release);
        return Err(RuntimeError::Signal(e));
    }

    let token = CancellationToken::new();
    tokio::spawn(drive(rx, token.clone(), bus, terminator));
    Ok(token)
}

/// Consumes signals: the first cancels `token`, the second force-quits.
///
/// Returns after the second signal or when the channel closes.
pub async fn drive(
    mut signals: mpsc::Receiver<Signal>,
    token: CancellationToken,
    bus: Bus,
    terminator: Arc<dyn Terminate>,
) {
    let Some(first) = signals.recv().await else {
        return;
    };
    bus.publish(Event::new(EventKind::ShutdownRequested).with_reason(first.as_str()));
    token.cancel();

    let Some(second) = signals.recv().await else {
        return;
    };
    let status = ExitStatus::ForceQuit;
    bus.publish(
        Event::new(EventKind::ForceQuit)
            .with_reason(second.as_str())
            .with_exit_code(status.code()),
    );
    terminator.terminate(status, "second termination signal");
}

#[cfg(unix)]
fn listen(tx: mpsc::Sender<Signal>) -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::spawn(async move {
        loop {
            let sig = tokio::select! {
                Some(()) = sigint.recv() => Signal::Interrupt,
                Some(()) = sigterm.recv() => Signal::Terminate,
                else => break,
            };
            if tx.send(sig).await.is_err() {
                break;
            }
        }
    });
    Ok(())
}

#[cfg(not(unix))]
fn listen(tx: mpsc::Sender<Signal>) -> std::io::Result<()> {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if tx.send(Signal::Interrupt).await.is_err() {
                break;
            }
        }
    });
    Ok(())
}
