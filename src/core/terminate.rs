//! # Process termination hook.
//!
//! Every unrecoverable path ends in [`Terminate::terminate`]. Production code
//! uses [`ProcessExit`], which calls [`std::process::exit`]; tests plug in a
//! recorder to observe the exit trigger instead.
//!
//! Inside a [`Runtime`](crate::Runtime) components never call the hook
//! directly: they queue an [`ExitRequest`] that the subscriber listener
//! serves once the cause has reached every subscriber.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;

use crate::events::{Bus, Event, EventKind};

/// Exit status handed to the termination hook.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExitStatus {
    /// Leadership loss, loop failure, loop exhaustion or grace overrun.
    Fatal,
    /// A second termination signal arrived during graceful shutdown.
    ForceQuit,
}

impl ExitStatus {
    /// Returns the process exit code.
    pub const fn code(self) -> i32 {
        match self {
            ExitStatus::Fatal => 1,
            ExitStatus::ForceQuit => 2,
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitStatus::Fatal => write!(f, "fatal ({})", self.code()),
            ExitStatus::ForceQuit => write!(f, "force quit ({})", self.code()),
        }
    }
}

/// Ends the process.
///
/// Implementations may return (tests do); callers must not assume they don't.
pub trait Terminate: Send + Sync + 'static {
    /// Terminates with `status`; `reason` is a human-readable cause.
    fn terminate(&self, status: ExitStatus, reason: &str);
}

/// Calls [`std::process::exit`] with the status code.
///
/// With the `logging` feature the status and reason are written as a
/// `tracing` error record first.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessExit;

impl Terminate for ProcessExit {
    fn terminate(&self, status: ExitStatus, reason: &str) {
        #[cfg(feature = "logging")]
        tracing::error!(exit_code = status.code(), reason, "terminating process: {status}");
        #[cfg(not(feature = "logging"))]
        let _ = reason;
        std::process::exit(status.code());
    }
}

/// Termination request queued for the runtime's subscriber listener.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ExitRequest {
    pub(crate) status: ExitStatus,
    pub(crate) reason: String,
}

/// Queues termination requests instead of exiting.
pub(crate) struct ExitRequests {
    tx: mpsc::UnboundedSender<ExitRequest>,
}

impl ExitRequests {
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<ExitRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Terminate for ExitRequests {
    fn terminate(&self, status: ExitStatus, reason: &str) {
        let _ = self.tx.send(ExitRequest {
            status,
            reason: reason.to_string(),
        });
    }
}

/// Forwards the first `Fatal` request and every `ForceQuit`.
///
/// Several paths can race to terminate (leadership loss cancels the token,
/// then the draining supervisor reports exhaustion); the first cause wins.
/// A forced quit is never suppressed, but once it fired later `Fatal`
/// requests are.
pub(crate) struct TerminateOnce {
    inner: Arc<dyn Terminate>,
    fired: AtomicBool,
}

impl TerminateOnce {
    pub(crate) fn new(inner: Arc<dyn Terminate>) -> Self {
        Self {
            inner,
            fired: AtomicBool::new(false),
        }
    }
}

impl Terminate for TerminateOnce {
    fn terminate(&self, status: ExitStatus, reason: &str) {
        let fired = self.fired.swap(true, Ordering::AcqRel);
        if !fired || status == ExitStatus::ForceQuit {
            self.inner.terminate(status, reason);
        }
    }
}

/// Publishes `Terminating` and hands `status` to the terminator.
pub(crate) fn escalate(bus: &Bus, terminator: &dyn Terminate, status: ExitStatus, reason: &str) {
    bus.publish(
        Event::new(EventKind::Terminating)
            .with_reason(reason)
            .with_exit_code(status.code()),
    );
    terminator.terminate(status, reason);
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Records termination requests instead of exiting.
    #[derive(Default)]
    pub(crate) struct Recorder {
        calls: Mutex<Vec<(ExitStatus, String)>>,
    }

    impl Recorder {
        pub(crate) fn calls(&self) -> Vec<(ExitStatus, String)> {
            self.calls.lock().unwrap().clone()
        }

        pub(crate) fn statuses(&self) -> Vec<ExitStatus> {
            self.calls().into_iter().map(|(s, _)| s).collect()
        }
    }

    impl Terminate for Recorder {
        fn terminate(&self, status: ExitStatus, reason: &str) {
            self.calls.lock().unwrap().push((status, reason.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(ExitStatus::Fatal.code(), 1);
        assert_eq!(ExitStatus::ForceQuit.code(), 2);
        assert_eq!(ExitStatus::ForceQuit.to_string(), "force quit (2)");
    }

    #[test]
    fn test_terminate_once_forwards_first_cause() {
        let rec = Arc::new(testing::Recorder::default());
        let once = TerminateOnce::new(rec.clone());

        once.terminate(ExitStatus::Fatal, "leadership lost");
        once.terminate(ExitStatus::Fatal, "control loops exited");
        assert_eq!(
            rec.calls(),
            vec![(ExitStatus::Fatal, "leadership lost".to_string())]
        );
    }

    #[test]
    fn test_terminate_once_never_suppresses_force_quit() {
        let rec = Arc::new(testing::Recorder::default());
        let once = TerminateOnce::new(rec.clone());

        once.terminate(ExitStatus::Fatal, "leadership lost");
        once.terminate(ExitStatus::ForceQuit, "second termination signal");
        once.terminate(ExitStatus::Fatal, "grace exceeded");
        assert_eq!(
            rec.statuses(),
            vec![ExitStatus::Fatal, ExitStatus::ForceQuit]
        );
    }

    #[test]
    fn test_exit_requests_are_queued() {
        let (requests, mut rx) = ExitRequests::channel();
        escalate(&Bus::new(4), &requests, ExitStatus::Fatal, "loop failed");

        assert_eq!(
            rx.try_recv().unwrap(),
            ExitRequest {
                status: ExitStatus::Fatal,
                reason: "loop failed".to_string(),
            }
        );
        assert!(rx.try_recv().is_err());
    }
}
