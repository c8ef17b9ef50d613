//! # LogWriter - tracing-backed event renderer
//!
//! Renders every [`Event`] as a `tracing` record under the `leasevisor` target,
//! with the event metadata as structured fields. Fatal conditions are logged
//! at `error`, transient failures at `warn`, renewals at `debug`.
//!
//! ## Example output (fmt layer)
//! ```text
//! INFO leasevisor: lease acquired lease="controller-leader" holder="a" lease_ms=15000
//! INFO leasevisor: starting control loop control_loop="clusters" workers=2
//! ERROR leasevisor: control loop failed control_loop="clusters" reason="fatal error: boom"
//! ```

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let name = e.name.as_deref().unwrap_or("");
        let holder = e.holder.as_deref().unwrap_or("");
        let reason = e.reason.as_deref().unwrap_or("");

        match e.kind {
            EventKind::CandidateStarted => {
                info!(target: "leasevisor", lease = name, identity = holder, "attempting to acquire leader lease");
            }
            EventKind::LeaseAcquired => {
                info!(target: "leasevisor", lease = name, holder, lease_ms = e.duration_ms, "lease acquired");
            }
            EventKind::LeaseRenewed => {
                debug!(target: "leasevisor", lease = name, holder, "lease renewed");
            }
            EventKind::LeaseAttemptFailed => {
                warn!(target: "leasevisor", lease = name, reason, "lease attempt failed");
            }
            EventKind::LeaseLost => {
                error!(target: "leasevisor", lease = name, holder, reason, "leader election lost");
            }
            EventKind::LeaseReleased => {
                info!(target: "leasevisor", lease = name, holder, "lease released");
            }
            EventKind::LeaderObserved => {
                info!(target: "leasevisor", lease = name, leader = holder, "new leader observed");
            }
            EventKind::ShutdownRequested => {
                info!(target: "leasevisor", signal = reason, "shutdown requested");
            }
            EventKind::ForceQuit => {
                error!(target: "leasevisor", signal = reason, "second signal received, exiting immediately");
            }
            EventKind::AllStoppedWithin => {
                info!(target: "leasevisor", "all control loops stopped within grace");
            }
            EventKind::GraceExceeded => {
                error!(target: "leasevisor", grace_ms = e.duration_ms, stuck = reason, "grace exceeded");
            }
            EventKind::LoopBuilt => {
                info!(target: "leasevisor", control_loop = name, "registered control loop built");
            }
            EventKind::LoopStarting => {
                info!(target: "leasevisor", control_loop = name, workers = e.workers, "starting control loop");
            }
            EventKind::LoopStopped => {
                info!(target: "leasevisor", control_loop = name, "control loop stopped");
            }
            EventKind::LoopFailed => {
                error!(target: "leasevisor", control_loop = name, reason, "control loop failed");
            }
            EventKind::NotificationsStarted => {
                info!(target: "leasevisor", "change notifications started");
            }
            EventKind::LoopsExhausted => {
                error!(target: "leasevisor", "control loops exited");
            }
            EventKind::Terminating => {
                error!(target: "leasevisor", exit_code = e.exit_code, reason, "terminating process");
            }
            EventKind::SubscriberOverflow => {
                warn!(target: "leasevisor", subscriber = name, reason, "subscriber dropped event");
            }
            EventKind::SubscriberPanicked => {
                error!(target: "leasevisor", subscriber = name, info = reason, "subscriber panicked");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
