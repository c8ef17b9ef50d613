//! # Runtime events emitted by the election, shutdown and supervisor paths.
//!
//! [`EventKind`] classifies events in four groups:
//! - **Election**: candidacy, acquisition, renewal, loss and observed leaders
//! - **Shutdown**: first signal, force quit, grace accounting
//! - **Loops**: control-loop lifecycle under the supervisor
//! - **Subscribers**: overflow and panic reports from the fan-out workers
//!
//! The [`Event`] struct carries optional metadata (loop or lease name, holder,
//! reason, durations) filled in per kind.
//!
//! ## Ordering guarantees
//! Each event gets a globally unique sequence number (`seq`) that increases
//! monotonically. Use `seq` to restore order when events arrive out of order.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use leasevisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::LeaseAcquired)
//!     .with_name("controller-leader")
//!     .with_holder("replica-a")
//!     .with_duration(Duration::from_secs(15));
//!
//! assert_eq!(ev.kind, EventKind::LeaseAcquired);
//! assert_eq!(ev.holder.as_deref(), Some("replica-a"));
//! assert_eq!(ev.duration_ms, Some(15_000));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `name`: subscriber name
    /// - `reason`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `name`: subscriber name
    /// - `reason`: "full" or "closed"
    SubscriberOverflow,

    // === Election events ===
    /// The lease manager entered candidate state.
    ///
    /// Sets:
    /// - `name`: lease name
    /// - `holder`: this instance's identity
    CandidateStarted,

    /// This instance acquired the lease.
    ///
    /// Sets:
    /// - `name`: lease name
    /// - `holder`: this instance's identity
    /// - `duration_ms`: lease duration
    LeaseAcquired,

    /// The lease was renewed.
    ///
    /// Sets:
    /// - `name`: lease name
    /// - `holder`: this instance's identity
    LeaseRenewed,

    /// One acquisition or renewal round failed without being authoritative
    /// (store unavailable, lease held elsewhere, lost a creation race).
    ///
    /// Sets:
    /// - `name`: lease name
    /// - `reason`: failure detail
    LeaseAttemptFailed,

    /// Leadership was lost (renew deadline exceeded or version conflict).
    ///
    /// Sets:
    /// - `name`: lease name
    /// - `holder`: this instance's identity
    /// - `reason`: why the lease is considered lost
    LeaseLost,

    /// The lease was released on cancellation.
    ///
    /// Sets:
    /// - `name`: lease name
    /// - `holder`: this instance's identity
    LeaseReleased,

    /// A different leader identity was observed in the lease record.
    ///
    /// Sets:
    /// - `name`: lease name
    /// - `holder`: observed leader identity
    LeaderObserved,

    // === Shutdown events ===
    /// First termination signal observed; cancellation fired.
    ///
    /// Sets:
    /// - `reason`: signal name
    ShutdownRequested,

    /// Second termination signal observed; process exits immediately.
    ///
    /// Sets:
    /// - `reason`: signal name
    ForceQuit,

    /// All loops stopped within the grace period after cancellation.
    AllStoppedWithin,

    /// Grace period exceeded; some loops did not stop in time.
    ///
    /// Sets:
    /// - `reason`: stuck loop names
    /// - `duration_ms`: grace period
    GraceExceeded,

    // === Loop events ===
    /// A loop instance was built from its factory.
    ///
    /// Sets:
    /// - `name`: loop name
    LoopBuilt,

    /// A loop task is starting.
    ///
    /// Sets:
    /// - `name`: loop name
    /// - `workers`: worker count passed to the loop
    LoopStarting,

    /// A loop returned without error.
    ///
    /// Sets:
    /// - `name`: loop name
    LoopStopped,

    /// A loop returned an error or panicked.
    ///
    /// Sets:
    /// - `name`: loop name
    /// - `reason`: error message
    LoopFailed,

    /// The notification factory was started after all loops were built.
    NotificationsStarted,

    /// Every loop exited; the control plane is exhausted.
    LoopsExhausted,

    /// The runtime is about to call the termination hook.
    ///
    /// Sets:
    /// - `reason`: cause
    /// - `exit_code`: process exit status
    Terminating,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Loop, lease or subscriber name, if applicable.
    pub name: Option<Arc<str>>,
    /// Lease holder identity, if applicable.
    pub holder: Option<Arc<str>>,
    /// Human-readable reason (errors, signal names, overflow details).
    pub reason: Option<Arc<str>>,
    /// Duration in milliseconds (lease duration, grace period).
    pub duration_ms: Option<u32>,
    /// Worker count handed to a loop.
    pub workers: Option<usize>,
    /// Exit status passed to the termination hook.
    pub exit_code: Option<i32>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            name: None,
            holder: None,
            reason: None,
            duration_ms: None,
            workers: None,
            exit_code: None,
        }
    }

    /// Attaches a loop, lease or subscriber name.
    #[inline]
    pub fn with_name(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attaches a holder identity.
    #[inline]
    pub fn with_holder(mut self, holder: impl Into<Arc<str>>) -> Self {
        self.holder = Some(holder.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a duration (stored as milliseconds).
    #[inline]
    pub fn with_duration(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.duration_ms = Some(ms);
        self
    }

    /// Attaches a worker count.
    #[inline]
    pub fn with_workers(mut self, n: usize) -> Self {
        self.workers = Some(n);
        self
    }

    /// Attaches a process exit status.
    #[inline]
    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_name(subscriber)
            .with_reason(reason)
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_name(subscriber)
            .with_reason(info)
    }

    /// Returns `true` for events reporting a fatal condition.
    #[inline]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            EventKind::LeaseLost
                | EventKind::LoopFailed
                | EventKind::GraceExceeded
                | EventKind::LoopsExhausted
                | EventKind::ForceQuit
                | EventKind::Terminating
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_is_monotonic() {
        let a = Event::new(EventKind::LoopStarting);
        let b = Event::new(EventKind::LoopStopped);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn test_duration_saturates() {
        let ev = Event::new(EventKind::GraceExceeded).with_duration(Duration::from_secs(u64::MAX));
        assert_eq!(ev.duration_ms, Some(u32::MAX));
    }

    #[test]
    fn test_fatal_classification() {
        assert!(Event::new(EventKind::LeaseLost).is_fatal());
        assert!(!Event::new(EventKind::LeaseRenewed).is_fatal());
        assert!(!Event::subscriber_overflow("log", "full").is_fatal());
    }
}
