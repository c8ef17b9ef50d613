//! Error types used by the leasevisor runtime, the lease store and control loops.
//!
//! - [`RuntimeError`] - conditions that end the process (every one is fatal).
//! - [`LoopError`] - errors returned by individual control loops.
//! - [`StoreError`] - failures reported by a [`LeaseStore`](crate::LeaseStore).
//! - [`RegistryError`] - control-loop registration mistakes.
//! - [`ConfigError`] - invalid runtime or election configuration.
//!
//! All enums provide `as_label` (stable snake_case label for logs/metrics).

use std::time::Duration;
use thiserror::Error;

/// # Errors that terminate the runtime.
///
/// There is no recoverable variant: each one is logged through the event bus
/// and then handed to the [`Terminate`](crate::Terminate) hook.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// A control loop returned an error; the whole loop set is torn down.
    #[error("control loop {name:?} failed: {source}")]
    LoopFailed {
        /// Registered loop name.
        name: String,
        /// Error returned by the loop.
        #[source]
        source: LoopError,
    },

    /// A control loop panicked.
    #[error("control loop {name:?} panicked: {info}")]
    LoopPanicked {
        /// Registered loop name.
        name: String,
        /// Panic payload rendered as text.
        info: String,
    },

    /// Every control loop returned without error.
    #[error("control loops exited")]
    LoopsExhausted,

    /// Loops did not drain within the grace period after cancellation.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}; forcing termination")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Loops still running when the grace period ran out.
        stuck: Vec<String>,
    },

    /// The lease could not be renewed in time or was taken by another holder.
    #[error("leader election lost: {reason}")]
    LeadershipLost {
        /// Why the lease was considered lost.
        reason: String,
    },

    /// Cancellation fired before this instance ever became leader.
    #[error("election cancelled before leadership was acquired")]
    ElectionCancelled,

    /// The OS signal handler was installed twice in one process.
    #[error("signal handler already installed")]
    SignalHandlerInstalled,

    /// Registering OS signal listeners failed.
    #[error("signal registration failed: {0}")]
    Signal(#[from] std::io::Error),

    /// Configuration rejected at startup.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Loop registration rejected at startup.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use leasevisor::RuntimeError;
    ///
    /// assert_eq!(RuntimeError::LoopsExhausted.as_label(), "runtime_loops_exhausted");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::LoopFailed { .. } => "runtime_loop_failed",
            RuntimeError::LoopPanicked { .. } => "runtime_loop_panicked",
            RuntimeError::LoopsExhausted => "runtime_loops_exhausted",
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
            RuntimeError::LeadershipLost { .. } => "runtime_leadership_lost",
            RuntimeError::ElectionCancelled => "runtime_election_cancelled",
            RuntimeError::SignalHandlerInstalled => "runtime_signal_handler_installed",
            RuntimeError::Signal(_) => "runtime_signal",
            RuntimeError::Config(_) => "runtime_config",
            RuntimeError::Registry(_) => "runtime_registry",
        }
    }
}

/// # Errors returned by a control loop.
///
/// Whatever the variant, an error from [`ControlLoop::run`](crate::ControlLoop::run)
/// terminates the process; the variants only document intent in logs.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LoopError {
    /// Non-recoverable error raised by the loop itself.
    #[error("fatal error: {error}")]
    Fatal {
        /// The underlying error message.
        error: String,
    },

    /// The loop failed while processing work.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// The loop gave up because the cancellation token fired.
    #[error("context cancelled")]
    Canceled,
}

impl LoopError {
    /// Shorthand for [`LoopError::Fail`].
    pub fn fail(error: impl Into<String>) -> Self {
        LoopError::Fail {
            error: error.into(),
        }
    }

    /// Shorthand for [`LoopError::Fatal`].
    pub fn fatal(error: impl Into<String>) -> Self {
        LoopError::Fatal {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use leasevisor::LoopError;
    ///
    /// assert_eq!(LoopError::fail("boom").as_label(), "loop_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            LoopError::Fatal { .. } => "loop_fatal",
            LoopError::Fail { .. } => "loop_failed",
            LoopError::Canceled => "loop_canceled",
        }
    }
}

/// # Errors reported by a lease store.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached; callers may retry.
    #[error("lease store unavailable: {reason}")]
    Unavailable {
        /// Transport-level detail.
        reason: String,
    },

    /// `create` found an existing record.
    #[error("lease {name:?} already exists")]
    AlreadyExists {
        /// Lease record name.
        name: String,
    },

    /// `update` was given a stale version.
    #[error("lease {name:?} version conflict")]
    Conflict {
        /// Lease record name.
        name: String,
    },

    /// `update` targeted a record that does not exist.
    #[error("lease {name:?} not found")]
    NotFound {
        /// Lease record name.
        name: String,
    },
}

impl StoreError {
    /// Shorthand for [`StoreError::Unavailable`].
    pub fn unavailable(reason: impl Into<String>) -> Self {
        StoreError::Unavailable {
            reason: reason.into(),
        }
    }

    /// Returns `true` for errors caused by transport rather than by contention.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable { .. })
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            StoreError::Unavailable { .. } => "store_unavailable",
            StoreError::AlreadyExists { .. } => "store_already_exists",
            StoreError::Conflict { .. } => "store_conflict",
            StoreError::NotFound { .. } => "store_not_found",
        }
    }
}

/// # Control-loop registration errors.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A loop with the same name is already registered.
    #[error("control loop {name:?} registered twice")]
    Duplicate {
        /// The conflicting name.
        name: String,
    },

    /// The loop name is empty.
    #[error("control loop name must not be empty")]
    EmptyName,
}

impl RegistryError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            RegistryError::Duplicate { .. } => "registry_duplicate",
            RegistryError::EmptyName => "registry_empty_name",
        }
    }
}

/// # Configuration errors.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A required string field is empty.
    #[error("{field} must not be empty")]
    Empty {
        /// Field name.
        field: &'static str,
    },

    /// Durations are not ordered `lease_duration > renew_deadline > 0`.
    #[error("lease_duration ({lease:?}) must be greater than renew_deadline ({renew:?})")]
    LeaseNotAboveDeadline {
        /// Configured lease duration.
        lease: Duration,
        /// Configured renew deadline.
        renew: Duration,
    },

    /// The lease leaves no room for one retry on top of the renew deadline.
    #[error(
        "lease_duration ({lease:?}) must exceed renew_deadline ({renew:?}) plus retry_period ({retry:?})"
    )]
    LeaseWindowTooShort {
        /// Configured lease duration.
        lease: Duration,
        /// Configured renew deadline.
        renew: Duration,
        /// Configured retry period.
        retry: Duration,
    },

    /// A duration that must be positive is zero.
    #[error("{field} must be greater than zero")]
    Zero {
        /// Field name.
        field: &'static str,
    },

    /// The renew deadline would not fit a single jittered retry.
    #[error("renew_deadline ({renew:?}) must exceed the jittered retry period ({retry:?})")]
    DeadlineBelowRetry {
        /// Configured renew deadline.
        renew: Duration,
        /// Longest retry period after jitter.
        retry: Duration,
    },

    /// The jitter factor is negative or not finite.
    #[error("jitter factor {factor} must be finite and non-negative")]
    InvalidJitter {
        /// Configured factor.
        factor: f64,
    },
}
