//! # Election configuration.
//!
//! [`ElectionConfig`] carries the identity and timing of one candidate.
//!
//! ## Timing rules (checked by [`ElectionConfig::validate`])
//! - `lease_duration > renew_deadline > 0`
//! - `retry_period > 0`
//! - `lease_duration - retry_period > renew_deadline`
//! - `renew_deadline` exceeds the longest jittered retry period
//!
//! A leader that cannot renew for `renew_deadline` steps down before any other
//! candidate may consider its lease expired. Candidates claim
//! `lease_duration - retry_period` after observing a change, so the deadline
//! must fit in that shorter window.

use std::time::Duration;

use crate::error::ConfigError;
use crate::policies::JitterPolicy;

/// Default lease record name.
pub const DEFAULT_LEASE_NAME: &str = "controller-leader";

/// Leader-election settings for one candidate.
#[derive(Clone, Debug)]
pub struct ElectionConfig {
    /// Unique identity of this process instance (e.g. pod host name).
    pub identity: String,
    /// Name of the lease record in the store.
    pub lease_name: String,
    /// How long non-leaders wait after the last observed change before claiming.
    pub lease_duration: Duration,
    /// How long the leader keeps retrying a renewal before giving up.
    pub renew_deadline: Duration,
    /// Interval between acquisition attempts and between renewals.
    pub retry_period: Duration,
    /// Jitter applied to `retry_period` while in candidate state.
    pub jitter: JitterPolicy,
    /// Whether to write a released record when cancelled while leading.
    pub release_on_cancel: bool,
}

impl ElectionConfig {
    /// Creates a config for `identity` with default timings.
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            ..Self::default()
        }
    }

    /// Returns an identity derived from the host name (`HOSTNAME`), falling
    /// back to the process id.
    pub fn default_identity() -> String {
        std::env::var("HOSTNAME")
            .ok()
            .filter(|h| !h.trim().is_empty())
            .unwrap_or_else(|| format!("pid-{}", std::process::id()))
    }

    /// Checks identity and timing rules.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.identity.is_empty() {
            return Err(ConfigError::Empty { field: "identity" });
        }
        if self.lease_name.is_empty() {
            return Err(ConfigError::Empty {
                field: "lease_name",
            });
        }
        if self.renew_deadline.is_zero() {
            return Err(ConfigError::Zero {
                field: "renew_deadline",
            });
        }
        if self.retry_period.is_zero() {
            return Err(ConfigError::Zero {
                field: "retry_period",
            });
        }
        if self.lease_duration <= self.renew_deadline {
            return Err(ConfigError::LeaseNotAboveDeadline {
                lease: self.lease_duration,
                renew: self.renew_deadline,
            });
        }
        if self.lease_duration.saturating_sub(self.retry_period) <= self.renew_deadline {
            return Err(ConfigError::LeaseWindowTooShort {
                lease: self.lease_duration,
                renew: self.renew_deadline,
                retry: self.retry_period,
            });
        }
        if let JitterPolicy::Factor(factor) = self.jitter {
            if !self.jitter.is_valid() {
                return Err(ConfigError::InvalidJitter { factor });
            }
        }
        let max_retry = self.jitter.max_delay(self.retry_period);
        if self.renew_deadline <= max_retry {
            return Err(ConfigError::DeadlineBelowRetry {
                renew: self.renew_deadline,
                retry: max_retry,
            });
        }
        Ok(())
    }
}

impl Default for ElectionConfig {
    /// Default configuration:
    ///
    /// - `identity` = [`ElectionConfig::default_identity`]
    /// - `lease_name = "controller-leader"`
    /// - `lease_duration = 15s`, `renew_deadline = 10s`, `retry_period = 2s`
    /// - `jitter = Factor(1.2)`, `release_on_cancel = false`
    fn default() -> Self {
        Self {
            identity: Self::default_identity(),
            lease_name: DEFAULT_LEASE_NAME.to_string(),
            lease_duration: Duration::from_secs(15),
            renew_deadline: Duration::from_secs(10),
            retry_period: Duration::from_secs(2),
            jitter: JitterPolicy::default(),
            release_on_cancel: false,
        }
    }
}
