//! # Runtime configuration.
//!
//! [`Config`] centralizes the supervisor and election settings.
//!
//! ## Sentinel values
//! - `grace = 0s` → no drain wait; loops still running at cancellation are reported stuck
//! - `bus_capacity = 0` → clamped to 1 by the bus

use std::time::Duration;

use crate::error::ConfigError;
use crate::lease::ElectionConfig;

/// Global configuration for the runtime.
///
/// ## Field semantics
/// - `workers_per_loop`: worker count handed to every control loop (min 1)
/// - `grace`: maximum wait for loops to drain after cancellation
/// - `bus_capacity`: event bus ring buffer size
/// - `election`: identity and lease timings of this candidate
#[derive(Clone, Debug)]
pub struct Config {
    /// Worker count passed to [`ControlLoop::run`](crate::ControlLoop::run).
    pub workers_per_loop: usize,

    /// Maximum time to wait for loops to return after cancellation.
    ///
    /// When it runs out the supervisor reports `GraceExceeded` and terminates.
    pub grace: Duration,

    /// Capacity of the event bus broadcast channel.
    ///
    /// Receivers lagging more than `bus_capacity` events skip older items.
    pub bus_capacity: usize,

    /// Leader-election settings.
    pub election: ElectionConfig,
}

impl Config {
    /// Creates the default configuration for `identity`.
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            election: ElectionConfig::new(identity),
            ..Self::default()
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Checks the runtime fields and the election settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers_per_loop == 0 {
            return Err(ConfigError::Zero {
                field: "workers_per_loop",
            });
        }
        self.election.validate()
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `workers_per_loop = 2`
    /// - `grace = 30s`
    /// - `bus_capacity = 1024`
    /// - `election = ElectionConfig::default()` (identity from `HOSTNAME`, 15s/10s/2s)
    fn default() -> Self {
        Self {
            workers_per_loop: 2,
            grace: Duration::from_secs(30),
            bus_capacity: 1024,
            election: ElectionConfig::default(),
        }
    }
}
