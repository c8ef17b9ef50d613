//! # Jitter policy for election polling.
//!
//! [`JitterPolicy`] spreads the retry cadence of competing candidates so that
//! replicas started together do not hit the lease store in lock-step.
//!
//! Jitter is **additive**: a jittered period is never shorter than the base
//! period, so a candidate never polls faster than `retry_period`.
//!
//! - [`JitterPolicy::None`] - exact base period, predictable (tests, single replica).
//! - [`JitterPolicy::Factor`] - `base + random[0, factor × base]`.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use leasevisor::JitterPolicy;
//!
//! let base = Duration::from_secs(2);
//! assert_eq!(JitterPolicy::None.apply(base), base);
//!
//! let j = JitterPolicy::Factor(1.2);
//! let d = j.apply(base);
//! assert!(d >= base && d <= j.max_delay(base));
//! ```

use rand::Rng;
use std::time::Duration;

/// Jitter factor used by the default election configuration.
pub const DEFAULT_JITTER_FACTOR: f64 = 1.2;

/// Policy controlling randomization of the candidate retry period.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum JitterPolicy {
    /// No jitter: use the exact base period.
    None,

    /// Additive jitter: `base + random[0, factor × base]`.
    ///
    /// A factor of `0.0` behaves like [`JitterPolicy::None`].
    Factor(f64),
}

impl Default for JitterPolicy {
    /// Returns `Factor(1.2)`.
    fn default() -> Self {
        JitterPolicy::Factor(DEFAULT_JITTER_FACTOR)
    }
}

impl JitterPolicy {
    /// Applies jitter to the given base period.
    pub fn apply(&self, base: Duration) -> Duration {
        match *self {
            JitterPolicy::None => base,
            JitterPolicy::Factor(factor) => {
                let extra_ms = self.extra_ms(base, factor);
                if extra_ms == 0 {
                    return base;
                }
                let mut rng = rand::rng();
                base + Duration::from_millis(rng.random_range(0..=extra_ms))
            }
        }
    }

    /// Returns the longest period [`apply`](Self::apply) can produce for `base`.
    pub fn max_delay(&self, base: Duration) -> Duration {
        match *self {
            JitterPolicy::None => base,
            JitterPolicy::Factor(factor) => base + Duration::from_millis(self.extra_ms(base, factor)),
        }
    }

    /// Returns `true` if the factor is usable (finite, non-negative).
    pub fn is_valid(&self) -> bool {
        match *self {
            JitterPolicy::None => true,
            JitterPolicy::Factor(factor) => factor.is_finite() && factor >= 0.0,
        }
    }

    fn extra_ms(&self, base: Duration, factor: f64) -> u64 {
        if !factor.is_finite() || factor <= 0.0 {
            return 0;
        }
        let extra = base.as_millis() as f64 * factor;
        if extra >= u64::MAX as f64 {
            u64::MAX
        } else {
            extra as u64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_is_identity() {
        let base = Duration::from_millis(750);
        assert_eq!(JitterPolicy::None.apply(base), base);
        assert_eq!(JitterPolicy::None.max_delay(base), base);
    }

    #[test]
    fn test_factor_stays_within_bounds() {
        let policy = JitterPolicy::Factor(1.2);
        let base = Duration::from_secs(2);
        let max = policy.max_delay(base);
        assert_eq!(max, Duration::from_millis(4400));

        for _ in 0..200 {
            let d = policy.apply(base);
            assert!(d >= base, "jitter shortened the period: {d:?}");
            assert!(d <= max, "jitter exceeded bound: {d:?} > {max:?}");
        }
    }

    #[test]
    fn test_zero_factor_and_zero_base() {
        assert_eq!(
            JitterPolicy::Factor(0.0).apply(Duration::from_secs(1)),
            Duration::from_secs(1)
        );
        assert_eq!(JitterPolicy::Factor(1.2).apply(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn test_validity() {
        assert!(JitterPolicy::default().is_valid());
        assert!(!JitterPolicy::Factor(-0.5).is_valid());
        assert!(!JitterPolicy::Factor(f64::NAN).is_valid());
    }
}
