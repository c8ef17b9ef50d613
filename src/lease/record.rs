//! # Lease record and version token.
//!
//! A [`LeaseRecord`] names the elected leader. The store pairs it with a
//! [`Version`] (the fencing token) in a [`StoredLease`]; every successful
//! write produces a new version, and updates must quote the version they read.

use std::fmt;
use std::time::{Duration, SystemTime};

/// Store-assigned fencing token used for compare-and-swap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(u64);

impl Version {
    /// Wraps a raw version number.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw version number.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Leader lease as persisted in the store.
///
/// An empty `holder` marks a released lease that any candidate may claim.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeaseRecord {
    /// Identity of the current holder.
    pub holder: String,
    /// How long the holder's claim stays valid without renewal.
    pub lease_duration: Duration,
    /// When the current holder first acquired the lease.
    pub acquired_at: SystemTime,
    /// When the current holder last renewed the lease.
    pub renewed_at: SystemTime,
    /// Number of times leadership changed hands.
    pub transitions: u32,
}

impl LeaseRecord {
    /// Creates a fresh record held by `holder`, acquired and renewed at `now`.
    pub fn new(holder: impl Into<String>, lease_duration: Duration, now: SystemTime) -> Self {
        Self {
            holder: holder.into(),
            lease_duration,
            acquired_at: now,
            renewed_at: now,
            transitions: 0,
        }
    }

    /// Returns `true` when the lease was given up by its last holder.
    pub fn is_released(&self) -> bool {
        self.holder.is_empty()
    }

    /// Returns `true` when `identity` holds this lease.
    pub fn is_held_by(&self, identity: &str) -> bool {
        !self.is_released() && self.holder == identity
    }

    /// Returns a copy of this record with `renewed_at` refreshed.
    pub fn renewed(&self, now: SystemTime) -> Self {
        Self {
            renewed_at: now,
            ..self.clone()
        }
    }

    /// Returns the record written when the holder steps down voluntarily.
    pub fn released(&self, now: SystemTime) -> Self {
        Self {
            holder: String::new(),
            lease_duration: Duration::from_secs(1),
            acquired_at: now,
            renewed_at: now,
            transitions: self.transitions,
        }
    }
}

/// A lease record together with the version it was read at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredLease {
    /// The record.
    pub record: LeaseRecord,
    /// Version token to quote on update.
    pub version: Version,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_released_record_keeps_transitions() {
        let now = SystemTime::now();
        let mut rec = LeaseRecord::new("a", Duration::from_secs(15), now);
        rec.transitions = 4;

        let released = rec.released(now);
        assert!(released.is_released());
        assert!(!released.is_held_by("a"));
        assert_eq!(released.transitions, 4);
    }

    #[test]
    fn test_renewed_keeps_acquire_time() {
        let t0 = SystemTime::UNIX_EPOCH;
        let t1 = t0 + Duration::from_secs(2);
        let rec = LeaseRecord::new("a", Duration::from_secs(15), t0).renewed(t1);
        assert_eq!(rec.acquired_at, t0);
        assert_eq!(rec.renewed_at, t1);
        assert!(rec.is_held_by("a"));
    }
}
