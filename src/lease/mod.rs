//! # Lease-based leader election.
//!
//! - [`LeaseStore`] - CAS port over one named record, [`MemoryLeaseStore`] its in-process implementation
//! - [`LeaseRecord`], [`Version`], [`StoredLease`] - what the store keeps
//! - [`ElectionConfig`] - identity and timings of a candidate
//! - [`LeaseManager`] - the election state machine, reporting through [`LeaderCallbacks`]

mod config;
mod manager;
mod memory;
mod record;
mod store;

pub use config::{DEFAULT_LEASE_NAME, ElectionConfig};
pub use manager::{ElectionOutcome, ElectionState, LeaderCallbacks, LeaseManager};
pub use memory::MemoryLeaseStore;
pub use record::{LeaseRecord, StoredLease, Version};
pub use store::LeaseStore;
