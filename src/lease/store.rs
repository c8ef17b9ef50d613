//! # Lease store port.
//!
//! [`LeaseStore`] is the compare-and-swap interface the lease manager runs
//! over. Implementations must be linearizable: `create` fails if the record
//! exists and `update` fails unless `expected` is the current version.
//!
//! ```text
//! get(name)                      → Ok(None) | Ok(Some(StoredLease))
//! create(name, record)           → Ok(Version) | AlreadyExists
//! update(name, record, expected) → Ok(Version) | Conflict | NotFound
//! any call                       → Unavailable (transient)
//! ```

use async_trait::async_trait;

use crate::error::StoreError;
use crate::lease::record::{LeaseRecord, StoredLease, Version};

/// Linearizable, CAS-capable store holding named lease records.
#[async_trait]
pub trait LeaseStore: Send + Sync + 'static {
    /// Reads the record called `name`, if it exists.
    async fn get(&self, name: &str) -> Result<Option<StoredLease>, StoreError>;

    /// Creates the record; fails with [`StoreError::AlreadyExists`] if present.
    async fn create(&self, name: &str, record: LeaseRecord) -> Result<Version, StoreError>;

    /// Replaces the record if its current version equals `expected`.
    ///
    /// Fails with [`StoreError::Conflict`] on mismatch.
    async fn update(
        &self,
        name: &str,
        record: LeaseRecord,
        expected: Version,
    ) -> Result<Version, StoreError>;
}
