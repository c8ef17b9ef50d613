//! # In-memory lease store.
//!
//! [`MemoryLeaseStore`] is a linearizable [`LeaseStore`] kept behind a mutex.
//! It backs tests and the demo operator, and supports fault injection:
//!
//! - [`set_available`](MemoryLeaseStore::set_available) - every call fails with
//!   `Unavailable` while the store is down;
//! - [`set_latency`](MemoryLeaseStore::set_latency) - every call sleeps before
//!   touching the state (the write only happens if the caller is still waiting).

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::lease::record::{LeaseRecord, StoredLease, Version};
use crate::lease::store::LeaseStore;

#[derive(Default)]
struct State {
    records: HashMap<String, StoredLease>,
    next_version: u64,
}

impl State {
    fn bump(&mut self) -> Version {
        self.next_version += 1;
        Version::new(self.next_version)
    }
}

/// Mutex-backed lease store with fault injection.
pub struct MemoryLeaseStore {
    state: Mutex<State>,
    available: AtomicBool,
    latency: Mutex<Duration>,
}

impl Default for MemoryLeaseStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLeaseStore {
    /// Creates an empty, available store with no latency.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            available: AtomicBool::new(true),
            latency: Mutex::new(Duration::ZERO),
        }
    }

    /// Marks the store reachable or unreachable.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Sets the delay applied before every operation.
    pub fn set_latency(&self, latency: Duration) {
        *self.lock_latency() = latency;
    }

    /// Returns the current record without going through the async API.
    pub fn peek(&self, name: &str) -> Option<StoredLease> {
        self.lock_state().records.get(name).cloned()
    }

    /// Returns the current holder of `name`, if the lease exists and is held.
    pub fn holder(&self, name: &str) -> Option<String> {
        self.peek(name)
            .map(|s| s.record.holder)
            .filter(|h| !h.is_empty())
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn lock_latency(&self) -> std::sync::MutexGuard<'_, Duration> {
        self.latency.lock().unwrap_or_else(|p| p.into_inner())
    }

    async fn enter(&self) -> Result<(), StoreError> {
        let latency = *self.lock_latency();
        if latency > Duration::ZERO {
            tokio::time::sleep(latency).await;
        }
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::unavailable("memory store marked unavailable"))
        }
    }
}

#[async_trait]
impl LeaseStore for MemoryLeaseStore {
    async fn get(&self, name: &str) -> Result<Option<StoredLease>, StoreError> {
        self.enter().await?;
        Ok(self.lock_state().records.get(name).cloned())
    }

    async fn create(&self, name: &str, record: LeaseRecord) -> Result<Version, StoreError> {
        self.enter().await?;
        let mut state = self.lock_state();
        if state.records.contains_key(name) {
            return Err(StoreError::AlreadyExists {
                name: name.to_string(),
            });
        }
        let version = state.bump();
        state
            .records
            .insert(name.to_string(), StoredLease { record, version });
        Ok(version)
    }

    async fn update(
        &self,
        name: &str,
        record: LeaseRecord,
        expected: Version,
    ) -> Result<Version, StoreError> {
        self.enter().await?;
        let mut state = self.lock_state();
        let current = match state.records.get(name) {
            Some(stored) => stored.version,
            None => {
                return Err(StoreError::NotFound {
                    name: name.to_string(),
                });
            }
        };
        if current != expected {
            return Err(StoreError::Conflict {
                name: name.to_string(),
            });
        }
        let version = state.bump();
        state
            .records
            .insert(name.to_string(), StoredLease { record, version });
        Ok(version)
    }
}
