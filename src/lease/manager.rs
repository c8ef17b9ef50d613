//! # LeaseManager: leader-election state machine.
//!
//! Runs one candidate's election over a [`LeaseStore`]:
//!
//! ```text
//!            ┌────────────── cancelled ───────────────┐
//!            │                                        ▼
//!   ──► Candidate ── create / CAS succeeds ──► Leading ── cancelled ──► Stopped (Resigned)
//!            │        (on_acquired, once)         │
//!            │                                    └── renew deadline missed / conflict
//!            │                                             (on_lost, once) ──► Stopped (Lost)
//!            └── cancelled ──► Stopped (Cancelled)
//! ```
//!
//! ## Rules
//! - Acquisition is retried forever at the jittered `retry_period`; store
//!   errors in candidate state are transient.
//! - Expiry of a foreign lease is judged on the **local** clock: a record is
//!   expired once `lease_duration - retry_period` passed since this candidate
//!   first saw its current version. The subtracted poll interval covers the
//!   lag between the holder's write and this candidate's observation, so a
//!   dead leader is replaced within `lease_duration + retry_period`.
//!   `lease_duration - retry_period > renew_deadline` keeps this safe: the
//!   holder steps down before the claim. Wall-clock timestamps in the record
//!   are informational.
//! - While leading, every `retry_period` the record is CAS-updated against the
//!   version this instance wrote last. A conflict (or missing record) means
//!   another candidate won; no successful renewal within `renew_deadline`
//!   since the previous one means the lease can no longer be trusted.
//!   Both end the election with [`ElectionOutcome::Lost`].
//! - A lost election never re-enters candidacy; the caller decides what to do
//!   (the runtime terminates the process).

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::watch;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::error::{ConfigError, StoreError};
use crate::events::{Bus, Event, EventKind};
use crate::lease::config::ElectionConfig;
use crate::lease::record::{LeaseRecord, StoredLease, Version};
use crate::lease::store::LeaseStore;

/// Observable election state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElectionState {
    /// Trying to acquire the lease.
    Candidate,
    /// Holding the lease and renewing it.
    Leading,
    /// The election finished (cancelled, resigned or lost).
    Stopped,
}

/// How [`LeaseManager::run_election`] ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ElectionOutcome {
    /// Cancelled before the lease was ever acquired.
    Cancelled,
    /// Cancelled while leading; `released` tells whether the lease was handed back.
    Resigned {
        /// `true` if a released record was written.
        released: bool,
    },
    /// Leadership was lost.
    Lost {
        /// Why the lease is considered lost.
        reason: String,
    },
}

/// Synchronous hooks invoked by the election.
///
/// Hooks run on the election task; keep them short and never block on the
/// election itself.
pub trait LeaderCallbacks: Send + Sync {
    /// Called exactly once when the lease is acquired, before renewals start.
    fn on_acquired(&self);

    /// Called exactly once when leadership is lost.
    fn on_lost(&self);

    /// Called whenever the observed lease holder changes (including to this instance).
    fn on_new_leader(&self, _identity: &str) {}
}

/// Last version of the record seen by this candidate and when it was seen.
struct Observation {
    version: Version,
    holder: String,
    at: Instant,
}

/// Result of one acquisition round.
enum Attempt {
    Acquired { version: Version, record: LeaseRecord },
    HeldElsewhere,
    LostRace(StoreError),
}

/// Leader election over a [`LeaseStore`].
pub struct LeaseManager {
    cfg: ElectionConfig,
    store: Arc<dyn LeaseStore>,
    bus: Bus,
    state: watch::Sender<ElectionState>,
}

impl LeaseManager {
    /// Creates a manager after validating `cfg`.
    pub fn new(
        cfg: ElectionConfig,
        store: Arc<dyn LeaseStore>,
        bus: Bus,
    ) -> Result<Self, ConfigError> {
        cfg.validate()?;
        let (state, _rx) = watch::channel(ElectionState::Candidate);
        Ok(Self {
            cfg,
            store,
            bus,
            state,
        })
    }

    /// Returns this candidate's identity.
    pub fn identity(&self) -> &str {
        &self.cfg.identity
    }

    /// Returns the election configuration.
    pub fn config(&self) -> &ElectionConfig {
        &self.cfg
    }

    /// Returns the current state.
    pub fn state(&self) -> ElectionState {
        *self.state.borrow()
    }

    /// Subscribes to state changes.
    pub fn watch(&self) -> watch::Receiver<ElectionState> {
        self.state.subscribe()
    }

    /// Runs the election until it is cancelled or leadership is lost.
    ///
    /// `on_acquired` strictly precedes the first renewal; `on_lost` is called
    /// at most once and only for [`ElectionOutcome::Lost`].
    pub async fn run_election<C>(&self, token: CancellationToken, callbacks: &C) -> ElectionOutcome
    where
        C: LeaderCallbacks + ?Sized,
    {
        let mut observed: Option<Observation> = None;
        self.set_state(ElectionState::Candidate);
        self.bus.publish(
            Event::new(EventKind::CandidateStarted)
                .with_name(self.cfg.lease_name.as_str())
                .with_holder(self.cfg.identity.as_str()),
        );

        let Some((version, record)) = self.acquire(&token, callbacks, &mut observed).await else {
            self.set_state(ElectionState::Stopped);
            return ElectionOutcome::Cancelled;
        };

        self.set_state(ElectionState::Leading);
        self.bus.publish(
            Event::new(EventKind::LeaseAcquired)
                .with_name(self.cfg.lease_name.as_str())
                .with_holder(self.cfg.identity.as_str())
                .with_duration(self.cfg.lease_duration),
        );
        callbacks.on_acquired();

        let outcome = self.renew(&token, version, record).await;
        self.set_state(ElectionState::Stopped);

        match &outcome {
            ElectionOutcome::Lost { reason } => {
                self.bus.publish(
                    Event::new(EventKind::LeaseLost)
                        .with_name(self.cfg.lease_name.as_str())
                        .with_holder(self.cfg.identity.as_str())
                        .with_reason(reason.as_str()),
                );
                callbacks.on_lost();
            }
            ElectionOutcome::Resigned { released: true } => {
                self.bus.publish(
                    Event::new(EventKind::LeaseReleased)
                        .with_name(self.cfg.lease_name.as_str())
                        .with_holder(self.cfg.identity.as_str()),
                );
            }
            _ => {}
        }
        outcome
    }

    /// Candidate loop: returns the written version once the lease is held,
    /// or `None` if cancelled first.
    async fn acquire<C>(
        &self,
        token: &CancellationToken,
        callbacks: &C,
        observed: &mut Option<Observation>,
    ) -> Option<(Version, LeaseRecord)>
    where
        C: LeaderCallbacks + ?Sized,
    {
        loop {
            let attempt = tokio::select! {
                biased;
                _ = token.cancelled() => return None,
                res = self.try_acquire(callbacks, observed) => res,
            };

            match attempt {
                Ok(Attempt::Acquired { version, record }) => return Some((version, record)),
                Ok(Attempt::HeldElsewhere) => {}
                Ok(Attempt::LostRace(e)) | Err(e) => self.publish_attempt_failed(&e),
            }

            let delay = self.cfg.jitter.apply(self.cfg.retry_period);
            tokio::select! {
                biased;
                _ = token.cancelled() => return None,
                _ = time::sleep(delay) => {}
            }
        }
    }

    /// One acquisition round: create the record, or take it over if it is
    /// released, expired, or already ours.
    async fn try_acquire<C>(
        &self,
        callbacks: &C,
        observed: &mut Option<Observation>,
    ) -> Result<Attempt, StoreError>
    where
        C: LeaderCallbacks + ?Sized,
    {
        let name = self.cfg.lease_name.as_str();
        let identity = self.cfg.identity.as_str();
        let fresh = LeaseRecord::new(identity, self.cfg.lease_duration, SystemTime::now());

        let Some(current) = self.store.get(name).await? else {
            return match self.store.create(name, fresh.clone()).await {
                Ok(version) => {
                    self.observe(version, identity, callbacks, observed);
                    Ok(Attempt::Acquired {
                        version,
                        record: fresh,
                    })
                }
                Err(e @ StoreError::AlreadyExists { .. }) => Ok(Attempt::LostRace(e)),
                Err(e) => Err(e),
            };
        };

        self.observe(current.version, &current.record.holder, callbacks, observed);
        if !self.claimable(&current, observed) {
            return Ok(Attempt::HeldElsewhere);
        }

        let mut next = fresh;
        if current.record.is_held_by(identity) {
            next.acquired_at = current.record.acquired_at;
            next.transitions = current.record.transitions;
        } else {
            next.transitions = current.record.transitions.saturating_add(1);
        }

        match self.store.update(name, next.clone(), current.version).await {
            Ok(version) => {
                self.observe(version, identity, callbacks, observed);
                Ok(Attempt::Acquired {
                    version,
                    record: next,
                })
            }
            Err(e @ (StoreError::Conflict { .. } | StoreError::NotFound { .. })) => {
                Ok(Attempt::LostRace(e))
            }
            Err(e) => Err(e),
        }
    }

    /// Returns `true` if `current` may be taken by this candidate now.
    fn claimable(&self, current: &StoredLease, observed: &Option<Observation>) -> bool {
        let record = &current.record;
        if record.is_released() || record.is_held_by(&self.cfg.identity) {
            return true;
        }
        // The change landed up to one poll before this candidate saw it.
        let window = record.lease_duration.saturating_sub(self.cfg.retry_period);
        match observed {
            Some(obs) => obs.at + window <= Instant::now(),
            None => false,
        }
    }

    /// Records a newly seen version; reports holder changes.
    fn observe<C>(
        &self,
        version: Version,
        holder: &str,
        callbacks: &C,
        observed: &mut Option<Observation>,
    ) where
        C: LeaderCallbacks + ?Sized,
    {
        if observed.as_ref().is_some_and(|o| o.version == version) {
            return;
        }
        let holder_changed = observed.as_ref().is_none_or(|o| o.holder != holder);
        *observed = Some(Observation {
            version,
            holder: holder.to_string(),
            at: Instant::now(),
        });

        if holder_changed && !holder.is_empty() {
            self.bus.publish(
                Event::new(EventKind::LeaderObserved)
                    .with_name(self.cfg.lease_name.as_str())
                    .with_holder(holder),
            );
            callbacks.on_new_leader(holder);
        }
    }

    /// Leader loop: renews every `retry_period` until cancelled or lost.
    async fn renew(
        &self,
        token: &CancellationToken,
        mut version: Version,
        mut record: LeaseRecord,
    ) -> ElectionOutcome {
        let name = self.cfg.lease_name.as_str();
        let renew_deadline = self.cfg.renew_deadline;
        // Measured before the write that produced `version`.
        let mut last_renew = Instant::now();

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => return self.resign(version, &record).await,
                _ = time::sleep(self.cfg.retry_period) => {}
            }

            let deadline = last_renew + renew_deadline;
            let started = Instant::now();
            if started >= deadline {
                return lost_deadline(renew_deadline, None);
            }

            let next = record.renewed(SystemTime::now());
            let res = tokio::select! {
                biased;
                _ = token.cancelled() => return self.resign(version, &record).await,
                res = time::timeout_at(deadline, self.store.update(name, next.clone(), version)) => res,
            };

            match res {
                Ok(Ok(v)) => {
                    version = v;
                    record = next;
                    last_renew = started;
                    self.bus.publish(
                        Event::new(EventKind::LeaseRenewed)
                            .with_name(name)
                            .with_holder(self.cfg.identity.as_str()),
                    );
                }
                Ok(Err(e)) if e.is_transient() => {
                    self.publish_attempt_failed(&e);
                    if Instant::now() >= deadline {
                        return lost_deadline(renew_deadline, Some(&e));
                    }
                }
                Ok(Err(e)) => {
                    return ElectionOutcome::Lost {
                        reason: format!("lease taken over: {e}"),
                    };
                }
                Err(_elapsed) => return lost_deadline(renew_deadline, None),
            }
        }
    }

    /// Steps down after cancellation, optionally handing the lease back.
    async fn resign(&self, version: Version, record: &LeaseRecord) -> ElectionOutcome {
        if !self.cfg.release_on_cancel {
            return ElectionOutcome::Resigned { released: false };
        }
        let released = record.released(SystemTime::now());
        let res = time::timeout(
            self.cfg.retry_period,
            self.store
                .update(&self.cfg.lease_name, released, version),
        )
        .await;

        match res {
            Ok(Ok(_)) => ElectionOutcome::Resigned { released: true },
            Ok(Err(e)) => {
                self.publish_attempt_failed(&e);
                ElectionOutcome::Resigned { released: false }
            }
            Err(_elapsed) => {
                self.publish_attempt_failed(&StoreError::unavailable("release timed out"));
                ElectionOutcome::Resigned { released: false }
            }
        }
    }

    fn set_state(&self, next: ElectionState) {
        self.state.send_replace(next);
    }

    fn publish_attempt_failed(&self, e: &StoreError) {
        self.bus.publish(
            Event::new(EventKind::LeaseAttemptFailed)
                .with_name(self.cfg.lease_name.as_str())
                .with_holder(self.cfg.identity.as_str())
                .with_reason(e.to_string()),
        );
    }
}

fn lost_deadline(renew_deadline: Duration, last_error: Option<&StoreError>) -> ElectionOutcome {
    let reason = match last_error {
        Some(e) => format!("failed to renew within {renew_deadline:?}: {e}"),
        None => format!("failed to renew within {renew_deadline:?}"),
    };
    ElectionOutcome::Lost { reason }
}
