//! # leasevisor
//!
//! **Leasevisor** runs a set of control loops on exactly one replica of a
//! replicated operator. Replicas compete for a lease in a shared store; the
//! winner builds and starts every registered loop, and any failure on the
//! leader (lost lease, failing loop, loops exiting) ends the process so an
//! external restart policy can re-enter the election.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!                ┌────────────────────────┐
//!                │  LeaseStore (CAS)      │◄──── other replicas
//!                └───────────┬────────────┘
//!                            │ get / create / update(expected)
//!                            ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Runtime                                                          │
//! │  - LeaseManager  (Candidate ─► Leading ─► Stopped)                │
//! │  - shutdown      (SIGINT/SIGTERM ─► CancellationToken)            │
//! │  - Supervisor    (Registry ─► loops, grace, exhaustion)           │
//! │  - Terminate     (single exit point, Fatal = 1 / ForceQuit = 2)   │
//! └──────┬──────────────────┬──────────────────┬───────────────┬──────┘
//!        ▼                  ▼                  ▼               │
//!   ┌──────────────┐  ┌──────────────┐  ┌──────────────┐       │
//!   │ ControlLoop  │  │ ControlLoop  │  │ ControlLoop  │       │
//!   │ run(workers, │  │ run(workers, │  │ run(workers, │       │
//!   │     token)   │  │     token)   │  │     token)   │       │
//!   └──────────────┘  └──────────────┘  └──────────────┘       │
//!                                                              ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                     Bus (broadcast channel)                       │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                            SubscriberSet
//!                        ┌─────────┼─────────┐
//!                        ▼         ▼         ▼
//!                    LogWriter   metrics   custom
//! ```
//!
//! ### Lifecycle
//! ```text
//! startup ─► SharedContext ─► shutdown::install ─► run_election
//!                                                     │ on_acquired
//!                                                     ▼
//!                         Supervisor: build all ─► spawn all ─► notifications.start
//!                                                     │
//!        ┌──────────────────────┬─────────────────────┼──────────────────────┐
//!        ▼                      ▼                     ▼                      ▼
//!   loop Err/panic        all loops Ok          signal (1st)           lease lost
//!   cancel, Fatal         Fatal                 cancel, drain(grace)   cancel, Fatal
//!                                               2nd signal: ForceQuit
//! ```
//!
//! ## Features
//! | Area               | Description                                              | Key types / traits                          |
//! |--------------------|----------------------------------------------------------|---------------------------------------------|
//! | **Election**       | Lease-based leader election over a CAS store.            | [`LeaseManager`], [`LeaseStore`]            |
//! | **Control loops**  | Loops built from the shared context, run while leading.  | [`ControlLoop`], [`ControlLoopFn`]          |
//! | **Registry**       | Name → factory table frozen at startup.                  | [`RegistryBuilder`], [`Registry`]           |
//! | **Supervision**    | Join-or-first-error over all loops, bounded drain.       | [`Supervisor`], [`Runtime`]                 |
//! | **Shutdown**       | Signals → cancellation; second signal force-quits.       | [`shutdown`], [`Terminate`]                 |
//! | **Subscriber API** | Hook into lifecycle events (logging, metrics, alerting). | [`Subscribe`], [`Event`]                    |
//! | **Errors**         | Typed errors for every failure path.                     | [`RuntimeError`], [`LoopError`], [`StoreError`] |
//!
//! ## Optional features
//! - `logging`: exports the built-in `LogWriter` subscriber rendering events through `tracing`.
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use leasevisor::{
//!     Config, ControlLoopFn, ControlLoopRef, LoopError, MemoryLeaseStore, RegistryBuilder,
//!     Runtime, SharedContext,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut registry = RegistryBuilder::new();
//!     registry.register("clusters", |_ctx: &SharedContext| -> ControlLoopRef {
//!         ControlLoopFn::arc(|_workers: usize, token: CancellationToken| async move {
//!             token.cancelled().await;
//!             Ok::<_, LoopError>(())
//!         })
//!     })?;
//!
//!     let runtime = Runtime::builder(Config::new("replica-a"), Arc::new(MemoryLeaseStore::new()))
//!         .with_registry(registry.build())
//!         .build()?;
//!
//!     // Returns only if the terminator does; ProcessExit never does.
//!     let cause = runtime.run().await;
//!     Err(cause.into())
//! }
//! ```

mod core;
mod error;
mod events;
mod lease;
mod loops;
mod policies;
mod subscribers;

// ---- Public re-exports ----

pub use crate::core::shutdown;
pub use crate::core::{
    Config, ExitStatus, LoopFactory, NoopNotifications, NotificationFactory, ProcessExit, Registry,
    RegistryBuilder, Runtime, RuntimeBuilder, SharedContext, Supervisor, Terminate,
};
pub use error::{ConfigError, LoopError, RegistryError, RuntimeError, StoreError};
pub use events::{Bus, Event, EventKind};
pub use lease::{
    DEFAULT_LEASE_NAME, ElectionConfig, ElectionOutcome, ElectionState, LeaderCallbacks,
    LeaseManager, LeaseRecord, LeaseStore, MemoryLeaseStore, StoredLease, Version,
};
pub use loops::{ControlLoop, ControlLoopFn, ControlLoopRef};
pub use policies::{DEFAULT_JITTER_FACTOR, JitterPolicy};
pub use subscribers::{Subscribe, SubscriberSet};

// Optional: the built-in tracing subscriber.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
