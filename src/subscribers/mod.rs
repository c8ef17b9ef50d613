//! # Event subscribers.
//!
//! ## Architecture
//! ```text
//! LeaseManager / Supervisor / shutdown ── publish(Event) ──► Bus
//!                                                             │
//!                                            Runtime listener ┘
//!                                                     │
//!                                               SubscriberSet::emit
//!                                          ┌──────────┼──────────┐
//!                                          ▼          ▼          ▼
//!                                      LogWriter   Metrics    Custom
//! ```
//!
//! - [`Subscribe`] the trait user subscribers implement
//! - [`SubscriberSet`] non-blocking fan-out with per-subscriber queues
//! - `LogWriter` (feature `logging`) renders events as `tracing` records

mod subscribe;
mod subscriber_set;

#[cfg(feature = "logging")]
mod embedded;

pub use subscribe::Subscribe;
pub use subscriber_set::SubscriberSet;

pub(crate) use subscriber_set::panic_message;

#[cfg(feature = "logging")]
pub use embedded::LogWriter;
