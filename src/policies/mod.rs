//! Timing policies.
//!
//! ## Contents
//! - [`JitterPolicy`] additive randomization of the candidate retry period
//!
//! ## Quick wiring
//! ```text
//! ElectionConfig { retry_period, jitter: JitterPolicy }
//!      └─► lease::LeaseManager sleeps jitter.apply(retry_period) between
//!          acquisition attempts while in Candidate state
//! ```

mod jitter;

pub use jitter::{DEFAULT_JITTER_FACTOR, JitterPolicy};
