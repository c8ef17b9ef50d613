//! # Control-loop abstraction.
//!
//! A control loop reconciles observed state toward desired state for one
//! resource kind. Its internals live outside this crate; the supervisor only
//! needs [`ControlLoop::run`].
//!
//! A loop receives the worker count and the shared [`CancellationToken`]. It
//! must return promptly after the token fires, and must return `Err` only for
//! conditions that should take the whole process down.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::LoopError;

/// Shared handle to a built control loop.
pub type ControlLoopRef = Arc<dyn ControlLoop>;

/// # Long-running, cancelable reconciliation loop.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use tokio_util::sync::CancellationToken;
/// use leasevisor::{ControlLoop, LoopError};
///
/// struct Clusters;
///
/// #[async_trait]
/// impl ControlLoop for Clusters {
///     async fn run(&self, workers: usize, token: CancellationToken) -> Result<(), LoopError> {
///         // spawn `workers` queue consumers here...
///         let _ = workers;
///         token.cancelled().await;
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait ControlLoop: Send + Sync + 'static {
    /// Runs the loop with `workers` concurrent workers until `token` fires.
    async fn run(&self, workers: usize, token: CancellationToken) -> Result<(), LoopError>;
}
