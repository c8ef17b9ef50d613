//! # Function-backed control loop (`ControlLoopFn`)
//!
//! [`ControlLoopFn`] wraps a closure `F: Fn(usize, CancellationToken) -> Fut`.
//! The closure produces a fresh future per call; shared state, if any, is
//! captured explicitly through `Arc`.
//!
//! ## Example
//! ```rust
//! use tokio_util::sync::CancellationToken;
//! use leasevisor::{ControlLoopFn, ControlLoopRef, LoopError};
//!
//! let l: ControlLoopRef = ControlLoopFn::arc(|_workers: usize, token: CancellationToken| async move {
//!     token.cancelled().await;
//!     Ok::<_, LoopError>(())
//! });
//! # let _ = l;
//! ```

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::LoopError;
use crate::loops::control_loop::ControlLoop;

/// Function-backed control loop.
#[derive(Debug)]
pub struct ControlLoopFn<F> {
    f: F,
}

impl<F> ControlLoopFn<F> {
    /// Creates a new function-backed loop.
    pub fn new(f: F) -> Self {
        Self { f }
    }

    /// Creates the loop and returns it as a shared handle.
    pub fn arc(f: F) -> Arc<Self> {
        Arc::new(Self::new(f))
    }
}

#[async_trait]
impl<F, Fut> ControlLoop for ControlLoopFn<F>
where
    F: Fn(usize, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), LoopError>> + Send + 'static,
{
    async fn run(&self, workers: usize, token: CancellationToken) -> Result<(), LoopError> {
        (self.f)(workers, token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loops::ControlLoopRef;

    #[tokio::test]
    async fn test_closure_sees_workers_and_token() {
        let l: ControlLoopRef = ControlLoopFn::arc(|workers: usize, token: CancellationToken| async move {
            if token.is_cancelled() {
                return Err(LoopError::Canceled);
            }
            if workers == 3 {
                Ok(())
            } else {
                Err(LoopError::fail(format!("unexpected workers={workers}")))
            }
        });

        assert!(l.run(3, CancellationToken::new()).await.is_ok());

        let token = CancellationToken::new();
        token.cancel();
        assert!(matches!(l.run(3, token).await, Err(LoopError::Canceled)));
    }
}
