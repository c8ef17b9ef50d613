//! # Control-loop abstractions.
//!
//! - [`ControlLoop`] - trait implemented by external reconciliation loops
//! - [`ControlLoopFn`] - closure-backed implementation
//! - [`ControlLoopRef`] - shared handle (`Arc<dyn ControlLoop>`)

mod control_loop;
mod loop_fn;

pub use control_loop::{ControlLoop, ControlLoopRef};
pub use loop_fn::ControlLoopFn;
