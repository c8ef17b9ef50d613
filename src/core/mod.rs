//! Runtime core: leadership gating, loop orchestration and shutdown.
//!
//! Internal modules:
//! - [`runtime`]: wires the election to the supervisor and routes exits;
//! - [`supervisor`]: builds, starts and watches the registered loops;
//! - [`registry`]: name → factory table frozen at startup;
//! - [`context`]: collaborator handles shared with loop factories;
//! - [`shutdown`]: OS signals → one-shot cancellation, second signal force-quits;
//! - [`terminate`]: exit statuses and the termination hook.

mod builder;
mod config;
mod context;
mod registry;
mod runtime;
pub mod shutdown;
mod supervisor;
mod terminate;

pub use builder::RuntimeBuilder;
pub use config::Config;
pub use context::{NoopNotifications, NotificationFactory, SharedContext};
pub use registry::{LoopFactory, Registry, RegistryBuilder};
pub use runtime::Runtime;
pub use supervisor::Supervisor;
pub use terminate::{ExitStatus, ProcessExit, Terminate};
