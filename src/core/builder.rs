use std::sync::Arc;

use crate::core::{
    config::Config,
    context::SharedContext,
    registry::Registry,
    runtime::{ExitGate, Runtime},
    supervisor::Supervisor,
    terminate::{ProcessExit, Terminate},
};
use crate::error::RuntimeError;
use crate::events::Bus;
use crate::lease::{LeaseManager, LeaseStore};
use crate::subscribers::Subscribe;

/// Builder for a [`Runtime`].
pub struct RuntimeBuilder {
    cfg: Config,
    store: Arc<dyn LeaseStore>,
    registry: Registry,
    context: Option<SharedContext>,
    subscribers: Vec<Arc<dyn Subscribe>>,
    terminator: Arc<dyn Terminate>,
}

impl RuntimeBuilder {
    /// Creates a builder electing over `store`.
    ///
    /// Defaults: empty registry, a context with no client, no subscribers,
    /// and [`ProcessExit`] as terminator.
    pub fn new(cfg: Config, store: Arc<dyn LeaseStore>) -> Self {
        Self {
            cfg,
            store,
            registry: Registry::default(),
            context: None,
            subscribers: Vec::new(),
            terminator: Arc::new(ProcessExit),
        }
    }

    /// Sets the control loops to run once leading.
    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    /// Sets the shared context handed to loop factories.
    pub fn with_context(mut self, context: SharedContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive runtime events through dedicated workers with
    /// bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Replaces the termination hook (tests observe exits this way).
    ///
    /// The runtime calls it from its subscriber listener once the cause has
    /// been delivered to every subscriber.
    pub fn with_terminator(mut self, terminator: Arc<dyn Terminate>) -> Self {
        self.terminator = terminator;
        self
    }

    /// Validates the configuration and wires the components.
    pub fn build(self) -> Result<Runtime, RuntimeError> {
        self.cfg.validate()?;

        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let manager = Arc::new(LeaseManager::new(
            self.cfg.election.clone(),
            self.store,
            bus.clone(),
        )?);
        let (requests, exits) = ExitGate::new(self.terminator);
        let terminator: Arc<dyn Terminate> = Arc::new(requests);

        let context = self.context.unwrap_or_else(|| {
            SharedContext::new(Arc::new(())).with_identity(self.cfg.election.identity.clone())
        });
        let supervisor = Supervisor::new(
            &self.cfg,
            self.registry,
            Arc::new(context),
            bus.clone(),
            terminator.clone(),
        );

        Ok(Runtime::new_internal(
            bus,
            manager,
            supervisor,
            self.subscribers,
            terminator,
            exits,
        ))
    }
}
