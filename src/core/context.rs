//! # Shared context handed to control-loop factories.
//!
//! [`SharedContext`] bundles the collaborator handles every loop needs: an
//! opaque cluster client, the namespace the operator is scoped to, the
//! service-account identity it runs as, and the change-notification factory.
//! It is built once before the election and shared read-only behind an `Arc`.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// Source of change notifications consumed by the loops.
///
/// The supervisor calls [`start`](NotificationFactory::start) once, after
/// every loop is constructed and spawned, so no loop misses an initial event.
pub trait NotificationFactory: Send + Sync + 'static {
    /// Starts delivering notifications until `token` fires.
    fn start(&self, token: CancellationToken);
}

/// Notification factory that delivers nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopNotifications;

impl NotificationFactory for NoopNotifications {
    fn start(&self, _token: CancellationToken) {}
}

/// Immutable bundle of collaborator handles.
#[derive(Clone)]
pub struct SharedContext {
    namespace: String,
    service_account: String,
    identity: String,
    notifications: Arc<dyn NotificationFactory>,
    client: Arc<dyn Any + Send + Sync>,
}

impl SharedContext {
    /// Creates a context around an opaque cluster `client`.
    ///
    /// Namespace, service account and identity start empty; notifications
    /// default to [`NoopNotifications`].
    pub fn new<C>(client: Arc<C>) -> Self
    where
        C: Any + Send + Sync,
    {
        Self {
            namespace: String::new(),
            service_account: String::new(),
            identity: String::new(),
            notifications: Arc::new(NoopNotifications),
            client,
        }
    }

    /// Sets the namespace the loops watch.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Sets the service account the operator runs as.
    pub fn with_service_account(mut self, service_account: impl Into<String>) -> Self {
        self.service_account = service_account.into();
        self
    }

    /// Sets this instance's identity.
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }

    /// Sets the change-notification factory.
    pub fn with_notifications(mut self, notifications: Arc<dyn NotificationFactory>) -> Self {
        self.notifications = notifications;
        self
    }

    /// Namespace the loops watch.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Service account the operator runs as.
    pub fn service_account(&self) -> &str {
        &self.service_account
    }

    /// Identity of this instance.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// The change-notification factory.
    pub fn notifications(&self) -> &Arc<dyn NotificationFactory> {
        &self.notifications
    }

    /// Returns the cluster client if it is a `C`.
    pub fn client<C: Any + Send + Sync>(&self) -> Option<Arc<C>> {
        Arc::clone(&self.client).downcast::<C>().ok()
    }
}

impl fmt::Debug for SharedContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedContext")
            .field("namespace", &self.namespace)
            .field("service_account", &self.service_account)
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}
