//! # Controller Assembly
//!
//! Wires the reconciler, dispatch queue, client cache, and listener registry
//! together and manages their lifecycle.
//!
//! ## Assembly
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Controller Assembly                                │
//! │                                                                         │
//! │  ControllerBuilder                                                     │
//! │    stores (resource / kv / credential)                                 │
//! │    auth resolver        (default: credential-object resolver)          │
//! │    client factory       (default: HTTP client factory)                 │
//! │    config               (default: ControllerConfig::default)           │
//! │       │ start()                                                        │
//! │       ▼                                                                 │
//! │  queue ──► ListenerRegistry ──► Reconciler ──► Dispatcher (workers)    │
//! │    ▲                                                │                   │
//! │    └────────── requeues, change listeners ──────────┘                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! let store = Arc::new(MemoryStore::new());
//! let controller = Controller::builder()
//!     .with_store(store.clone())
//!     .start()?;
//!
//! controller.enqueue(ResourceKey::new("prod", "app-conf"));
//! ```

use std::sync::Arc;
use tracing::info;

use confsync_core::ResourceKey;
use confsync_store::{CredentialStore, KvObjectStore, ResourceStore};

use crate::auth::{AuthResolver, SecretAuthResolver};
use crate::cache::{ClientCache, ClientFactory};
use crate::config::ControllerConfig;
use crate::dispatch::{Dispatcher, DispatcherHandle, QueueHandle};
use crate::error::{SyncError, SyncResult};
use crate::http::http_client_factory;
use crate::listener::ListenerRegistry;
use crate::reconciler::Reconciler;

// =============================================================================
// Controller
// =============================================================================

/// A running controller: dispatch loop, workers, and shared state.
pub struct Controller {
    dispatcher: DispatcherHandle,
    cache: Arc<ClientCache>,
    listeners: Arc<ListenerRegistry>,
    reconciler: Arc<Reconciler>,
}

impl Controller {
    /// Starts building a controller.
    pub fn builder() -> ControllerBuilder {
        ControllerBuilder::new()
    }

    /// Returns a handle for enqueueing reconcile requests.
    pub fn queue(&self) -> QueueHandle {
        self.dispatcher.queue()
    }

    /// Enqueues a reconcile request for one resource.
    pub fn enqueue(&self, key: ResourceKey) {
        self.dispatcher.enqueue(key);
    }

    /// The shared remote-client cache (process-wide, never evicted).
    pub fn client_cache(&self) -> Arc<ClientCache> {
        self.cache.clone()
    }

    /// The listener registry.
    pub fn listeners(&self) -> Arc<ListenerRegistry> {
        self.listeners.clone()
    }

    /// The reconciler itself, for callers that drive attempts directly
    /// (synchronous tests, one-shot CLIs).
    pub fn reconciler(&self) -> Arc<Reconciler> {
        self.reconciler.clone()
    }

    /// Stops the dispatch loop gracefully.
    pub async fn shutdown(&self) {
        info!("Shutting down controller");
        self.dispatcher.shutdown().await;
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`Controller`].
pub struct ControllerBuilder {
    config: ControllerConfig,
    resources: Option<Arc<dyn ResourceStore>>,
    objects: Option<Arc<dyn KvObjectStore>>,
    credentials: Option<Arc<dyn CredentialStore>>,
    resolver: Option<Arc<dyn AuthResolver>>,
    factory: Option<ClientFactory>,
}

impl ControllerBuilder {
    /// Creates a builder with default configuration.
    pub fn new() -> Self {
        ControllerBuilder {
            config: ControllerConfig::default(),
            resources: None,
            objects: None,
            credentials: None,
            resolver: None,
            factory: None,
        }
    }

    /// Sets the controller configuration.
    pub fn with_config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    /// Wires one store implementing all three accessor traits (e.g.
    /// `confsync_store::MemoryStore`).
    pub fn with_store<S>(self, store: Arc<S>) -> Self
    where
        S: ResourceStore + KvObjectStore + CredentialStore + 'static,
    {
        self.with_stores(store.clone(), store.clone(), store)
    }

    /// Wires the three accessors individually.
    pub fn with_stores(
        mut self,
        resources: Arc<dyn ResourceStore>,
        objects: Arc<dyn KvObjectStore>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        self.resources = Some(resources);
        self.objects = Some(objects);
        self.credentials = Some(credentials);
        self
    }

    /// Substitutes the credential resolver.
    pub fn with_resolver(mut self, resolver: Arc<dyn AuthResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Substitutes the remote-client factory (tests wire in-memory servers
    /// here).
    pub fn with_client_factory(mut self, factory: ClientFactory) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Validates the configuration, wires everything, and spawns the
    /// dispatch loop. Must run inside a Tokio runtime.
    pub fn start(self) -> SyncResult<Controller> {
        self.config.validate()?;

        let resources = self
            .resources
            .ok_or_else(|| SyncError::InvalidConfig("resource store required".into()))?;
        let objects = self
            .objects
            .ok_or_else(|| SyncError::InvalidConfig("kv object store required".into()))?;

        let resolver = match self.resolver {
            Some(resolver) => resolver,
            None => {
                let credentials = self.credentials.ok_or_else(|| {
                    SyncError::InvalidConfig(
                        "credential store required unless a resolver is supplied".into(),
                    )
                })?;
                Arc::new(SecretAuthResolver::new(credentials))
            }
        };

        let factory = self
            .factory
            .unwrap_or_else(|| http_client_factory(&self.config));

        let (queue, receiver) = Dispatcher::queue(&self.config);
        let listeners = Arc::new(ListenerRegistry::new(queue.clone()));
        let cache = Arc::new(ClientCache::new(resolver, factory));
        let reconciler = Arc::new(Reconciler::new(
            resources,
            objects,
            cache.clone(),
            listeners.clone(),
            &self.config,
        ));
        let dispatcher = Dispatcher::spawn(reconciler.clone(), &self.config, receiver, queue);

        info!(workers = self.config.workers, "Controller started");
        Ok(Controller {
            dispatcher,
            cache,
            listeners,
            reconciler,
        })
    }
}

impl Default for ControllerBuilder {
    fn default() -> Self {
        ControllerBuilder::new()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use confsync_store::MemoryStore;

    #[tokio::test]
    async fn test_builder_requires_stores() {
        let err = Controller::builder().start().err().unwrap();
        assert!(matches!(err, SyncError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_builder_starts_with_memory_store() {
        let controller = Controller::builder()
            .with_store(Arc::new(MemoryStore::new()))
            .start()
            .unwrap();
        assert!(controller.client_cache().is_empty().await);
        controller.shutdown().await;
    }

    #[tokio::test]
    async fn test_builder_rejects_invalid_config() {
        let mut config = ControllerConfig::default();
        config.workers = 0;
        let err = Controller::builder()
            .with_store(Arc::new(MemoryStore::new()))
            .with_config(config)
            .start()
            .err().unwrap();
        assert!(matches!(err, SyncError::InvalidConfig(_)));
    }
}
