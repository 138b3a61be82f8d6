//! # Remote Client Cache
//!
//! Builds and memoizes one long-lived remote-service client per distinct
//! server identity, shared across all resources referencing that identity.
//!
//! ## Cache Behavior
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Client Cache Flow                                  │
//! │                                                                         │
//! │  obtain(resource)                                                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  identity = (endpoint-or-address, remote namespace)                    │
//! │       │                                                                 │
//! │       ├── hit ──► return shared Arc<dyn RemoteConfigPort>              │
//! │       │                                                                 │
//! │       └── miss ─► resolve credentials (AuthResolver)                   │
//! │                   construct client (ClientFactory)                     │
//! │                   insert-if-absent ──► return retained client          │
//! │                                                                         │
//! │  RACE SEMANTICS                                                        │
//! │  ──────────────                                                        │
//! │  Concurrent misses for one identity may both construct a client;       │
//! │  insert-if-absent retains exactly one and the loser is dropped.        │
//! │  This is an accepted relaxation (at-most-one RETAINED, not             │
//! │  at-most-one CONSTRUCTED); no construction lock is taken.              │
//! │                                                                         │
//! │  LIFECYCLE                                                             │
//! │  ─────────                                                             │
//! │  Process-wide, initialized once, entries never evicted. A TTL /        │
//! │  eviction policy for deployments with many short-lived identities      │
//! │  is an open extension, deliberately not implemented here.              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use confsync_core::{ConfigSync, ServerIdentity};

use crate::auth::{AuthInfo, AuthResolver};
use crate::error::SyncResult;
use crate::remote::RemoteConfigPort;

// =============================================================================
// Client Factory
// =============================================================================

/// Constructs a port bound to one server identity.
///
/// Injected so tests supply in-memory servers and production supplies
/// [`crate::http::HttpConfigClient`].
pub type ClientFactory =
    Arc<dyn Fn(&ServerIdentity, &AuthInfo) -> SyncResult<Arc<dyn RemoteConfigPort>> + Send + Sync>;

// =============================================================================
// Client Cache
// =============================================================================

/// Shared cache of remote-service clients, keyed by server identity.
pub struct ClientCache {
    resolver: Arc<dyn AuthResolver>,
    factory: ClientFactory,
    clients: RwLock<HashMap<ServerIdentity, Arc<dyn RemoteConfigPort>>>,
}

impl ClientCache {
    /// Creates an empty cache.
    pub fn new(resolver: Arc<dyn AuthResolver>, factory: ClientFactory) -> Self {
        ClientCache {
            resolver,
            factory,
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the shared client for the resource's server identity,
    /// constructing it on first use.
    pub async fn obtain(&self, resource: &ConfigSync) -> SyncResult<Arc<dyn RemoteConfigPort>> {
        let identity = resource.spec.remote_server.identity()?;

        if let Some(client) = self.clients.read().await.get(&identity) {
            debug!(identity = %identity, "Client cache hit");
            return Ok(client.clone());
        }

        // Cache miss: resolve credentials and build a client outside any
        // lock. A concurrent miss may construct its own client; whichever
        // insert lands first is the one everybody shares.
        let auth = self.resolver.resolve(resource).await?;
        let client = (self.factory)(&identity, &auth)?;

        let mut clients = self.clients.write().await;
        let retained = clients.entry(identity.clone()).or_insert(client).clone();
        info!(identity = %identity, total = clients.len(), "Cached remote client");
        Ok(retained)
    }

    /// Number of distinct identities currently cached.
    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Returns true when no client has been constructed yet.
    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
