//! # Change Listener Registry
//!
//! Tracks per-resource remote-change subscriptions and converges them
//! against the desired set on every reconcile.
//!
//! ## Listener Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Listener Registry Flow                               │
//! │                                                                         │
//! │  reconcile (ServerToCluster)                                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  desired = { (identity, group, key) per spec entry key }               │
//! │       │                                                                 │
//! │       ├── stale registrations (direction flip, key removed)            │
//! │       │        └─► cancel_listen on the owning port                    │
//! │       │                                                                 │
//! │       └── missing registrations                                        │
//! │                └─► listen(group, key, handler)                         │
//! │                                                                         │
//! │  handler(change):  queue.enqueue(resource key)   ← the ONLY side       │
//! │                                                    effect permitted    │
//! │                                                                         │
//! │  resource deleted ─► cancel_all(resource key)                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Re-registering an identical (identity, group, key) target is a no-op.
//! Handlers run on tasks outside the reconcile-worker pool and must never
//! write status or mutate local objects; the single-writer discipline lives
//! in the reconciler.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use confsync_core::{ConfigSync, ResourceKey, ServerIdentity, SyncDirection};

use crate::dispatch::QueueHandle;
use crate::error::SyncResult;
use crate::remote::{ChangeHandler, ConfigChange, RemoteConfigPort, SubscriptionId};

// =============================================================================
// Listener Target
// =============================================================================

/// What one subscription watches.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListenerTarget {
    /// Server identity the subscription lives on.
    pub identity: ServerIdentity,

    /// Watched group.
    pub group: String,

    /// Watched entry key.
    pub entry_key: String,
}

struct ActiveListener {
    subscription: SubscriptionId,
    // The port is shared with the client cache; holding it here only keeps
    // cancelation possible, it does not extend the client's lifetime beyond
    // the process-wide cache.
    port: Arc<dyn RemoteConfigPort>,
}

// =============================================================================
// Listener Registry
// =============================================================================

/// Per-resource bookkeeping of remote-change subscriptions.
pub struct ListenerRegistry {
    queue: QueueHandle,
    active: RwLock<HashMap<ResourceKey, HashMap<ListenerTarget, ActiveListener>>>,
}

impl ListenerRegistry {
    /// Creates a registry that enqueues reconcile requests on `queue`.
    pub fn new(queue: QueueHandle) -> Self {
        ListenerRegistry {
            queue,
            active: RwLock::new(HashMap::new()),
        }
    }

    /// Converges the resource's subscriptions against its desired set.
    ///
    /// For `ServerToCluster` the desired set is one subscription per entry
    /// key; for `ClusterToServer` (and deleting resources) it is empty, so
    /// stale registrations from a direction flip or key-set change are
    /// canceled here.
    pub async fn sync(
        &self,
        resource: &ConfigSync,
        port: &Arc<dyn RemoteConfigPort>,
    ) -> SyncResult<()> {
        let resource_key = resource.key();

        let desired: HashSet<ListenerTarget> = if resource.spec.strategy.sync_direction
            == SyncDirection::ServerToCluster
            && !resource.is_deleting()
        {
            let identity = resource.spec.remote_server.identity()?;
            let group = resource.spec.remote_server.group.clone();
            resource
                .spec
                .entry_keys
                .iter()
                .map(|entry_key| ListenerTarget {
                    identity: identity.clone(),
                    group: group.clone(),
                    entry_key: entry_key.clone(),
                })
                .collect()
        } else {
            HashSet::new()
        };

        let mut active = self.active.write().await;
        let current = active.entry(resource_key.clone()).or_default();

        // Cancel stale registrations first.
        let stale: Vec<ListenerTarget> = current
            .keys()
            .filter(|t| !desired.contains(*t))
            .cloned()
            .collect();
        for target in stale {
            if let Some(listener) = current.remove(&target) {
                info!(
                    resource = %resource_key,
                    group = %target.group,
                    entry_key = %target.entry_key,
                    "Canceling stale listener"
                );
                listener.port.cancel_listen(listener.subscription).await?;
            }
        }

        // Register what is missing; existing targets are left untouched.
        for target in desired {
            if current.contains_key(&target) {
                continue;
            }
            let handler = Self::make_handler(self.queue.clone(), resource_key.clone());
            let subscription = port.listen(&target.group, &target.entry_key, handler).await?;
            debug!(
                resource = %resource_key,
                group = %target.group,
                entry_key = %target.entry_key,
                subscription = %subscription,
                "Registered listener"
            );
            current.insert(
                target,
                ActiveListener {
                    subscription,
                    port: port.clone(),
                },
            );
        }

        if current.is_empty() {
            active.remove(&resource_key);
        }
        Ok(())
    }

    /// Cancels every subscription owned by `resource_key`.
    ///
    /// Idempotent: canceling a resource with no registrations is a no-op.
    pub async fn cancel_all(&self, resource_key: &ResourceKey) -> SyncResult<()> {
        let listeners = self.active.write().await.remove(resource_key);
        if let Some(listeners) = listeners {
            info!(resource = %resource_key, count = listeners.len(), "Canceling all listeners");
            for listener in listeners.into_values() {
                listener.port.cancel_listen(listener.subscription).await?;
            }
        }
        Ok(())
    }

    /// Number of live subscriptions for one resource.
    pub async fn active_count(&self, resource_key: &ResourceKey) -> usize {
        self.active
            .read()
            .await
            .get(resource_key)
            .map(HashMap::len)
            .unwrap_or(0)
    }

    fn make_handler(queue: QueueHandle, resource_key: ResourceKey) -> ChangeHandler {
        Arc::new(move |change: ConfigChange| {
            debug!(
                resource = %resource_key,
                entry_key = %change.entry_key,
                "Remote change observed, enqueueing reconcile"
            );
            queue.enqueue(resource_key.clone());
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
