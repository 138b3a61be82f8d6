//! # Remote Config Port
//!
//! The capability the sync engine needs from the centralized configuration
//! service, plus the in-memory variant used by tests and embedded setups.
//!
//! ## Port Surface
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      RemoteConfigPort                                   │
//! │                                                                         │
//! │  get(group, key)            → content | absent                         │
//! │  publish(group, key, c, m)  → ack (idempotent upsert)                  │
//! │  delete(group, key)         → ack (absent entry is success)            │
//! │  listen(group, key, fn)     → subscription id                          │
//! │  cancel_listen(id)          → ack                                      │
//! │                                                                         │
//! │  A port is bound to one server identity (endpoint + remote namespace)  │
//! │  at construction time; the client cache hands the same port to every   │
//! │  resource sharing that identity.                                       │
//! │                                                                         │
//! │  VARIANTS                                                              │
//! │  ────────                                                              │
//! │  • MemoryConfigServer (this module) - in-process, with push            │
//! │  • HttpConfigClient   (http module) - networked                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Change handlers fire on tasks distinct from reconcile workers. Their only
//! permitted side effect is enqueueing a reconcile request — handlers must
//! never write status or mutate local objects.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use confsync_core::AdditionalConfig;

use crate::error::SyncResult;

// =============================================================================
// Port Types
// =============================================================================

/// Opaque identifier for one change-listener subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Change event delivered to listeners.
#[derive(Debug, Clone)]
pub struct ConfigChange {
    /// Group of the changed entry.
    pub group: String,

    /// Key of the changed entry.
    pub entry_key: String,

    /// New content, or None when the entry was deleted.
    pub content: Option<String>,
}

/// Callback invoked on out-of-band remote change.
pub type ChangeHandler = Arc<dyn Fn(ConfigChange) + Send + Sync>;

// =============================================================================
// Port Trait
// =============================================================================

/// Abstract capability over one remote configuration store.
#[async_trait]
pub trait RemoteConfigPort: Send + Sync {
    /// Fetches entry content, or None when the entry does not exist.
    async fn get(&self, group: &str, key: &str) -> SyncResult<Option<String>>;

    /// Creates or replaces an entry. Republishing identical content is a
    /// success, even when the store reports it as a no-op.
    async fn publish(
        &self,
        group: &str,
        key: &str,
        content: &str,
        metadata: Option<&AdditionalConfig>,
    ) -> SyncResult<()>;

    /// Removes an entry. Deleting an absent entry is a success.
    async fn delete(&self, group: &str, key: &str) -> SyncResult<()>;

    /// Subscribes to out-of-band changes of one entry.
    async fn listen(
        &self,
        group: &str,
        key: &str,
        handler: ChangeHandler,
    ) -> SyncResult<SubscriptionId>;

    /// Cancels a subscription. Unknown ids are a no-op.
    async fn cancel_listen(&self, subscription: SubscriptionId) -> SyncResult<()>;
}

// =============================================================================
// In-Memory Variant
// =============================================================================

#[derive(Debug, Clone, Default)]
struct StoredEntry {
    content: String,
    labels: BTreeMap<String, String>,
    properties: BTreeMap<String, String>,
    tags: BTreeMap<String, String>,
}

struct Subscription {
    group: String,
    entry_key: String,
    handler: ChangeHandler,
}

/// Operation counters, exposed so idempotence tests can assert that a
/// converged reconcile performs no net-new writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpCounts {
    /// Publish calls that changed stored content.
    pub effective_publishes: u64,

    /// Publish calls that were content-identical no-ops.
    pub noop_publishes: u64,

    /// Delete calls that removed an entry.
    pub effective_deletes: u64,
}

/// In-process remote configuration store with push notification.
///
/// This is the test/fake variant of [`RemoteConfigPort`]: fully functional,
/// including listener delivery, so the whole controller can be exercised
/// without a network.
#[derive(Default)]
pub struct MemoryConfigServer {
    entries: RwLock<HashMap<(String, String), StoredEntry>>,
    subscriptions: RwLock<HashMap<SubscriptionId, Subscription>>,
    next_subscription: AtomicU64,
    counts: RwLock<OpCounts>,
}

impl MemoryConfigServer {
    /// Creates an empty server.
    pub fn new() -> Self {
        MemoryConfigServer::default()
    }

    /// Returns the operation counters.
    pub async fn op_counts(&self) -> OpCounts {
        *self.counts.read().await
    }

    /// Returns the number of live subscriptions.
    pub async fn subscription_count(&self) -> usize {
        self.subscriptions.read().await.len()
    }

    /// Returns stored metadata for an entry (labels, properties, tags).
    pub async fn entry_metadata(
        &self,
        group: &str,
        key: &str,
    ) -> Option<(BTreeMap<String, String>, BTreeMap<String, String>, BTreeMap<String, String>)>
    {
        self.entries
            .read()
            .await
            .get(&(group.to_string(), key.to_string()))
            .map(|e| (e.labels.clone(), e.properties.clone(), e.tags.clone()))
    }

    /// Delivers a change to every subscription watching (group, key).
    ///
    /// Handlers run on a spawned task so publishers are never blocked and
    /// handlers never execute on a reconcile worker.
    async fn notify(&self, group: &str, key: &str, content: Option<String>) {
        let subs = self.subscriptions.read().await;
        for sub in subs.values() {
            if sub.group == group && sub.entry_key == key {
                let handler = sub.handler.clone();
                let change = ConfigChange {
                    group: group.to_string(),
                    entry_key: key.to_string(),
                    content: content.clone(),
                };
                tokio::spawn(async move {
                    handler(change);
                });
            }
        }
    }
}

#[async_trait]
impl RemoteConfigPort for MemoryConfigServer {
    async fn get(&self, group: &str, key: &str) -> SyncResult<Option<String>> {
        Ok(self
            .entries
            .read()
            .await
            .get(&(group.to_string(), key.to_string()))
            .map(|e| e.content.clone()))
    }

    async fn publish(
        &self,
        group: &str,
        key: &str,
        content: &str,
        metadata: Option<&AdditionalConfig>,
    ) -> SyncResult<()> {
        let map_key = (group.to_string(), key.to_string());
        let changed = {
            let mut entries = self.entries.write().await;
            let mut counts = self.counts.write().await;

            match entries.get(&map_key) {
                Some(existing) if existing.content == content => {
                    counts.noop_publishes += 1;
                    false
                }
                _ => {
                    let entry = StoredEntry {
                        content: content.to_string(),
                        labels: metadata.map(|m| m.labels.clone()).unwrap_or_default(),
                        properties: metadata.map(|m| m.properties.clone()).unwrap_or_default(),
                        tags: metadata.map(|m| m.tags.clone()).unwrap_or_default(),
                    };
                    entries.insert(map_key, entry);
                    counts.effective_publishes += 1;
                    true
                }
            }
        };

        if changed {
            debug!(group, key, "Published entry");
            self.notify(group, key, Some(content.to_string())).await;
        }
        Ok(())
    }

    async fn delete(&self, group: &str, key: &str) -> SyncResult<()> {
        let removed = {
            let mut entries = self.entries.write().await;
            entries.remove(&(group.to_string(), key.to_string())).is_some()
        };

        if removed {
            self.counts.write().await.effective_deletes += 1;
            debug!(group, key, "Deleted entry");
            self.notify(group, key, None).await;
        }
        // Deleting an absent entry is a success by contract.
        Ok(())
    }

    async fn listen(
        &self,
        group: &str,
        key: &str,
        handler: ChangeHandler,
    ) -> SyncResult<SubscriptionId> {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.subscriptions.write().await.insert(
            id,
            Subscription {
                group: group.to_string(),
                entry_key: key.to_string(),
                handler,
            },
        );
        debug!(group, key, subscription = %id, "Registered listener");
        Ok(id)
    }

    async fn cancel_listen(&self, subscription: SubscriptionId) -> SyncResult<()> {
        if self.subscriptions.write().await.remove(&subscription).is_some() {
            debug!(subscription = %subscription, "Canceled listener");
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_publish_get_delete_round_trip() {
        let server = MemoryConfigServer::new();
        assert_eq!(server.get("g", "a").await.unwrap(), None);

        server.publish("g", "a", "x1", None).await.unwrap();
        assert_eq!(server.get("g", "a").await.unwrap(), Some("x1".to_string()));

        server.delete("g", "a").await.unwrap();
        assert_eq!(server.get("g", "a").await.unwrap(), None);

        // Deleting again is still a success
        server.delete("g", "a").await.unwrap();
    }

    #[tokio::test]
    async fn test_republish_identical_content_is_noop() {
        let server = MemoryConfigServer::new();
        server.publish("g", "a", "x1", None).await.unwrap();
        server.publish("g", "a", "x1", None).await.unwrap();

        let counts = server.op_counts().await;
        assert_eq!(counts.effective_publishes, 1);
        assert_eq!(counts.noop_publishes, 1);
    }

    #[tokio::test]
    async fn test_publish_stores_metadata() {
        let server = MemoryConfigServer::new();
        let mut meta = AdditionalConfig::default();
        meta.labels.insert("team".to_string(), "platform".to_string());
        meta.tags.insert("env".to_string(), "prod".to_string());

        server.publish("g", "a", "x1", Some(&meta)).await.unwrap();
        let (labels, _, tags) = server.entry_metadata("g", "a").await.unwrap();
        assert_eq!(labels.get("team").map(String::as_str), Some("platform"));
        assert_eq!(tags.get("env").map(String::as_str), Some("prod"));
    }

    #[tokio::test]
    async fn test_listener_fires_on_change_and_delete() {
        let server = MemoryConfigServer::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let handler: ChangeHandler = Arc::new(move |change: ConfigChange| {
            let _ = tx.send(change);
        });
        let sub = server.listen("g", "a", handler).await.unwrap();
        assert_eq!(server.subscription_count().await, 1);

        server.publish("g", "a", "x1", None).await.unwrap();
        let change = rx.recv().await.unwrap();
        assert_eq!(change.entry_key, "a");
        assert_eq!(change.content.as_deref(), Some("x1"));

        server.delete("g", "a").await.unwrap();
        let change = rx.recv().await.unwrap();
        assert_eq!(change.content, None);

        server.cancel_listen(sub).await.unwrap();
        assert_eq!(server.subscription_count().await, 0);

        // No delivery after cancel
        server.publish("g", "a", "x2", None).await.unwrap();
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_listener_ignores_other_keys() {
        let server = MemoryConfigServer::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handler: ChangeHandler = Arc::new(move |change: ConfigChange| {
            let _ = tx.send(change);
        });
        server.listen("g", "a", handler).await.unwrap();

        server.publish("g", "other", "x1", None).await.unwrap();
        server.publish("other-group", "a", "x1", None).await.unwrap();
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
    }
}
