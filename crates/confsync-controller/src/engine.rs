//! # Sync Engine
//!
//! Direction-aware diff/apply logic converging local and remote entry sets
//! for one resource.
//!
//! ## Convergence Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Per-Entry Convergence                                │
//! │                                                                         │
//! │  CLUSTER → SERVER (local is source of truth)                           │
//! │  ───────────────────────────────────────────                           │
//! │  local present          → publish/upsert remote (idempotent)           │
//! │  local absent + syncDel → delete remote (absent remote = success)      │
//! │  local absent           → skip, remote left untouched                  │
//! │                                                                         │
//! │  SERVER → CLUSTER (remote is source of truth)                          │
//! │  ───────────────────────────────────────────                           │
//! │  remote present         → upsert key into local object                 │
//! │  remote absent + syncDel→ remove key from local object; a default-     │
//! │                           named object emptied this way is removed     │
//! │  remote absent          → local left untouched                         │
//! │                                                                         │
//! │  Entries are processed independently: a failure on one never stops     │
//! │  the others, and order never affects the converged result. The         │
//! │  aggregate fails the reconcile if any entry failed.                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Local writes use the store's optimistic concurrency: read, apply, write,
//! and on a version conflict reload and retry up to a bounded number of
//! attempts before surfacing a transient error.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

use confsync_core::{ConfigSync, EntrySyncStatus, SyncDirection};
use confsync_store::{KvObject, KvObjectStore};

use crate::error::{SyncError, SyncResult};
use crate::remote::RemoteConfigPort;

// =============================================================================
// Outcomes
// =============================================================================

/// Result of converging one entry.
#[derive(Debug)]
pub struct EntryOutcome {
    /// The entry key this outcome describes.
    pub entry_key: String,

    /// Convergence result for this entry alone.
    pub result: SyncResult<()>,
}

/// Aggregate result of one engine run.
#[derive(Debug, Default)]
pub struct SyncOutcome {
    /// Per-entry outcomes, one per spec entry key.
    pub entries: Vec<EntryOutcome>,
}

impl SyncOutcome {
    /// Number of entries that failed to converge.
    pub fn failed(&self) -> usize {
        self.entries.iter().filter(|e| e.result.is_err()).count()
    }

    /// Returns true when every entry converged.
    pub fn is_converged(&self) -> bool {
        self.failed() == 0
    }

    /// Renders per-entry statuses for the resource status sub-object.
    pub fn to_entry_statuses(&self) -> Vec<EntrySyncStatus> {
        let now = Utc::now();
        self.entries
            .iter()
            .map(|e| EntrySyncStatus {
                entry_key: e.entry_key.clone(),
                last_sync_time: now,
                ready: e.result.is_ok(),
                message: e.result.as_ref().err().map(|err| err.to_string()),
            })
            .collect()
    }

    /// Collapses the outcome into the aggregate reconcile result.
    pub fn into_result(self) -> SyncResult<()> {
        let failed = self.failed();
        if failed == 0 {
            Ok(())
        } else {
            Err(SyncError::EntrySyncFailed {
                failed,
                total: self.entries.len(),
            })
        }
    }
}

// =============================================================================
// Sync Engine
// =============================================================================

/// Converges one resource's entry set in its declared direction.
pub struct SyncEngine {
    /// Local key/value object accessor.
    objects: Arc<dyn KvObjectStore>,

    /// Bound on optimistic-concurrency retries for local writes.
    conflict_retry_limit: u32,
}

impl SyncEngine {
    /// Creates an engine over the given local object store.
    pub fn new(objects: Arc<dyn KvObjectStore>, conflict_retry_limit: u32) -> Self {
        SyncEngine {
            objects,
            conflict_retry_limit: conflict_retry_limit.max(1),
        }
    }

    /// Runs one convergence pass for `resource` against `port`.
    ///
    /// Entry-level failures are captured in the outcome; only resource-level
    /// failures (reading the local object for the push direction) surface
    /// as an error here.
    pub async fn run(
        &self,
        port: &dyn RemoteConfigPort,
        resource: &ConfigSync,
    ) -> SyncResult<SyncOutcome> {
        match resource.spec.strategy.sync_direction {
            SyncDirection::ClusterToServer => self.cluster_to_server(port, resource).await,
            SyncDirection::ServerToCluster => self.server_to_cluster(port, resource).await,
        }
    }

    // =========================================================================
    // Cluster → Server
    // =========================================================================

    async fn cluster_to_server(
        &self,
        port: &dyn RemoteConfigPort,
        resource: &ConfigSync,
    ) -> SyncResult<SyncOutcome> {
        let local_key = resource.local_object_key();
        let local = self.objects.read(&local_key).await?;
        let group = &resource.spec.remote_server.group;
        let sync_deletion = resource.spec.strategy.sync_deletion;
        let metadata = resource.spec.additional_config.as_ref();

        let mut outcome = SyncOutcome::default();
        for entry_key in &resource.spec.entry_keys {
            let content = local
                .as_ref()
                .and_then(|obj| obj.data.get(entry_key))
                .map(String::as_str);

            let result = match content {
                Some(content) => {
                    debug!(resource = %resource.key(), group, entry_key, "Publishing entry");
                    port.publish(group, entry_key, content, metadata).await
                }
                None if sync_deletion => {
                    debug!(resource = %resource.key(), group, entry_key, "Deleting remote entry");
                    port.delete(group, entry_key).await
                }
                None => {
                    debug!(
                        resource = %resource.key(),
                        entry_key,
                        "Local entry absent and deletion sync disabled, skipping"
                    );
                    Ok(())
                }
            };

            if let Err(ref e) = result {
                warn!(resource = %resource.key(), entry_key, error = %e, "Entry sync failed");
            }
            outcome.entries.push(EntryOutcome {
                entry_key: entry_key.clone(),
                result,
            });
        }

        Ok(outcome)
    }

    // =========================================================================
    // Server → Cluster
    // =========================================================================

    async fn server_to_cluster(
        &self,
        port: &dyn RemoteConfigPort,
        resource: &ConfigSync,
    ) -> SyncResult<SyncOutcome> {
        let group = &resource.spec.remote_server.group;

        let mut outcome = SyncOutcome::default();
        for entry_key in &resource.spec.entry_keys {
            let result = match port.get(group, entry_key).await {
                Ok(remote) => self.apply_entry(resource, entry_key, remote).await,
                Err(e) => Err(e),
            };

            if let Err(ref e) = result {
                warn!(resource = %resource.key(), entry_key, error = %e, "Entry sync failed");
            }
            outcome.entries.push(EntryOutcome {
                entry_key: entry_key.clone(),
                result,
            });
        }

        Ok(outcome)
    }

    /// Applies one fetched remote state to the local object, with bounded
    /// conflict retry.
    async fn apply_entry(
        &self,
        resource: &ConfigSync,
        entry_key: &str,
        remote: Option<String>,
    ) -> SyncResult<()> {
        let local_key = resource.local_object_key();
        let sync_deletion = resource.spec.strategy.sync_deletion;

        for attempt in 1..=self.conflict_retry_limit {
            let existing = self.objects.read(&local_key).await?;

            let write_result = match (&existing, &remote) {
                // Nothing local, nothing remote.
                (None, None) => return Ok(()),

                // Remote content, no local object yet: create it.
                (None, Some(content)) => {
                    let mut obj = KvObject::new(local_key.clone());
                    obj.data.insert(entry_key.to_string(), content.clone());
                    self.objects.write(obj).await.map(|_| ())
                }

                // Both sides present: upsert when drifted.
                (Some(obj), Some(content)) => {
                    if obj.data.get(entry_key).map(String::as_str) == Some(content.as_str()) {
                        return Ok(());
                    }
                    let mut next = obj.clone();
                    next.data.insert(entry_key.to_string(), content.clone());
                    self.objects.write(next).await.map(|_| ())
                }

                // Remote entry gone.
                (Some(obj), None) => {
                    if !sync_deletion || !obj.data.contains_key(entry_key) {
                        return Ok(());
                    }
                    let mut next = obj.clone();
                    next.data.remove(entry_key);

                    if next.is_empty() && resource.uses_default_local_object() {
                        // The object existed solely for this resource;
                        // removing its last entry removes the object.
                        match self.objects.delete(&local_key).await {
                            Ok(()) => Ok(()),
                            Err(e) if e.is_not_found() => Ok(()),
                            Err(e) => Err(e),
                        }
                    } else {
                        self.objects.write(next).await.map(|_| ())
                    }
                }
            };

            match write_result {
                Ok(()) => return Ok(()),
                Err(e) if e.is_conflict() => {
                    debug!(
                        object = %local_key,
                        entry_key,
                        attempt,
                        "Local write conflict, reloading"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(SyncError::Conflict {
            key: local_key.to_string(),
            attempts: self.conflict_retry_limit,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{ChangeHandler, MemoryConfigServer, SubscriptionId};
    use async_trait::async_trait;
    use confsync_core::{
        AdditionalConfig, ConfigSyncSpec, ObjectRef, RemoteServerSpec, ResourceKey, ResourceMeta,
        SyncPolicy, SyncStrategy,
    };
    use confsync_store::{MemoryStore, StoreError, StoreResult};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn resource(direction: SyncDirection, sync_deletion: bool) -> ConfigSync {
        ConfigSync {
            meta: ResourceMeta {
                name: "app-conf".to_string(),
                namespace: "prod".to_string(),
                generation: 1,
                ..Default::default()
            },
            spec: ConfigSyncSpec {
                entry_keys: vec!["a".to_string(), "b".to_string()],
                additional_config: None,
                strategy: SyncStrategy {
                    sync_policy: SyncPolicy::always(),
                    sync_deletion,
                    sync_direction: direction,
                },
                remote_server: RemoteServerSpec {
                    endpoint: Some("addr.example.com".to_string()),
                    remote_namespace: "ns-1".to_string(),
                    group: "g".to_string(),
                    ..Default::default()
                },
                local_object_ref: None,
            },
            status: Default::default(),
        }
    }

    async fn seed_local(store: &MemoryStore, key: &ResourceKey, pairs: &[(&str, &str)]) {
        let mut obj = KvObject::new(key.clone());
        for (k, v) in pairs {
            obj.data.insert(k.to_string(), v.to_string());
        }
        store.write(obj).await.unwrap();
    }

    #[tokio::test]
    async fn test_push_publishes_local_entries() {
        let store = Arc::new(MemoryStore::new());
        let server = MemoryConfigServer::new();
        let r = resource(SyncDirection::ClusterToServer, true);
        seed_local(&store, &r.local_object_key(), &[("a", "x1"), ("b", "y1")]).await;

        let engine = SyncEngine::new(store, 3);
        let outcome = engine.run(&server, &r).await.unwrap();

        assert!(outcome.is_converged());
        assert_eq!(outcome.entries.len(), 2);
        assert_eq!(server.get("g", "a").await.unwrap().as_deref(), Some("x1"));
        assert_eq!(server.get("g", "b").await.unwrap().as_deref(), Some("y1"));
    }

    #[tokio::test]
    async fn test_push_applies_additional_config() {
        let store = Arc::new(MemoryStore::new());
        let server = MemoryConfigServer::new();
        let mut r = resource(SyncDirection::ClusterToServer, true);
        let mut extra = AdditionalConfig::default();
        extra.labels.insert("team".to_string(), "platform".to_string());
        r.spec.additional_config = Some(extra);
        seed_local(&store, &r.local_object_key(), &[("a", "x1"), ("b", "y1")]).await;

        let engine = SyncEngine::new(store, 3);
        engine.run(&server, &r).await.unwrap();

        let (labels, _, _) = server.entry_metadata("g", "a").await.unwrap();
        assert_eq!(labels.get("team").map(String::as_str), Some("platform"));
    }

    #[tokio::test]
    async fn test_push_deletes_remote_when_local_absent() {
        let store = Arc::new(MemoryStore::new());
        let server = MemoryConfigServer::new();
        server.publish("g", "a", "stale", None).await.unwrap();
        server.publish("g", "b", "kept", None).await.unwrap();

        // Local object carries only "b"
        let r = resource(SyncDirection::ClusterToServer, true);
        seed_local(&store, &r.local_object_key(), &[("b", "kept")]).await;

        let engine = SyncEngine::new(store, 3);
        let outcome = engine.run(&server, &r).await.unwrap();

        assert!(outcome.is_converged());
        assert_eq!(server.get("g", "a").await.unwrap(), None);
        assert_eq!(server.get("g", "b").await.unwrap().as_deref(), Some("kept"));
    }

    #[tokio::test]
    async fn test_push_skips_absent_entry_without_deletion_sync() {
        let store = Arc::new(MemoryStore::new());
        let server = MemoryConfigServer::new();
        server.publish("g", "a", "untouched", None).await.unwrap();

        let r = resource(SyncDirection::ClusterToServer, false);
        seed_local(&store, &r.local_object_key(), &[("b", "y1")]).await;

        let engine = SyncEngine::new(store, 3);
        let outcome = engine.run(&server, &r).await.unwrap();

        assert!(outcome.is_converged());
        assert_eq!(server.get("g", "a").await.unwrap().as_deref(), Some("untouched"));
    }

    #[tokio::test]
    async fn test_push_with_no_local_object_and_no_deletion_is_noop() {
        let store = Arc::new(MemoryStore::new());
        let server = MemoryConfigServer::new();
        let r = resource(SyncDirection::ClusterToServer, false);

        let engine = SyncEngine::new(store, 3);
        let outcome = engine.run(&server, &r).await.unwrap();
        assert!(outcome.is_converged());
        assert_eq!(server.op_counts().await.effective_publishes, 0);
    }

    #[tokio::test]
    async fn test_pull_upserts_into_local_object() {
        let store = Arc::new(MemoryStore::new());
        let server = MemoryConfigServer::new();
        server.publish("g", "a", "x1", None).await.unwrap();
        server.publish("g", "b", "y1", None).await.unwrap();

        let r = resource(SyncDirection::ServerToCluster, true);
        let engine = SyncEngine::new(store.clone(), 3);
        let outcome = engine.run(&server, &r).await.unwrap();

        assert!(outcome.is_converged());
        let obj = store.read(&r.local_object_key()).await.unwrap().unwrap();
        assert_eq!(obj.data.get("a").map(String::as_str), Some("x1"));
        assert_eq!(obj.data.get("b").map(String::as_str), Some("y1"));
    }

    #[tokio::test]
    async fn test_pull_is_idempotent_when_converged() {
        let store = Arc::new(MemoryStore::new());
        let server = MemoryConfigServer::new();
        server.publish("g", "a", "x1", None).await.unwrap();
        server.publish("g", "b", "y1", None).await.unwrap();

        let r = resource(SyncDirection::ServerToCluster, true);
        let engine = SyncEngine::new(store.clone(), 3);
        engine.run(&server, &r).await.unwrap();

        let before = store.read(&r.local_object_key()).await.unwrap().unwrap();
        engine.run(&server, &r).await.unwrap();
        let after = store.read(&r.local_object_key()).await.unwrap().unwrap();

        // No write happened: the version is unchanged
        assert_eq!(before.resource_version, after.resource_version);
    }

    #[tokio::test]
    async fn test_pull_removes_key_on_remote_absence() {
        let store = Arc::new(MemoryStore::new());
        let server = MemoryConfigServer::new();
        server.publish("g", "a", "x1", None).await.unwrap();

        let r = resource(SyncDirection::ServerToCluster, true);
        seed_local(&store, &r.local_object_key(), &[("a", "x0"), ("b", "gone")]).await;

        let engine = SyncEngine::new(store.clone(), 3);
        let outcome = engine.run(&server, &r).await.unwrap();

        assert!(outcome.is_converged());
        let obj = store.read(&r.local_object_key()).await.unwrap().unwrap();
        assert_eq!(obj.data.get("a").map(String::as_str), Some("x1"));
        assert!(!obj.data.contains_key("b"));
    }

    #[tokio::test]
    async fn test_pull_removes_emptied_default_named_object() {
        let store = Arc::new(MemoryStore::new());
        let server = MemoryConfigServer::new();

        let mut r = resource(SyncDirection::ServerToCluster, true);
        r.spec.entry_keys = vec!["a".to_string()];
        seed_local(&store, &r.local_object_key(), &[("a", "x1")]).await;

        let engine = SyncEngine::new(store.clone(), 3);
        let outcome = engine.run(&server, &r).await.unwrap();

        assert!(outcome.is_converged());
        assert!(store.read(&r.local_object_key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_pull_keeps_emptied_explicitly_referenced_object() {
        let store = Arc::new(MemoryStore::new());
        let server = MemoryConfigServer::new();

        let mut r = resource(SyncDirection::ServerToCluster, true);
        r.spec.entry_keys = vec!["a".to_string()];
        r.spec.local_object_ref = Some(ObjectRef::named("shared-conf"));
        seed_local(&store, &r.local_object_key(), &[("a", "x1")]).await;

        let engine = SyncEngine::new(store.clone(), 3);
        engine.run(&server, &r).await.unwrap();

        let obj = store.read(&r.local_object_key()).await.unwrap().unwrap();
        assert!(obj.data.is_empty());
    }

    #[tokio::test]
    async fn test_pull_without_deletion_sync_leaves_local_untouched() {
        let store = Arc::new(MemoryStore::new());
        let server = MemoryConfigServer::new();

        let mut r = resource(SyncDirection::ServerToCluster, false);
        r.spec.entry_keys = vec!["a".to_string()];
        seed_local(&store, &r.local_object_key(), &[("a", "x1")]).await;

        let engine = SyncEngine::new(store.clone(), 3);
        engine.run(&server, &r).await.unwrap();

        let obj = store.read(&r.local_object_key()).await.unwrap().unwrap();
        assert_eq!(obj.data.get("a").map(String::as_str), Some("x1"));
    }

    // -------------------------------------------------------------------------
    // Per-entry isolation
    // -------------------------------------------------------------------------

    /// Port wrapper that fails every operation touching one poisoned key.
    struct FailingPort {
        inner: MemoryConfigServer,
        poisoned: String,
    }

    #[async_trait]
    impl RemoteConfigPort for FailingPort {
        async fn get(&self, group: &str, key: &str) -> SyncResult<Option<String>> {
            if key == self.poisoned {
                return Err(SyncError::RemoteUnavailable("poisoned".into()));
            }
            self.inner.get(group, key).await
        }

        async fn publish(
            &self,
            group: &str,
            key: &str,
            content: &str,
            metadata: Option<&AdditionalConfig>,
        ) -> SyncResult<()> {
            if key == self.poisoned {
                return Err(SyncError::RemoteUnavailable("poisoned".into()));
            }
            self.inner.publish(group, key, content, metadata).await
        }

        async fn delete(&self, group: &str, key: &str) -> SyncResult<()> {
            if key == self.poisoned {
                return Err(SyncError::RemoteUnavailable("poisoned".into()));
            }
            self.inner.delete(group, key).await
        }

        async fn listen(
            &self,
            group: &str,
            key: &str,
            handler: ChangeHandler,
        ) -> SyncResult<SubscriptionId> {
            self.inner.listen(group, key, handler).await
        }

        async fn cancel_listen(&self, subscription: SubscriptionId) -> SyncResult<()> {
            self.inner.cancel_listen(subscription).await
        }
    }

    #[tokio::test]
    async fn test_one_failing_entry_does_not_stop_the_others() {
        let store = Arc::new(MemoryStore::new());
        let port = FailingPort {
            inner: MemoryConfigServer::new(),
            poisoned: "a".to_string(),
        };

        let r = resource(SyncDirection::ClusterToServer, true);
        seed_local(&store, &r.local_object_key(), &[("a", "x1"), ("b", "y1")]).await;

        let engine = SyncEngine::new(store, 3);
        let outcome = engine.run(&port, &r).await.unwrap();

        assert_eq!(outcome.failed(), 1);
        assert_eq!(port.inner.get("g", "b").await.unwrap().as_deref(), Some("y1"));

        let statuses = outcome.to_entry_statuses();
        assert_eq!(statuses.len(), 2);
        assert!(!statuses[0].ready);
        assert!(statuses[0].message.as_deref().unwrap_or("").contains("poisoned"));
        assert!(statuses[1].ready);

        let err = outcome.into_result().unwrap_err();
        assert!(matches!(
            err,
            SyncError::EntrySyncFailed { failed: 1, total: 2 }
        ));
    }

    // -------------------------------------------------------------------------
    // Conflict retry
    // -------------------------------------------------------------------------

    /// Store wrapper injecting version conflicts on the first N writes.
    struct ConflictingStore {
        inner: Arc<MemoryStore>,
        remaining_conflicts: AtomicU32,
    }

    #[async_trait]
    impl KvObjectStore for ConflictingStore {
        async fn read(&self, key: &ResourceKey) -> StoreResult<Option<KvObject>> {
            self.inner.read(key).await
        }

        async fn write(&self, object: KvObject) -> StoreResult<KvObject> {
            if self
                .remaining_conflicts
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(StoreError::Conflict {
                    key: object.key.to_string(),
                    submitted: object.resource_version,
                    current: object.resource_version + 1,
                });
            }
            self.inner.write(object).await
        }

        async fn delete(&self, key: &ResourceKey) -> StoreResult<()> {
            self.inner.delete(key).await
        }
    }

    #[tokio::test]
    async fn test_conflicts_are_retried_until_success() {
        let inner = Arc::new(MemoryStore::new());
        let store = Arc::new(ConflictingStore {
            inner: inner.clone(),
            remaining_conflicts: AtomicU32::new(2),
        });
        let server = MemoryConfigServer::new();
        server.publish("g", "a", "x1", None).await.unwrap();

        let mut r = resource(SyncDirection::ServerToCluster, true);
        r.spec.entry_keys = vec!["a".to_string()];

        let engine = SyncEngine::new(store, 5);
        let outcome = engine.run(&server, &r).await.unwrap();
        assert!(outcome.is_converged());

        let obj = inner.read(&r.local_object_key()).await.unwrap().unwrap();
        assert_eq!(obj.data.get("a").map(String::as_str), Some("x1"));
    }

    #[tokio::test]
    async fn test_exhausted_conflicts_surface_as_transient_error() {
        let inner = Arc::new(MemoryStore::new());
        let store = Arc::new(ConflictingStore {
            inner,
            remaining_conflicts: AtomicU32::new(u32::MAX),
        });
        let server = MemoryConfigServer::new();
        server.publish("g", "a", "x1", None).await.unwrap();

        let mut r = resource(SyncDirection::ServerToCluster, true);
        r.spec.entry_keys = vec!["a".to_string()];

        let engine = SyncEngine::new(store, 3);
        let outcome = engine.run(&server, &r).await.unwrap();
        assert_eq!(outcome.failed(), 1);

        let err = &outcome.entries[0].result;
        assert!(matches!(
            err,
            Err(SyncError::Conflict { attempts: 3, .. })
        ));
    }
}
