//! # In-Memory Store
//!
//! A complete in-memory implementation of the three accessor traits, with
//! the same optimistic-concurrency and finalizer semantics the controller
//! relies on from the real declarative store.
//!
//! ## Semantics Enforced Here
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    MemoryStore Guarantees                               │
//! │                                                                         │
//! │  VERSIONING                                                            │
//! │  ──────────                                                            │
//! │  • Every write is stamped from one monotonic counter                   │
//! │  • Updates must carry the version they read; stale → Conflict          │
//! │  • KvObject writes with version 0 are creates                          │
//! │                                                                         │
//! │  GENERATION                                                            │
//! │  ──────────                                                            │
//! │  • Resource generation bumps only when the spec changes                │
//! │  • Status writes never bump generation                                 │
//! │                                                                         │
//! │  FINALIZER-GATED DELETION                                              │
//! │  ────────────────────────                                              │
//! │  • delete() marks deletion_timestamp while finalizers exist            │
//! │  • an update() that leaves finalizers empty on a deleting resource     │
//! │    removes the object for real                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! One store instance holds all three object kinds so a test can wire a
//! single `Arc<MemoryStore>` everywhere a trait object is expected.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use confsync_core::{ConfigSync, ConfigSyncStatus, ResourceKey};

use crate::error::{StoreError, StoreResult};
use crate::object::{Credential, KvObject};
use crate::traits::{CredentialStore, KvObjectStore, ResourceStore};

// =============================================================================
// Store State
// =============================================================================

#[derive(Default)]
struct Inner {
    resources: HashMap<ResourceKey, ConfigSync>,
    objects: HashMap<ResourceKey, KvObject>,
    credentials: HashMap<ResourceKey, Credential>,
    version_counter: i64,
}

impl Inner {
    fn next_version(&mut self) -> i64 {
        self.version_counter += 1;
        self.version_counter
    }
}

/// In-memory declarative store implementing all three accessor traits.
#[derive(Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        MemoryStore::default()
    }
}

// =============================================================================
// Resource Store
// =============================================================================

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn get(&self, key: &ResourceKey) -> StoreResult<Option<ConfigSync>> {
        Ok(self.inner.read().await.resources.get(key).cloned())
    }

    async fn list(&self) -> StoreResult<Vec<ConfigSync>> {
        Ok(self.inner.read().await.resources.values().cloned().collect())
    }

    async fn create(&self, mut resource: ConfigSync) -> StoreResult<ConfigSync> {
        let key = resource.key();
        let mut inner = self.inner.write().await;

        if inner.resources.contains_key(&key) {
            return Err(StoreError::AlreadyExists {
                kind: "resource",
                key: key.to_string(),
            });
        }

        resource.meta.uid = Uuid::new_v4().to_string();
        resource.meta.generation = 1;
        resource.meta.resource_version = inner.next_version();
        resource.meta.deletion_timestamp = None;

        debug!(key = %key, version = resource.meta.resource_version, "Created resource");
        inner.resources.insert(key, resource.clone());
        Ok(resource)
    }

    async fn update(&self, mut resource: ConfigSync) -> StoreResult<ConfigSync> {
        let key = resource.key();
        let mut inner = self.inner.write().await;

        let stored = match inner.resources.get(&key) {
            Some(r) => r.clone(),
            None => {
                return Err(StoreError::NotFound {
                    kind: "resource",
                    key: key.to_string(),
                })
            }
        };

        if resource.meta.resource_version != stored.meta.resource_version {
            return Err(StoreError::Conflict {
                key: key.to_string(),
                submitted: resource.meta.resource_version,
                current: stored.meta.resource_version,
            });
        }

        // A deleting resource whose finalizers have all been removed is
        // gone for real once this write lands.
        if stored.meta.is_deleting() && resource.meta.finalizers.is_empty() {
            inner.resources.remove(&key);
            debug!(key = %key, "Removed resource after final finalizer");
            return Ok(resource);
        }

        // Spec edits bump generation; metadata-only edits do not.
        resource.meta.uid = stored.meta.uid.clone();
        resource.meta.deletion_timestamp = stored.meta.deletion_timestamp;
        resource.meta.generation = if resource.spec != stored.spec {
            stored.meta.generation + 1
        } else {
            stored.meta.generation
        };
        resource.meta.resource_version = inner.next_version();
        // The status sub-object is owned by update_status.
        resource.status = stored.status;

        inner.resources.insert(key, resource.clone());
        Ok(resource)
    }

    async fn update_status(
        &self,
        key: &ResourceKey,
        status: ConfigSyncStatus,
    ) -> StoreResult<ConfigSync> {
        let mut inner = self.inner.write().await;
        let version = inner.next_version();

        let resource = inner
            .resources
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound {
                kind: "resource",
                key: key.to_string(),
            })?;

        resource.status = status;
        resource.meta.resource_version = version;
        Ok(resource.clone())
    }

    async fn delete(&self, key: &ResourceKey) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let version = inner.next_version();

        let resource = inner
            .resources
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound {
                kind: "resource",
                key: key.to_string(),
            })?;

        if resource.meta.finalizers.is_empty() {
            inner.resources.remove(key);
            debug!(key = %key, "Removed resource (no finalizers)");
            return Ok(());
        }

        if resource.meta.deletion_timestamp.is_none() {
            resource.meta.deletion_timestamp = Some(Utc::now());
            resource.meta.resource_version = version;
            debug!(key = %key, "Marked resource for deletion");
        }
        Ok(())
    }
}

// =============================================================================
// Key/Value Object Store
// =============================================================================

#[async_trait]
impl KvObjectStore for MemoryStore {
    async fn read(&self, key: &ResourceKey) -> StoreResult<Option<KvObject>> {
        Ok(self.inner.read().await.objects.get(key).cloned())
    }

    async fn write(&self, mut object: KvObject) -> StoreResult<KvObject> {
        let key = object.key.clone();
        let mut inner = self.inner.write().await;

        match inner.objects.get(&key) {
            None => {
                if object.resource_version != 0 {
                    return Err(StoreError::NotFound {
                        kind: "kv object",
                        key: key.to_string(),
                    });
                }
            }
            Some(stored) => {
                if object.resource_version != stored.resource_version {
                    return Err(StoreError::Conflict {
                        key: key.to_string(),
                        submitted: object.resource_version,
                        current: stored.resource_version,
                    });
                }
            }
        }

        object.resource_version = inner.next_version();
        inner.objects.insert(key, object.clone());
        Ok(object)
    }

    async fn delete(&self, key: &ResourceKey) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        inner
            .objects
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound {
                kind: "kv object",
                key: key.to_string(),
            })
    }
}

// =============================================================================
// Credential Store
// =============================================================================

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn read(&self, key: &ResourceKey) -> StoreResult<Option<Credential>> {
        Ok(self.inner.read().await.credentials.get(key).cloned())
    }

    async fn put(&self, credential: Credential) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        inner.credentials.insert(credential.key.clone(), credential);
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use confsync_core::{
        ConfigSyncSpec, RemoteServerSpec, ResourceMeta, SyncDirection, SyncPolicy, SyncStrategy,
        CLEANUP_FINALIZER,
    };

    fn resource(name: &str) -> ConfigSync {
        ConfigSync {
            meta: ResourceMeta {
                name: name.to_string(),
                namespace: "test".to_string(),
                ..Default::default()
            },
            spec: ConfigSyncSpec {
                entry_keys: vec!["a".to_string()],
                additional_config: None,
                strategy: SyncStrategy {
                    sync_policy: SyncPolicy::always(),
                    sync_deletion: false,
                    sync_direction: SyncDirection::ClusterToServer,
                },
                remote_server: RemoteServerSpec {
                    endpoint: Some("addr.example.com".to_string()),
                    group: "g".to_string(),
                    ..Default::default()
                },
                local_object_ref: None,
            },
            status: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_create_assigns_identity() {
        let store = MemoryStore::new();
        let created = store.create(resource("r1")).await.unwrap();
        assert!(!created.meta.uid.is_empty());
        assert_eq!(created.meta.generation, 1);
        assert!(created.meta.resource_version > 0);

        let err = store.create(resource("r1")).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_update_conflicts_on_stale_version() {
        let store = MemoryStore::new();
        let created = store.create(resource("r1")).await.unwrap();

        let mut fresh = created.clone();
        fresh.spec.entry_keys.push("b".to_string());
        let updated = store.update(fresh).await.unwrap();
        assert_eq!(updated.meta.generation, 2);

        // The first copy is now stale
        let mut stale = created;
        stale.spec.entry_keys.push("c".to_string());
        let err = store.update(stale).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_metadata_update_keeps_generation() {
        let store = MemoryStore::new();
        let mut r = store.create(resource("r1")).await.unwrap();
        r.meta.finalizers.push(CLEANUP_FINALIZER.to_string());
        let updated = store.update(r).await.unwrap();
        assert_eq!(updated.meta.generation, 1);
    }

    #[tokio::test]
    async fn test_finalizer_gated_deletion() {
        let store = MemoryStore::new();
        let mut r = store.create(resource("r1")).await.unwrap();
        r.meta.finalizers.push(CLEANUP_FINALIZER.to_string());
        let r = store.update(r).await.unwrap();
        let key = r.key();

        // Delete only marks the resource while the finalizer is present
        ResourceStore::delete(&store, &key).await.unwrap();
        let marked = ResourceStore::get(&store, &key).await.unwrap().unwrap();
        assert!(marked.meta.is_deleting());

        // Removing the finalizer lets the object go
        let mut done = marked;
        done.meta.finalizers.clear();
        store.update(done).await.unwrap();
        assert!(ResourceStore::get(&store, &key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_without_finalizers_is_immediate() {
        let store = MemoryStore::new();
        let r = store.create(resource("r1")).await.unwrap();
        let key = r.key();
        ResourceStore::delete(&store, &key).await.unwrap();
        assert!(ResourceStore::get(&store, &key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_preserves_status() {
        let store = MemoryStore::new();
        let r = store.create(resource("r1")).await.unwrap();
        let key = r.key();

        let mut status = ConfigSyncStatus::default();
        status.observed_generation = 1;
        store.update_status(&key, status).await.unwrap();

        let mut edit = ResourceStore::get(&store, &key).await.unwrap().unwrap();
        edit.status = ConfigSyncStatus::default(); // would clobber if honored
        let after = store.update(edit).await.unwrap();
        assert_eq!(after.status.observed_generation, 1);
    }

    #[tokio::test]
    async fn test_kv_write_create_and_conflict() {
        let store = MemoryStore::new();
        let key = ResourceKey::new("test", "conf");

        let mut obj = KvObject::new(key.clone());
        obj.data.insert("a".to_string(), "x1".to_string());
        let stored = store.write(obj.clone()).await.unwrap();
        assert!(stored.resource_version > 0);

        // Creating again with version 0 collides... as a conflict on the
        // now-existing object
        let err = store.write(obj).await.unwrap_err();
        assert!(err.is_conflict());

        // Writing at the stored version succeeds
        let mut next = stored.clone();
        next.data.insert("a".to_string(), "x2".to_string());
        let stored2 = store.write(next).await.unwrap();
        assert!(stored2.resource_version > stored.resource_version);

        // Updating a missing object is NotFound
        let mut ghost = KvObject::new(ResourceKey::new("test", "ghost"));
        ghost.resource_version = 42;
        assert!(store.write(ghost).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_credential_round_trip() {
        let store = MemoryStore::new();
        let key = ResourceKey::new("test", "creds");
        store
            .put(Credential::new(key.clone()).with_field("ak", "id"))
            .await
            .unwrap();
        let got = CredentialStore::read(&store, &key).await.unwrap().unwrap();
        assert_eq!(got.field("ak"), Some("id"));
    }
}
