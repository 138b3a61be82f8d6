//! # Accessor Traits
//!
//! The three capabilities the controller needs from the declarative store.
//! Concrete transports (cluster API calls, watch streams) live behind these
//! traits; the controller never sees them.
//!
//! ## Accessor Surface
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Store Accessors                                     │
//! │                                                                         │
//! │  ResourceStore          KvObjectStore          CredentialStore         │
//! │  ─────────────          ─────────────          ───────────────         │
//! │  get / list             read                   read                    │
//! │  create / update        write (version-gated)  put                     │
//! │  update_status          create-on-version-0                            │
//! │  delete (finalizer-     delete                                         │
//! │   gated removal)                                                       │
//! │                                                                         │
//! │  All three are object-safe async traits so the controller can hold     │
//! │  them as Arc<dyn …> and tests can inject the in-memory store.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use confsync_core::{ConfigSync, ConfigSyncStatus, ResourceKey};

use crate::error::StoreResult;
use crate::object::{Credential, KvObject};

// =============================================================================
// Resource Store
// =============================================================================

/// Access to stored ConfigSync resources.
///
/// `update` is version-gated: the submitted resource must carry the
/// `resource_version` it was read at. Spec changes bump `generation`.
/// Deletion is finalizer-gated: `delete` marks the resource with a deletion
/// timestamp, and the object disappears only once an `update` leaves its
/// finalizer list empty.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Fetches one resource, or None when absent.
    async fn get(&self, key: &ResourceKey) -> StoreResult<Option<ConfigSync>>;

    /// Lists all stored resources.
    async fn list(&self) -> StoreResult<Vec<ConfigSync>>;

    /// Stores a new resource. Fails when the key is taken.
    async fn create(&self, resource: ConfigSync) -> StoreResult<ConfigSync>;

    /// Writes back a resource read earlier; conflicts on stale versions.
    ///
    /// When the stored resource is marked for deletion and the submitted
    /// finalizer list is empty, the write removes the object instead.
    async fn update(&self, resource: ConfigSync) -> StoreResult<ConfigSync>;

    /// Replaces the status sub-object without touching spec or generation.
    ///
    /// Status is single-writer (the reconciler), so this write is applied
    /// against the current stored object rather than version-gated.
    async fn update_status(
        &self,
        key: &ResourceKey,
        status: ConfigSyncStatus,
    ) -> StoreResult<ConfigSync>;

    /// Requests deletion: marks the deletion timestamp, or removes the
    /// object outright when no finalizers are present.
    async fn delete(&self, key: &ResourceKey) -> StoreResult<()>;
}

// =============================================================================
// Key/Value Object Store
// =============================================================================

/// Access to local key/value objects, with optimistic concurrency.
#[async_trait]
pub trait KvObjectStore: Send + Sync {
    /// Fetches one object, or None when absent.
    async fn read(&self, key: &ResourceKey) -> StoreResult<Option<KvObject>>;

    /// Writes an object.
    ///
    /// `resource_version == 0` creates (failing if the key is taken); any
    /// other version updates and conflicts when stale. Returns the stored
    /// object with its new version.
    async fn write(&self, object: KvObject) -> StoreResult<KvObject>;

    /// Removes an object. Not-found is an error; callers that tolerate
    /// absence check `StoreError::is_not_found`.
    async fn delete(&self, key: &ResourceKey) -> StoreResult<()>;
}

// =============================================================================
// Credential Store
// =============================================================================

/// Read access to stored credential objects.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Fetches one credential, or None when absent.
    async fn read(&self, key: &ResourceKey) -> StoreResult<Option<Credential>>;

    /// Stores (or replaces) a credential. Used by seeding and tests.
    async fn put(&self, credential: Credential) -> StoreResult<()>;
}
