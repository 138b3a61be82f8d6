//! # Resource Reconciler
//!
//! The per-resource state machine: loads the resource, runs cleanup or
//! convergence, and writes status.
//!
//! ## Reconcile Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Reconcile State Machine                           │
//! │                                                                         │
//! │  reconcile(key)                                                        │
//! │       │                                                                 │
//! │       ├── resource absent ──► cancel leftover listeners ──► Ok         │
//! │       │                                                                 │
//! │       ├── deletion pending ──► finalize:                               │
//! │       │      cancel listeners                                          │
//! │       │      syncDeletion? delete every remote entry                   │
//! │       │        (absent entry = success; any failure re-raises so       │
//! │       │         deletion is retried — removal NEVER precedes cleanup)  │
//! │       │      remove finalizer ──► store drops the object               │
//! │       │                                                                 │
//! │       └── active:                                                      │
//! │              validate spec ──────────┐ invalid                         │
//! │              ensure finalizer        │                                 │
//! │              resolve auth + client ──┤ failure                         │
//! │              run sync engine ────────┤                                 │
//! │              converge listeners ─────┤                                 │
//! │              write status            ▼                                 │
//! │              phase = succeed     phase = failed                        │
//! │              (no entry errors)   observed_generation still advances    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Safe to invoke repeatedly and concurrently for *different* keys; the
//! dispatch layer guarantees at most one in-flight reconcile per key. The
//! `phase` state machine is re-evaluated on every attempt, never sticky:
//! `pending → succeed|failed`, then `succeed|failed → succeed|failed`.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use confsync_core::{
    validate_spec, ConfigSync, ConfigSyncStatus, ObjectRef, ResourceKey, SyncPhase,
    CLEANUP_FINALIZER,
};
use confsync_store::{KvObjectStore, ResourceStore, StoreError};

use crate::cache::ClientCache;
use crate::config::ControllerConfig;
use crate::dispatch::Reconcile;
use crate::engine::{SyncEngine, SyncOutcome};
use crate::error::{SyncError, SyncResult};
use crate::listener::ListenerRegistry;

// =============================================================================
// Reconciler
// =============================================================================

/// Top-level reconciler for ConfigSync resources.
pub struct Reconciler {
    /// Resource accessor.
    resources: Arc<dyn ResourceStore>,

    /// Direction-aware convergence engine.
    engine: SyncEngine,

    /// Shared remote-client cache.
    cache: Arc<ClientCache>,

    /// Change-listener registry.
    listeners: Arc<ListenerRegistry>,

    /// Bound on conflict retries for resource metadata writes.
    conflict_retry_limit: u32,
}

impl Reconciler {
    /// Creates a reconciler over the given collaborators.
    pub fn new(
        resources: Arc<dyn ResourceStore>,
        objects: Arc<dyn KvObjectStore>,
        cache: Arc<ClientCache>,
        listeners: Arc<ListenerRegistry>,
        config: &ControllerConfig,
    ) -> Self {
        Reconciler {
            resources,
            engine: SyncEngine::new(objects, config.conflict_retry_limit),
            cache,
            listeners,
            conflict_retry_limit: config.conflict_retry_limit.max(1),
        }
    }

    /// Runs one reconcile attempt for the resource behind `key`.
    ///
    /// Idempotent: reconciling an already-converged resource performs no
    /// net-new writes beyond no-op upserts.
    pub async fn reconcile(&self, key: &ResourceKey) -> SyncResult<()> {
        let resource = match self.resources.get(key).await? {
            Some(resource) => resource,
            None => {
                // Gone with no deletion work pending. Listener bookkeeping
                // for the key may still exist if the object skipped the
                // finalizer path; clear it.
                self.listeners.cancel_all(key).await?;
                debug!(resource = %key, "Resource absent, nothing to do");
                return Ok(());
            }
        };

        if resource.is_deleting() {
            return self.finalize(resource).await;
        }
        self.reconcile_active(resource).await
    }

    // =========================================================================
    // Active Path
    // =========================================================================

    async fn reconcile_active(&self, resource: ConfigSync) -> SyncResult<()> {
        let key = resource.key();
        info!(
            resource = %key,
            generation = resource.meta.generation,
            direction = %resource.spec.strategy.sync_direction,
            policy = %resource.spec.strategy.sync_policy,
            "Reconciling resource"
        );

        if let Err(e) = validate_spec(&resource.spec) {
            let err = SyncError::from(e);
            self.record_failure(&resource, &err).await?;
            return Err(err);
        }

        let resource = self.ensure_finalizer(resource).await?;

        let port = match self.cache.obtain(&resource).await {
            Ok(port) => port,
            Err(e) => {
                self.record_failure(&resource, &e).await?;
                return Err(e);
            }
        };

        let outcome = match self.engine.run(port.as_ref(), &resource).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.record_failure(&resource, &e).await?;
                return Err(e);
            }
        };

        // Converge listener registrations: ServerToCluster wants one per
        // entry key; any other shape cancels what is stale.
        if let Err(e) = self.listeners.sync(&resource, &port).await {
            self.record_failure(&resource, &e).await?;
            return Err(e);
        }

        self.write_outcome_status(&resource, &outcome).await?;
        outcome.into_result()
    }

    /// Writes the post-engine status: per-entry statuses, phase, and the
    /// observed generation (which advances even on failure — an attempt
    /// completed).
    async fn write_outcome_status(
        &self,
        resource: &ConfigSync,
        outcome: &SyncOutcome,
    ) -> SyncResult<()> {
        let phase = if outcome.is_converged() {
            SyncPhase::Succeed
        } else {
            SyncPhase::Failed
        };

        let status = ConfigSyncStatus {
            phase,
            observed_generation: resource.meta.generation,
            local_object_ref: Some(self.acted_object_ref(resource)),
            sync_statuses: outcome.to_entry_statuses(),
        };

        info!(
            resource = %resource.key(),
            phase = %phase,
            observed_generation = status.observed_generation,
            failed_entries = outcome.failed(),
            "Writing status"
        );
        self.resources.update_status(&resource.key(), status).await?;
        Ok(())
    }

    /// Records a resource-level failure without touching prior per-entry
    /// statuses. Tolerates the resource disappearing underneath us.
    async fn record_failure(&self, resource: &ConfigSync, error: &SyncError) -> SyncResult<()> {
        warn!(resource = %resource.key(), error = %error, "Reconcile attempt failed");

        let mut status = resource.status.clone();
        status.phase = SyncPhase::Failed;
        status.observed_generation = resource.meta.generation;
        if status.local_object_ref.is_none() {
            status.local_object_ref = Some(self.acted_object_ref(resource));
        }

        match self.resources.update_status(&resource.key(), status).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn acted_object_ref(&self, resource: &ConfigSync) -> ObjectRef {
        let local = resource.local_object_key();
        ObjectRef {
            name: local.name,
            namespace: Some(local.namespace),
        }
    }

    // =========================================================================
    // Finalizer Management
    // =========================================================================

    /// Installs the cleanup finalizer on first contact, retrying through
    /// metadata write races.
    async fn ensure_finalizer(&self, resource: ConfigSync) -> SyncResult<ConfigSync> {
        if resource.meta.has_finalizer(CLEANUP_FINALIZER) {
            return Ok(resource);
        }

        let key = resource.key();
        let mut current = resource;
        for _ in 0..self.conflict_retry_limit {
            let mut updated = current.clone();
            updated.meta.finalizers.push(CLEANUP_FINALIZER.to_string());

            match self.resources.update(updated).await {
                Ok(stored) => {
                    debug!(resource = %key, "Installed cleanup finalizer");
                    return Ok(stored);
                }
                Err(e) if e.is_conflict() => {
                    current = self.resources.get(&key).await?.ok_or_else(|| {
                        SyncError::Store(StoreError::NotFound {
                            kind: "resource",
                            key: key.to_string(),
                        })
                    })?;
                    if current.meta.has_finalizer(CLEANUP_FINALIZER) {
                        return Ok(current);
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(SyncError::Conflict {
            key: key.to_string(),
            attempts: self.conflict_retry_limit,
        })
    }

    // =========================================================================
    // Deletion Path
    // =========================================================================

    /// Runs remote cleanup for a deleting resource and releases the
    /// finalizer once cleanup has fully succeeded.
    async fn finalize(&self, resource: ConfigSync) -> SyncResult<()> {
        let key = resource.key();

        if !resource.meta.has_finalizer(CLEANUP_FINALIZER) {
            // Someone else's finalizer is holding the object; no cleanup of
            // ours is pending.
            self.listeners.cancel_all(&key).await?;
            debug!(resource = %key, "Deleting resource carries no cleanup finalizer");
            return Ok(());
        }

        info!(
            resource = %key,
            sync_deletion = resource.spec.strategy.sync_deletion,
            "Finalizing resource"
        );

        // Stop push signals before tearing down remote state.
        self.listeners.cancel_all(&key).await?;

        if resource.spec.strategy.sync_deletion {
            let port = self.cache.obtain(&resource).await?;
            let group = &resource.spec.remote_server.group;
            for entry_key in &resource.spec.entry_keys {
                // Absent entries are success; any real failure re-raises so
                // the deletion is retried before the object can disappear.
                port.delete(group, entry_key).await?;
                debug!(resource = %key, group, entry_key, "Removed remote entry");
            }
        }

        self.remove_finalizer(resource).await
    }

    /// Drops the cleanup finalizer, letting the store remove the object.
    async fn remove_finalizer(&self, resource: ConfigSync) -> SyncResult<()> {
        let key = resource.key();
        let mut current = resource;

        for _ in 0..self.conflict_retry_limit {
            let mut updated = current.clone();
            updated.meta.finalizers.retain(|f| f != CLEANUP_FINALIZER);

            match self.resources.update(updated).await {
                Ok(_) => {
                    info!(resource = %key, "Cleanup complete, finalizer released");
                    return Ok(());
                }
                Err(e) if e.is_conflict() => match self.resources.get(&key).await? {
                    Some(fresh) => current = fresh,
                    None => return Ok(()),
                },
                Err(e) if e.is_not_found() => return Ok(()),
                Err(e) => return Err(e.into()),
            }
        }

        Err(SyncError::Conflict {
            key: key.to_string(),
            attempts: self.conflict_retry_limit,
        })
    }
}

// =============================================================================
// Dispatch Integration
// =============================================================================

#[async_trait]
impl Reconcile for Reconciler {
    async fn reconcile(&self, key: &ResourceKey) -> SyncResult<()> {
        Reconciler::reconcile(self, key).await
    }
}
