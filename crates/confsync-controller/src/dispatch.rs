//! # Dispatch Queue
//!
//! Delivers reconcile requests to a pool of workers while guaranteeing at
//! most one in-flight reconcile per resource key.
//!
//! ## Queue Semantics
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Dispatch Flow                                      │
//! │                                                                         │
//! │  enqueue(key) ──► bounded channel ──► dispatcher loop                  │
//! │                                          │                              │
//! │                     key in flight? ──────┤                              │
//! │                     yes: mark dirty      │ no: spawn worker             │
//! │                                          ▼                              │
//! │                              ┌─────────────────────┐                    │
//! │                              │  worker task        │                    │
//! │                              │  (semaphore-gated,  │                    │
//! │                              │   deadline-wrapped) │                    │
//! │                              └─────────┬───────────┘                    │
//! │                                        │ (key, result)                  │
//! │                                        ▼                                │
//! │                              completion handling                        │
//! │                              • dirty? requeue now                       │
//! │                              • Err? schedule requeue by backoff class   │
//! │                                 Immediate / Short (exponential) / Long  │
//! │                              • Ok? reset backoff state                  │
//! │                                                                         │
//! │  Callers (listener callbacks, store events) only ever enqueue; they    │
//! │  never run reconciliation inline.                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Exclusivity is per key: requests for a key that is already being
//! reconciled coalesce into a single dirty bit and re-run once the current
//! attempt finishes. Different keys proceed concurrently up to the worker
//! limit, with no ordering guarantee across keys.

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use async_trait::async_trait;
use confsync_core::ResourceKey;

use crate::config::ControllerConfig;
use crate::error::{BackoffClass, SyncError, SyncResult};

// =============================================================================
// Reconcile Capability
// =============================================================================

/// Capability the dispatcher drives: one idempotent reconcile attempt.
#[async_trait]
pub trait Reconcile: Send + Sync + 'static {
    /// Runs one reconcile attempt for the resource behind `key`.
    async fn reconcile(&self, key: &ResourceKey) -> SyncResult<()>;
}

// =============================================================================
// Queue Handle
// =============================================================================

/// Cheap, cloneable handle for enqueueing reconcile requests.
///
/// `enqueue` is synchronous by design so change-listener callbacks can call
/// it without blocking; a full queue drops the request with a warning (the
/// per-key dirty bit and requeue-on-failure paths make delivery effectively
/// level-triggered, so a dropped edge is recovered by the next signal).
#[derive(Clone)]
pub struct QueueHandle {
    tx: mpsc::Sender<ResourceKey>,
}

impl QueueHandle {
    /// Enqueues a reconcile request for `key`.
    pub fn enqueue(&self, key: ResourceKey) {
        if let Err(e) = self.tx.try_send(key) {
            warn!(error = %e, "Reconcile queue full, dropping request");
        }
    }
}

#[cfg(test)]
impl QueueHandle {
    /// Builds a handle over a raw channel for unit tests that drain the
    /// receiving side themselves.
    pub(crate) fn for_tests(tx: mpsc::Sender<ResourceKey>) -> Self {
        QueueHandle { tx }
    }
}

/// Receiving side of the reconcile queue, consumed by [`Dispatcher::spawn`].
///
/// Created separately from the dispatcher so the [`QueueHandle`] can be
/// wired into listener registries and stores before the worker loop starts.
pub struct ReconcileQueue {
    rx: mpsc::Receiver<ResourceKey>,
}

// =============================================================================
// Dispatcher
// =============================================================================

type Completion = (ResourceKey, SyncResult<()>);

/// Handle for controlling a running dispatcher.
pub struct DispatcherHandle {
    queue: QueueHandle,
    shutdown_tx: mpsc::Sender<()>,
}

impl DispatcherHandle {
    /// Returns the enqueue handle.
    pub fn queue(&self) -> QueueHandle {
        self.queue.clone()
    }

    /// Enqueues a reconcile request.
    pub fn enqueue(&self, key: ResourceKey) {
        self.queue.enqueue(key);
    }

    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

/// Work-dispatch layer feeding reconcile workers.
pub struct Dispatcher;

impl Dispatcher {
    /// Creates the reconcile queue pair.
    pub fn queue(config: &ControllerConfig) -> (QueueHandle, ReconcileQueue) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        (QueueHandle { tx }, ReconcileQueue { rx })
    }

    /// Spawns the dispatcher loop over an existing queue pair and returns
    /// its handle.
    pub fn spawn(
        reconciler: Arc<dyn Reconcile>,
        config: &ControllerConfig,
        queue: ReconcileQueue,
        handle: QueueHandle,
    ) -> DispatcherHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        tokio::spawn(Self::run(
            reconciler,
            config.clone(),
            queue.rx,
            handle.clone(),
            shutdown_rx,
        ));

        DispatcherHandle {
            queue: handle,
            shutdown_tx,
        }
    }

    async fn run(
        reconciler: Arc<dyn Reconcile>,
        config: ControllerConfig,
        mut rx: mpsc::Receiver<ResourceKey>,
        queue: QueueHandle,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        info!(workers = config.workers, "Dispatcher starting");

        let semaphore = Arc::new(Semaphore::new(config.workers));
        let (done_tx, mut done_rx) = mpsc::channel::<Completion>(config.queue_capacity.max(1));

        let mut in_flight: HashSet<ResourceKey> = HashSet::new();
        let mut dirty: HashSet<ResourceKey> = HashSet::new();
        let mut backoffs: HashMap<ResourceKey, ExponentialBackoff> = HashMap::new();

        loop {
            tokio::select! {
                Some(key) = rx.recv() => {
                    if in_flight.contains(&key) {
                        // Coalesce: re-run once the current attempt is done.
                        dirty.insert(key);
                    } else {
                        in_flight.insert(key.clone());
                        Self::spawn_worker(
                            reconciler.clone(),
                            semaphore.clone(),
                            done_tx.clone(),
                            key,
                            config.attempt_timeout(),
                        );
                    }
                }

                Some((key, result)) = done_rx.recv() => {
                    in_flight.remove(&key);

                    match result {
                        Ok(()) => {
                            debug!(key = %key, "Reconcile succeeded");
                            backoffs.remove(&key);
                        }
                        Err(e) => {
                            let delay = Self::requeue_delay(&config, &mut backoffs, &key, &e);
                            if e.is_retryable() {
                                warn!(key = %key, error = %e, delay_ms = delay.as_millis() as u64, "Reconcile failed, requeueing");
                            } else {
                                error!(key = %key, error = %e, delay_ms = delay.as_millis() as u64, "Reconcile failed (needs spec edit), requeueing");
                            }
                            Self::schedule_requeue(queue.clone(), key.clone(), delay);
                        }
                    }

                    // A request arrived while this key was in flight.
                    if dirty.remove(&key) {
                        in_flight.insert(key.clone());
                        Self::spawn_worker(
                            reconciler.clone(),
                            semaphore.clone(),
                            done_tx.clone(),
                            key,
                            config.attempt_timeout(),
                        );
                    }
                }

                _ = shutdown_rx.recv() => {
                    info!("Dispatcher received shutdown");
                    break;
                }
            }
        }

        info!("Dispatcher stopped");
    }

    /// Spawns one deadline-wrapped reconcile attempt.
    fn spawn_worker(
        reconciler: Arc<dyn Reconcile>,
        semaphore: Arc<Semaphore>,
        done_tx: mpsc::Sender<Completion>,
        key: ResourceKey,
        deadline: Duration,
    ) {
        tokio::spawn(async move {
            // Closed semaphore means shutdown; just drop the request.
            let _permit = match semaphore.acquire_owned().await {
                Ok(p) => p,
                Err(_) => return,
            };

            let result = match timeout(deadline, reconciler.reconcile(&key)).await {
                Ok(result) => result,
                // Dropping the reconcile future aborts its outstanding
                // remote calls; the attempt is reported as timed out.
                Err(_) => Err(SyncError::Timeout {
                    operation: format!("reconcile {}", key),
                }),
            };

            let _ = done_tx.send((key, result)).await;
        });
    }

    /// Picks the requeue delay for a failed attempt.
    fn requeue_delay(
        config: &ControllerConfig,
        backoffs: &mut HashMap<ResourceKey, ExponentialBackoff>,
        key: &ResourceKey,
        error: &SyncError,
    ) -> Duration {
        match error.backoff_class() {
            BackoffClass::Immediate => Duration::ZERO,
            BackoffClass::Long => config.invalid_spec_backoff(),
            BackoffClass::Short => {
                let backoff = backoffs
                    .entry(key.clone())
                    .or_insert_with(|| config.requeue_backoff());
                backoff.next_backoff().unwrap_or_else(|| config.max_backoff())
            }
        }
    }

    /// Schedules a delayed requeue without blocking the dispatcher loop.
    fn schedule_requeue(queue: QueueHandle, key: ResourceKey, delay: Duration) {
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            queue.enqueue(key);
        });
    }
}

// =============================================================================
// Tests
// =============================================================================
