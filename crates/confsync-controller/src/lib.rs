//! # confsync-controller: Reconciliation and Sync Engine
//!
//! This crate keeps key/value configuration entries mirrored between the
//! cluster's declarative object store and a centralized configuration
//! service, driven by `ConfigSync` resource records.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Controller Architecture                             │
//! │                                                                         │
//! │  events (resource change, local-object change, remote push)           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌────────────────┐    at most one in-flight reconcile per key         │
//! │  │  Dispatcher    │───────────────────────────────┐                    │
//! │  │  (queue +      │                               ▼                    │
//! │  │   workers)     │                  ┌──────────────────────────┐      │
//! │  └────────────────┘                  │       Reconciler         │      │
//! │       ▲    ▲                         │                          │      │
//! │       │    │ requeue w/ backoff      │  load → finalize/active  │      │
//! │       │    └─────────────────────────│  validate → auth → sync  │      │
//! │       │                              │  → listeners → status    │      │
//! │       │                              └──────────┬───────────────┘      │
//! │       │                                         │                      │
//! │  ┌────┴───────────┐   ┌────────────────┐   ┌────▼───────────────────┐  │
//! │  │ ListenerRegistry│  │  ClientCache   │   │      SyncEngine        │  │
//! │  │                 │  │                │   │                        │  │
//! │  │ remote push ──► │  │ one shared     │   │ ClusterToServer:       │  │
//! │  │ enqueue         │  │ client per     │   │   publish/delete       │  │
//! │  │ reconcile       │  │ server         │   │ ServerToCluster:       │  │
//! │  │                 │  │ identity       │   │   upsert/remove local  │  │
//! │  └─────────────────┘  └───────┬────────┘   └────────────────────────┘  │
//! │                               │                                        │
//! │                      ┌────────▼────────┐                               │
//! │                      │  AuthResolver   │  credential objects → keys    │
//! │                      └─────────────────┘                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! ### Core Modules
//! - [`reconciler`] - Per-resource state machine (load, finalize, status)
//! - [`engine`] - Direction-aware diff/apply over local and remote entries
//! - [`cache`] - Shared remote-client cache keyed by server identity
//! - [`auth`] - Credential resolution (`AuthResolver` + variants)
//! - [`listener`] - Change-listener registry (remote push → enqueue)
//! - [`dispatch`] - Work queue with per-key exclusivity and backoff requeue
//!
//! ### Remote Port
//! - [`remote`] - `RemoteConfigPort` capability + in-memory variant
//! - [`http`] - Networked variant over the service's HTTP API
//!
//! ### Supporting Modules
//! - [`controller`] - Assembly: builder wiring everything together
//! - [`config`] - Operational knobs (TOML + env)
//! - [`error`] - Error taxonomy with retry/backoff classification
//!
//! ## Usage
//! ```rust,ignore
//! use confsync_controller::Controller;
//! use confsync_store::MemoryStore;
//!
//! let store = Arc::new(MemoryStore::new());
//! let controller = Controller::builder()
//!     .with_store(store.clone())
//!     .start()?;
//!
//! // Deliver events as they happen:
//! controller.enqueue(ResourceKey::new("prod", "app-conf"));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod auth;
pub mod cache;
pub mod config;
pub mod controller;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod http;
pub mod listener;
pub mod reconciler;
pub mod remote;

// =============================================================================
// Re-exports
// =============================================================================

// Core types
pub use config::ControllerConfig;
pub use controller::{Controller, ControllerBuilder};
pub use error::{BackoffClass, SyncError, SyncResult};
pub use reconciler::Reconciler;

// Engine types
pub use engine::{EntryOutcome, SyncEngine, SyncOutcome};

// Remote port
pub use http::{http_client_factory, HttpConfigClient};
pub use remote::{
    ChangeHandler, ConfigChange, MemoryConfigServer, OpCounts, RemoteConfigPort, SubscriptionId,
};

// Collaborators
pub use auth::{AuthInfo, AuthResolver, SecretAuthResolver, StaticAuthResolver};
pub use cache::{ClientCache, ClientFactory};
pub use dispatch::{Dispatcher, DispatcherHandle, QueueHandle, Reconcile, ReconcileQueue};
pub use listener::{ListenerRegistry, ListenerTarget};
