//! # confsync-store: Cluster-Facing Accessor Layer
//!
//! This crate defines how the controller reaches the declarative object
//! store: three accessor traits (sync resources, local key/value objects,
//! credentials) and one in-memory implementation that enforces the same
//! optimistic-concurrency and finalizer semantics as the real store.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     confsync Storage Layer                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                confsync-store (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │  ┌──────────────┐  ┌───────────────┐  ┌─────────────────────┐  │   │
//! │  │  │ ResourceStore│  │ KvObjectStore │  │  CredentialStore    │  │   │
//! │  │  │ (traits.rs)  │  │ (traits.rs)   │  │  (traits.rs)        │  │   │
//! │  │  │              │  │               │  │                     │  │   │
//! │  │  │ finalizer-   │  │ version-gated │  │  key material       │  │   │
//! │  │  │ gated delete │  │ writes        │  │  lookup             │  │   │
//! │  │  └──────┬───────┘  └──────┬────────┘  └─────────┬───────────┘  │   │
//! │  │         └─────────────────┼─────────────────────┘              │   │
//! │  │                           ▼                                    │   │
//! │  │                 ┌───────────────────┐                          │   │
//! │  │                 │   MemoryStore     │  one instance implements │   │
//! │  │                 │   (memory.rs)     │  all three traits        │   │
//! │  │                 └───────────────────┘                          │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  DEPENDENCIES:                                                         │
//! │  • confsync-core: resource types (ConfigSync, ResourceKey, Status)     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A cluster-API-backed implementation slots in behind the same traits; the
//! controller and its tests are written against `Arc<dyn …>` only.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod memory;
pub mod object;
pub mod traits;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use object::{Credential, KvObject};
pub use traits::{CredentialStore, KvObjectStore, ResourceStore};
