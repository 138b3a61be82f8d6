//! # confsync-core: Pure Data Model for confsync
//!
//! This crate is the data model of the configuration-sync controller. It
//! contains the declarative resource types and their validation rules as
//! pure code with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        confsync Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 confsync-controller (engine)                    │   │
//! │  │    reconciler ─► sync engine ─► client cache ─► listeners      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 confsync-store (accessors)                      │   │
//! │  │    ResourceStore ─ KvObjectStore ─ CredentialStore              │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ confsync-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐      ┌───────────┐      ┌───────────┐          │   │
//! │  │   │   types   │      │ validation│      │   error   │          │   │
//! │  │   │ ConfigSync│      │ spec rules│      │  domain   │          │   │
//! │  │   │ Status    │      │ addresses │      │  errors   │          │   │
//! │  │   └───────────┘      └───────────┘      └───────────┘          │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO STORE • NO NETWORK • PURE TYPES                  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Resource types (ConfigSync, spec, status, strategy)
//! - [`validation`] - Spec validation rules
//! - [`error`] - Domain error types
//!
//! ## Design Principles
//!
//! 1. **Pure**: every function is deterministic, no I/O anywhere
//! 2. **Serde everywhere**: all resource types round-trip through JSON,
//!    because that is how the declarative store persists them
//! 3. **Explicit errors**: malformed specs are typed errors, never panics

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use types::{
    AdditionalConfig, ConfigSync, ConfigSyncSpec, ConfigSyncStatus, EntrySyncStatus, ObjectRef,
    RemoteServerSpec, ResourceKey, ResourceMeta, ServerIdentity, SyncDirection, SyncPhase,
    SyncPolicy, SyncStrategy, CLEANUP_FINALIZER, DEFAULT_SERVER_PORT,
};
pub use validation::{parse_server_address, validate_spec};
