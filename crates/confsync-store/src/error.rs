//! # Store Error Types
//!
//! Error types for declarative-store operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  Store backend (in-memory map / cluster API)                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  StoreError (this module) ← Adds object kind and key context           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SyncError (controller) ← Classified for retry/backoff                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Status.phase + requeue                                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Declarative-store operation errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Object not found in the store.
    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    /// Optimistic-concurrency conflict: the object changed since it was read.
    ///
    /// ## When This Occurs
    /// - A write carries a stale `resource_version`
    /// - Callers are expected to reload, reapply, and retry a bounded
    ///   number of times
    #[error("conflict writing {key}: version {submitted} is stale (current {current})")]
    Conflict {
        key: String,
        submitted: i64,
        current: i64,
    },

    /// Create collided with an existing object.
    #[error("{kind} already exists: {key}")]
    AlreadyExists { kind: &'static str, key: String },

    /// The submitted object is not writable as-is.
    #[error("invalid {kind} write for {key}: {reason}")]
    InvalidWrite {
        kind: &'static str,
        key: String,
        reason: String,
    },
}

impl StoreError {
    /// Returns true for version conflicts, which callers retry immediately.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    /// Returns true when the target object does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}
