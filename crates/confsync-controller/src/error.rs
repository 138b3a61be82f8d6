//! # Sync Error Types
//!
//! Error taxonomy for reconcile and sync operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │     Spec        │  │     Auth        │  │       Remote            │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidSpec    │  │  MissingAuthRef │  │  RemoteUnavailable      │ │
//! │  │                 │  │  CredentialNot- │  │  Timeout                │ │
//! │  │                 │  │    Found        │  │                         │ │
//! │  │                 │  │  MalformedCred. │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │     Local       │  │    Aggregate    │  │      Internal           │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Conflict       │  │  EntrySync-     │  │  Serialization          │ │
//! │  │  Store(…)       │  │    Failed       │  │  Channel                │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Propagation Policy
//! Entry-level errors are aggregated into per-entry statuses and never abort
//! the remaining entries; resource-level errors (auth, spec, store) abort
//! the attempt. Nothing escalates past `phase = failed` plus a requeue — the
//! backoff class below tells the dispatcher how soon.

use thiserror::Error;

use confsync_core::{CoreError, ValidationError};
use confsync_store::StoreError;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering all reconcile failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Spec Errors
    // =========================================================================
    /// Malformed resource fields. Cannot self-heal without a spec edit, so
    /// the dispatcher requeues these with a long backoff.
    #[error("invalid spec: {0}")]
    InvalidSpec(String),

    /// Invalid controller configuration (operator-side, caught at startup).
    #[error("invalid controller configuration: {0}")]
    InvalidConfig(String),

    // =========================================================================
    // Auth Resolution Errors
    // =========================================================================
    /// The resource carries no credential reference.
    #[error("resource {resource} has no auth reference")]
    MissingAuthRef { resource: String },

    /// The referenced credential object does not exist.
    #[error("credential object not found: {key}")]
    CredentialNotFound { key: String },

    /// The credential object exists but required fields are absent or empty.
    #[error("credential {key} is malformed: {reason}")]
    MalformedCredential { key: String, reason: String },

    // =========================================================================
    // Remote Service Errors
    // =========================================================================
    /// The remote service could not be reached or rejected the call.
    #[error("remote service unavailable: {0}")]
    RemoteUnavailable(String),

    /// A remote call exceeded its deadline.
    #[error("timeout during {operation}")]
    Timeout { operation: String },

    // =========================================================================
    // Local Store Errors
    // =========================================================================
    /// Optimistic-concurrency retries exhausted on a local write.
    #[error("write conflict on {key} persisted after {attempts} attempts")]
    Conflict { key: String, attempts: u32 },

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    // =========================================================================
    // Aggregate Errors
    // =========================================================================
    /// One or more entries failed to converge; the rest were still
    /// attempted. Details live in the per-entry statuses.
    #[error("{failed} of {total} entries failed to sync")]
    EntrySyncFailed { failed: usize, total: usize },

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Failed to serialize or deserialize a payload.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Channel send/receive failed.
    #[error("channel error: {0}")]
    Channel(String),

    /// Internal controller error.
    #[error("internal error: {0}")]
    Internal(String),

    /// The controller is shutting down.
    #[error("controller is shutting down")]
    ShuttingDown,
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<CoreError> for SyncError {
    fn from(err: CoreError) -> Self {
        SyncError::InvalidSpec(err.to_string())
    }
}

impl From<ValidationError> for SyncError {
    fn from(err: ValidationError) -> Self {
        SyncError::InvalidSpec(err.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SyncError::Timeout {
                operation: err
                    .url()
                    .map(|u| u.path().to_string())
                    .unwrap_or_else(|| "remote request".to_string()),
            }
        } else {
            SyncError::RemoteUnavailable(err.to_string())
        }
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidSpec(format!("invalid server URL: {}", err))
    }
}

// =============================================================================
// Error Categorization (for requeue scheduling)
// =============================================================================

/// How soon a failed reconcile should be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffClass {
    /// Retry right away (local write races).
    Immediate,

    /// Retry with short exponential backoff (transient conditions).
    Short,

    /// Retry with a long fixed backoff (conditions that cannot self-heal,
    /// e.g. a malformed spec, where tight retry loops would only burn CPU).
    Long,
}

impl SyncError {
    /// Returns true if retrying can ever succeed without operator action.
    ///
    /// Even non-retryable errors are requeued (a spec edit or credential
    /// repair may land later); this flag only drives logging verbosity and
    /// the backoff class.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            SyncError::InvalidSpec(_) | SyncError::InvalidConfig(_) | SyncError::ShuttingDown
        )
    }

    /// Returns true for any of the distinguished auth-resolution failures.
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            SyncError::MissingAuthRef { .. }
                | SyncError::CredentialNotFound { .. }
                | SyncError::MalformedCredential { .. }
        )
    }

    /// Classifies this error for requeue scheduling.
    pub fn backoff_class(&self) -> BackoffClass {
        match self {
            // Local write races retry immediately; the conflicting writer
            // has already finished by the time we see the error.
            SyncError::Conflict { .. } => BackoffClass::Immediate,
            SyncError::Store(e) if e.is_conflict() => BackoffClass::Immediate,

            // An operator edit is required before these can succeed.
            SyncError::InvalidSpec(_) | SyncError::InvalidConfig(_) => BackoffClass::Long,

            // Everything else is transient (network, remote service, auth
            // objects that may appear later, partial entry failures).
            _ => BackoffClass::Short,
        }
    }
}
