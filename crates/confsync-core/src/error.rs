//! # Error Types
//!
//! Domain-specific error types for confsync-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  confsync-core errors (this file)                                      │
//! │  ├── CoreError        - General domain errors                          │
//! │  └── ValidationError  - Spec validation failures                       │
//! │                                                                         │
//! │  confsync-store errors (separate crate)                                │
//! │  └── StoreError       - Declarative-store operation failures           │
//! │                                                                         │
//! │  confsync-controller errors (separate crate)                           │
//! │  └── SyncError        - Reconcile/sync failures, classified for retry  │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → SyncError → Status.phase          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (field, key, namespace)
//! 3. Errors are enum variants, never String
//! 4. A malformed spec is data, not a panic

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core domain errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The spec names no remote server at all.
    ///
    /// ## When This Occurs
    /// - Both `endpoint` and `server_address` are absent or empty, so no
    ///   client-cache identity can be derived
    #[error("remote server spec names neither an endpoint nor a server address")]
    MissingServer,

    /// Sync direction string could not be parsed.
    #[error("unknown sync direction: '{0}'. Valid options: cluster2server, server2cluster")]
    UnknownDirection(String),

    /// Spec validation failed (wraps ValidationError).
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Spec validation errors.
///
/// These occur when a stored resource does not meet the data-model rules.
/// The controller maps them to an invalid-spec reconcile failure; they
/// cannot self-heal without a spec edit.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Exactly one of two mutually exclusive fields must be set.
    #[error("exactly one of {first} and {second} must be set")]
    ExactlyOne { first: String, second: String },

    /// Invalid format (e.g., malformed server address or port).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ValidationError::ExactlyOne {
            first: "endpoint".to_string(),
            second: "serverAddress".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "exactly one of endpoint and serverAddress must be set"
        );

        let err = ValidationError::Required {
            field: "entryKeys".to_string(),
        };
        assert_eq!(err.to_string(), "entryKeys is required");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "group".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
