//! # Validation Module
//!
//! Spec validation for ConfigSync resources.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Admission (declarative store / schema)                       │
//! │  ├── Type validation (deserialization)                                 │
//! │  └── Out of scope for this crate                                       │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE (reconcile-time)                                 │
//! │  ├── entry keys present and non-blank                                  │
//! │  ├── endpoint / server address exclusivity                             │
//! │  └── group and auth reference shape                                    │
//! │                                                                         │
//! │  A spec that fails here reconciles to phase=failed with a long         │
//! │  requeue backoff: the condition cannot heal without a spec edit.       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::types::{ConfigSyncSpec, DEFAULT_SERVER_PORT};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Spec Validation
// =============================================================================

/// Validates a ConfigSync spec against the data-model rules.
///
/// ## Rules
/// - `entry_keys` must be non-empty, each key non-blank
/// - exactly one of `endpoint` / `server_address` must be set
/// - `server_address`, when set, must be `host` or `host:port`
/// - `group` must be non-empty
/// - `auth_ref`, when present, must carry a name
pub fn validate_spec(spec: &ConfigSyncSpec) -> ValidationResult<()> {
    validate_entry_keys(&spec.entry_keys)?;

    let remote = &spec.remote_server;
    let has_endpoint = remote.endpoint.as_deref().is_some_and(|e| !e.trim().is_empty());
    let has_address = remote
        .server_address
        .as_deref()
        .is_some_and(|a| !a.trim().is_empty());

    if has_endpoint == has_address {
        return Err(ValidationError::ExactlyOne {
            first: "endpoint".to_string(),
            second: "serverAddress".to_string(),
        });
    }

    if let Some(addr) = remote.server_address.as_deref() {
        if has_address {
            parse_server_address(addr)?;
        }
    }

    if remote.group.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "group".to_string(),
        });
    }

    if let Some(auth_ref) = &remote.auth_ref {
        if auth_ref.name.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "authRef.name".to_string(),
            });
        }
    }

    Ok(())
}

/// Validates the entry-key list: non-empty, no blank keys.
pub fn validate_entry_keys(entry_keys: &[String]) -> ValidationResult<()> {
    if entry_keys.is_empty() {
        return Err(ValidationError::Required {
            field: "entryKeys".to_string(),
        });
    }

    for key in entry_keys {
        if key.trim().is_empty() {
            return Err(ValidationError::InvalidFormat {
                field: "entryKeys".to_string(),
                reason: "entry keys must not be blank".to_string(),
            });
        }
    }

    Ok(())
}

// =============================================================================
// Server Address Parsing
// =============================================================================

/// Parses a `host` or `host:port` server address.
///
/// A bare host gets the default service port. A malformed port is a
/// validation error, not a fallback.
pub fn parse_server_address(address: &str) -> ValidationResult<(String, u16)> {
    let address = address.trim();

    if address.is_empty() {
        return Err(ValidationError::Required {
            field: "serverAddress".to_string(),
        });
    }

    match address.split_once(':') {
        None => Ok((address.to_string(), DEFAULT_SERVER_PORT)),
        Some((host, port)) => {
            if host.is_empty() {
                return Err(ValidationError::InvalidFormat {
                    field: "serverAddress".to_string(),
                    reason: format!("missing host in '{}'", address),
                });
            }
            let port: u16 = port.parse().map_err(|_| ValidationError::InvalidFormat {
                field: "serverAddress".to_string(),
                reason: format!("invalid port in '{}'", address),
            })?;
            Ok((host.to_string(), port))
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        ObjectRef, RemoteServerSpec, SyncDirection, SyncPolicy, SyncStrategy,
    };

    fn valid_spec() -> ConfigSyncSpec {
        ConfigSyncSpec {
            entry_keys: vec!["app.properties".to_string()],
            additional_config: None,
            strategy: SyncStrategy {
                sync_policy: SyncPolicy::always(),
                sync_deletion: true,
                sync_direction: SyncDirection::ClusterToServer,
            },
            remote_server: RemoteServerSpec {
                endpoint: Some("addr.example.com".to_string()),
                server_address: None,
                remote_namespace: "ns-1".to_string(),
                group: "DEFAULT_GROUP".to_string(),
                auth_ref: Some(ObjectRef::named("remote-credentials")),
            },
            local_object_ref: None,
        }
    }

    #[test]
    fn test_valid_spec_passes() {
        assert!(validate_spec(&valid_spec()).is_ok());
    }

    #[test]
    fn test_empty_entry_keys_rejected() {
        let mut spec = valid_spec();
        spec.entry_keys.clear();
        assert!(matches!(
            validate_spec(&spec),
            Err(ValidationError::Required { field }) if field == "entryKeys"
        ));
    }

    #[test]
    fn test_blank_entry_key_rejected() {
        let mut spec = valid_spec();
        spec.entry_keys.push("  ".to_string());
        assert!(matches!(
            validate_spec(&spec),
            Err(ValidationError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn test_endpoint_and_address_mutually_exclusive() {
        let mut spec = valid_spec();
        spec.remote_server.server_address = Some("10.0.0.1".to_string());
        assert!(matches!(
            validate_spec(&spec),
            Err(ValidationError::ExactlyOne { .. })
        ));

        let mut spec = valid_spec();
        spec.remote_server.endpoint = None;
        assert!(matches!(
            validate_spec(&spec),
            Err(ValidationError::ExactlyOne { .. })
        ));

        // An empty endpoint counts as absent
        let mut spec = valid_spec();
        spec.remote_server.endpoint = Some("".to_string());
        spec.remote_server.server_address = Some("10.0.0.1".to_string());
        assert!(validate_spec(&spec).is_ok());
    }

    #[test]
    fn test_empty_group_rejected() {
        let mut spec = valid_spec();
        spec.remote_server.group = " ".to_string();
        assert!(matches!(
            validate_spec(&spec),
            Err(ValidationError::Required { field }) if field == "group"
        ));
    }

    #[test]
    fn test_auth_ref_needs_a_name() {
        let mut spec = valid_spec();
        spec.remote_server.auth_ref = Some(ObjectRef::named(""));
        assert!(matches!(
            validate_spec(&spec),
            Err(ValidationError::Required { field }) if field == "authRef.name"
        ));
    }

    #[test]
    fn test_server_address_parsing() {
        assert_eq!(
            parse_server_address("10.0.0.1").unwrap(),
            ("10.0.0.1".to_string(), DEFAULT_SERVER_PORT)
        );
        assert_eq!(
            parse_server_address("conf.example.com:9090").unwrap(),
            ("conf.example.com".to_string(), 9090)
        );
        assert!(parse_server_address("10.0.0.1:http").is_err());
        assert!(parse_server_address(":8848").is_err());
        assert!(parse_server_address("").is_err());
    }

    #[test]
    fn test_malformed_address_rejected_in_spec() {
        let mut spec = valid_spec();
        spec.remote_server.endpoint = None;
        spec.remote_server.server_address = Some("10.0.0.1:notaport".to_string());
        assert!(matches!(
            validate_spec(&spec),
            Err(ValidationError::InvalidFormat { .. })
        ));
    }
}
