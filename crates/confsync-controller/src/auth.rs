//! # Credential Resolution
//!
//! Turns a resource's auth reference into resolved access credentials plus
//! the connection target the client cache needs.
//!
//! ## Resolution Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Credential Resolution Flow                           │
//! │                                                                         │
//! │  ┌────────────────┐     ┌─────────────────┐     ┌─────────────────┐    │
//! │  │  Reconciler /  │     │  AuthResolver   │     │ CredentialStore │    │
//! │  │  ClientCache   │     │  (this module)  │     │ (declarative)   │    │
//! │  └───────┬────────┘     └────────┬────────┘     └────────┬────────┘    │
//! │          │                       │                       │             │
//! │          │  resolve(resource)    │                       │             │
//! │          │──────────────────────►│                       │             │
//! │          │                       │  read(auth_ref in     │             │
//! │          │                       │   resource namespace) │             │
//! │          │                       │──────────────────────►│             │
//! │          │                       │◄──────────────────────│             │
//! │          │                       │  { ak, sk }           │             │
//! │          │  AuthInfo             │                       │             │
//! │          │◄──────────────────────│                       │             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The resolver is a capability trait so alternative credential sources
//! (workload identity, static test credentials) substitute without touching
//! the reconciler.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use confsync_core::ConfigSync;
use confsync_store::CredentialStore;

use crate::error::{SyncError, SyncResult};

/// Credential field carrying the access key.
const FIELD_ACCESS_KEY: &str = "ak";

/// Credential field carrying the secret key.
const FIELD_SECRET_KEY: &str = "sk";

// =============================================================================
// Auth Info
// =============================================================================

/// Resolved credentials plus connection target for one resource.
#[derive(Debug, Clone)]
pub struct AuthInfo {
    /// Access key identifying the caller.
    pub access_key: String,

    /// Secret key authenticating the caller.
    pub secret_key: String,

    /// Addressing-service endpoint from the spec, if any.
    pub endpoint: Option<String>,

    /// Direct server address from the spec, if any.
    pub server_address: Option<String>,

    /// Remote namespace from the spec.
    pub namespace: String,
}

// =============================================================================
// Resolver Trait
// =============================================================================

/// Capability: resolve credentials for a resource.
#[async_trait]
pub trait AuthResolver: Send + Sync {
    /// Resolves the credentials and connection target for `resource`.
    ///
    /// Fails with a distinguished error when the auth reference is missing,
    /// the referenced object does not exist, or required fields are absent.
    async fn resolve(&self, resource: &ConfigSync) -> SyncResult<AuthInfo>;
}

// =============================================================================
// Credential-Object Resolver
// =============================================================================

/// Default resolver: reads the credential object named by
/// `spec.remote_server.auth_ref` in the resource's own namespace and
/// extracts `ak` / `sk` key material.
pub struct SecretAuthResolver {
    credentials: Arc<dyn CredentialStore>,
}

impl SecretAuthResolver {
    /// Creates a resolver over the given credential store.
    pub fn new(credentials: Arc<dyn CredentialStore>) -> Self {
        SecretAuthResolver { credentials }
    }
}

#[async_trait]
impl AuthResolver for SecretAuthResolver {
    async fn resolve(&self, resource: &ConfigSync) -> SyncResult<AuthInfo> {
        let remote = &resource.spec.remote_server;

        let auth_ref = remote.auth_ref.as_ref().ok_or_else(|| SyncError::MissingAuthRef {
            resource: resource.key().to_string(),
        })?;

        let credential_key = auth_ref.resolve(&resource.meta.namespace);
        let credential = self
            .credentials
            .read(&credential_key)
            .await?
            .ok_or_else(|| SyncError::CredentialNotFound {
                key: credential_key.to_string(),
            })?;

        let access_key = credential
            .field(FIELD_ACCESS_KEY)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| SyncError::MalformedCredential {
                key: credential_key.to_string(),
                reason: format!("missing field '{}'", FIELD_ACCESS_KEY),
            })?;
        let secret_key = credential
            .field(FIELD_SECRET_KEY)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| SyncError::MalformedCredential {
                key: credential_key.to_string(),
                reason: format!("missing field '{}'", FIELD_SECRET_KEY),
            })?;

        debug!(
            resource = %resource.key(),
            credential = %credential_key,
            "Resolved credentials"
        );

        Ok(AuthInfo {
            access_key: access_key.to_string(),
            secret_key: secret_key.to_string(),
            endpoint: remote.endpoint.clone(),
            server_address: remote.server_address.clone(),
            namespace: remote.remote_namespace.clone(),
        })
    }
}

// =============================================================================
// Static Resolver
// =============================================================================

/// Resolver returning fixed key material regardless of the resource.
///
/// Stands in for ambient-identity credential sources and keeps tests free
/// of credential-object plumbing. The connection target still comes from
/// the resource's spec.
pub struct StaticAuthResolver {
    access_key: String,
    secret_key: String,
}

impl StaticAuthResolver {
    /// Creates a resolver with fixed keys.
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        StaticAuthResolver {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }
}

#[async_trait]
impl AuthResolver for StaticAuthResolver {
    async fn resolve(&self, resource: &ConfigSync) -> SyncResult<AuthInfo> {
        let remote = &resource.spec.remote_server;
        Ok(AuthInfo {
            access_key: self.access_key.clone(),
            secret_key: self.secret_key.clone(),
            endpoint: remote.endpoint.clone(),
            server_address: remote.server_address.clone(),
            namespace: remote.remote_namespace.clone(),
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
