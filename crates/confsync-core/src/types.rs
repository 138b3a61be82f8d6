//! # Resource Types
//!
//! The declarative data model for configuration synchronization.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         ConfigSync Resource                             │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌──────────────────┐   ┌─────────────────────┐  │
//! │  │  ResourceMeta   │   │  ConfigSyncSpec  │   │  ConfigSyncStatus   │  │
//! │  │  ─────────────  │   │  ──────────────  │   │  ─────────────────  │  │
//! │  │  name/namespace │   │  entry_keys      │   │  phase              │  │
//! │  │  generation     │   │  strategy        │   │  observed_generation│  │
//! │  │  deletion mark  │   │  remote_server   │   │  sync_statuses      │  │
//! │  │  finalizers     │   │  local_object_ref│   │  local_object_ref   │  │
//! │  └─────────────────┘   └──────────────────┘   └─────────────────────┘  │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌──────────────────┐   ┌─────────────────────┐  │
//! │  │  SyncDirection  │   │    SyncPhase     │   │   ServerIdentity    │  │
//! │  │  ─────────────  │   │  ──────────────  │   │  ─────────────────  │  │
//! │  │  ClusterToServer│   │  Pending         │   │  server (endpoint   │  │
//! │  │  ServerToCluster│   │  Succeed         │   │   or address)       │  │
//! │  └─────────────────┘   │  Failed          │   │  remote namespace   │  │
//! │                        └──────────────────┘   └─────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Ownership Rules
//! - The spec is written by users; the controller never mutates it.
//! - The status is written only by the reconciler.
//! - `meta.finalizers` is the one metadata field the controller edits: it
//!   adds its cleanup finalizer on first reconcile and removes it once
//!   remote cleanup has finished.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::CoreError;

/// Finalizer the controller installs on every resource it manages.
///
/// While present, the declarative store keeps a deleted resource visible
/// (with `deletion_timestamp` set) so remote cleanup can run first.
pub const CLEANUP_FINALIZER: &str = "confsync.io/cleanup";

/// Default port assumed when `server_address` carries no explicit port.
pub const DEFAULT_SERVER_PORT: u16 = 8848;

// =============================================================================
// Resource Identity
// =============================================================================

/// Namespaced key identifying one resource in the declarative store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    /// Namespace the resource lives in.
    pub namespace: String,

    /// Resource name, unique within the namespace.
    pub name: String,
}

impl ResourceKey {
    /// Creates a key from namespace and name.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        ResourceKey {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Reference to another object in the declarative store.
///
/// The namespace is optional; an absent namespace means "same namespace as
/// the referring resource".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    /// Name of the referenced object.
    pub name: String,

    /// Namespace of the referenced object, if different from the referrer's.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl ObjectRef {
    /// Creates a reference by name, inheriting the referrer's namespace.
    pub fn named(name: impl Into<String>) -> Self {
        ObjectRef {
            name: name.into(),
            namespace: None,
        }
    }

    /// Resolves this reference against the referring resource's namespace.
    pub fn resolve(&self, default_namespace: &str) -> ResourceKey {
        ResourceKey {
            namespace: self
                .namespace
                .clone()
                .unwrap_or_else(|| default_namespace.to_string()),
            name: self.name.clone(),
        }
    }
}

// =============================================================================
// Resource Metadata
// =============================================================================

/// Metadata carried by every stored resource.
///
/// `generation` increments on every spec change; `resource_version` on every
/// write of any kind. The controller compares `status.observed_generation`
/// against `generation` to detect staleness.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceMeta {
    /// Resource name.
    pub name: String,

    /// Namespace the resource lives in.
    pub namespace: String,

    /// Store-assigned unique identifier.
    #[serde(default)]
    pub uid: String,

    /// Spec generation, incremented by the store on spec changes.
    #[serde(default)]
    pub generation: i64,

    /// Write version used for optimistic concurrency.
    #[serde(default)]
    pub resource_version: i64,

    /// Set when deletion has been requested; the resource stays visible
    /// until all finalizers are removed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,

    /// Finalizers gating actual removal.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub finalizers: Vec<String>,
}

impl ResourceMeta {
    /// Returns the namespaced key for this resource.
    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(self.namespace.clone(), self.name.clone())
    }

    /// Returns true if deletion has been requested.
    pub fn is_deleting(&self) -> bool {
        self.deletion_timestamp.is_some()
    }

    /// Returns true if the given finalizer is present.
    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers.iter().any(|f| f == finalizer)
    }
}

// =============================================================================
// Sync Strategy
// =============================================================================

/// Which side is the source of truth for this resource.
///
/// The direction is treated as immutable for the resource's lifetime:
/// flipping it on a live resource is undefined behavior. The controller
/// converges listener registrations after a flip, but makes no promises
/// about entries synced under the previous direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncDirection {
    /// The local object is the source of truth; entries are published to
    /// the remote service.
    ClusterToServer,

    /// The remote service is the source of truth; entries are pulled into
    /// the local object.
    ServerToCluster,
}

impl std::fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncDirection::ClusterToServer => write!(f, "cluster2server"),
            SyncDirection::ServerToCluster => write!(f, "server2cluster"),
        }
    }
}

impl std::str::FromStr for SyncDirection {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cluster2server" | "clustertoserver" => Ok(SyncDirection::ClusterToServer),
            "server2cluster" | "servertocluster" => Ok(SyncDirection::ServerToCluster),
            other => Err(CoreError::UnknownDirection(other.to_string())),
        }
    }
}

/// Sync policy, kept as an open enumeration.
///
/// The only value acted on today is `Always`; unknown values are preserved
/// verbatim so future conditional policies round-trip through the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncPolicy(String);

impl SyncPolicy {
    /// The always-run-sync policy.
    pub fn always() -> Self {
        SyncPolicy("Always".to_string())
    }

    /// Creates a policy from an arbitrary value.
    pub fn new(value: impl Into<String>) -> Self {
        SyncPolicy(value.into())
    }

    /// Returns true for the always-run-sync policy.
    pub fn is_always(&self) -> bool {
        self.0 == "Always"
    }

    /// The raw policy value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SyncPolicy {
    fn default() -> Self {
        SyncPolicy::always()
    }
}

impl std::fmt::Display for SyncPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a resource's entries are synchronized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncStrategy {
    /// Policy controlling when sync runs.
    #[serde(default)]
    pub sync_policy: SyncPolicy,

    /// Whether absence on the source side propagates as deletion on the
    /// target side.
    #[serde(default)]
    pub sync_deletion: bool,

    /// Which side is the source of truth.
    pub sync_direction: SyncDirection,
}

// =============================================================================
// Remote Server
// =============================================================================

/// Identity of one remote configuration service, used as the client-cache
/// key: two resources with the same identity share one client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerIdentity {
    /// Endpoint or server address, whichever the spec carries.
    pub server: String,

    /// Remote namespace within the service.
    pub namespace: String,
}

impl std::fmt::Display for ServerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.server, self.namespace)
    }
}

/// Where and how to reach the remote configuration service.
///
/// Exactly one of `endpoint` (an addressing-service URL) and
/// `server_address` (a direct `host[:port]` address) must be set; validation
/// rejects specs carrying both or neither.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteServerSpec {
    /// Addressing-service endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Direct server address as `host` or `host:port`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_address: Option<String>,

    /// Namespace within the remote service. Empty means the service's
    /// public namespace.
    #[serde(default)]
    pub remote_namespace: String,

    /// Group the resource's entries are published under.
    pub group: String,

    /// Reference to the credential object holding access/secret keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_ref: Option<ObjectRef>,
}

impl RemoteServerSpec {
    /// Derives the cache identity for this server, or an error when the
    /// spec names no server at all.
    pub fn identity(&self) -> Result<ServerIdentity, CoreError> {
        let server = self
            .endpoint
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(self.server_address.as_deref().filter(|s| !s.is_empty()))
            .ok_or(CoreError::MissingServer)?;

        Ok(ServerIdentity {
            server: server.to_string(),
            namespace: self.remote_namespace.clone(),
        })
    }
}

// =============================================================================
// Additional Config
// =============================================================================

/// Supplementary metadata attached to remote entries on publish.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdditionalConfig {
    /// Labels attached to created remote entries.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// Free-form properties attached to created remote entries.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,

    /// Tags attached to created remote entries.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

impl AdditionalConfig {
    /// Returns true when no metadata is carried at all.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty() && self.properties.is_empty() && self.tags.is_empty()
    }
}

// =============================================================================
// Spec
// =============================================================================

/// Desired state: which entries to sync, in which direction, against which
/// server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSyncSpec {
    /// Entry keys to synchronize. Must be non-empty.
    pub entry_keys: Vec<String>,

    /// Supplementary metadata applied when creating remote entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_config: Option<AdditionalConfig>,

    /// Sync strategy (policy, deletion propagation, direction).
    pub strategy: SyncStrategy,

    /// Remote service identity and credentials.
    pub remote_server: RemoteServerSpec,

    /// Local key/value object to sync against. Absent means a default-named
    /// object (same name and namespace as the resource).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_object_ref: Option<ObjectRef>,
}

// =============================================================================
// Status
// =============================================================================

/// Reconcile outcome for the resource as a whole.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    /// No reconcile attempt has completed yet.
    #[default]
    Pending,

    /// The most recent attempt converged every entry.
    Succeed,

    /// The most recent attempt raised at least one error.
    Failed,
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncPhase::Pending => write!(f, "pending"),
            SyncPhase::Succeed => write!(f, "succeed"),
            SyncPhase::Failed => write!(f, "failed"),
        }
    }
}

/// Per-entry sync outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntrySyncStatus {
    /// The entry key this status describes.
    pub entry_key: String,

    /// When the last sync attempt for this entry finished.
    pub last_sync_time: DateTime<Utc>,

    /// Whether the last attempt converged this entry.
    pub ready: bool,

    /// Error detail when `ready` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Observed state, written only by the reconciler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigSyncStatus {
    /// Outcome of the most recent reconcile attempt.
    #[serde(default)]
    pub phase: SyncPhase,

    /// Last generation for which a reconcile attempt completed, success or
    /// failure. Always `<= meta.generation`.
    #[serde(default)]
    pub observed_generation: i64,

    /// The local object the reconciler actually acted upon.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_object_ref: Option<ObjectRef>,

    /// One entry per `spec.entry_keys` item after a successful reconcile.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sync_statuses: Vec<EntrySyncStatus>,
}

// =============================================================================
// Resource
// =============================================================================

/// The declarative record driving synchronization of one entry set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSync {
    /// Store metadata.
    pub meta: ResourceMeta,

    /// Desired state.
    pub spec: ConfigSyncSpec,

    /// Observed state, owned by the reconciler.
    #[serde(default)]
    pub status: ConfigSyncStatus,
}

impl ConfigSync {
    /// Returns the namespaced key of this resource.
    pub fn key(&self) -> ResourceKey {
        self.meta.key()
    }

    /// Returns true if deletion has been requested.
    pub fn is_deleting(&self) -> bool {
        self.meta.is_deleting()
    }

    /// Resolves the local object this resource syncs against.
    ///
    /// Falls back to a default-named object (same name and namespace as the
    /// resource) when the spec carries no explicit reference.
    pub fn local_object_key(&self) -> ResourceKey {
        match &self.spec.local_object_ref {
            Some(r) => r.resolve(&self.meta.namespace),
            None => self.key(),
        }
    }

    /// Returns true when the local object is the implied default-named one,
    /// i.e. it exists solely for this resource.
    pub fn uses_default_local_object(&self) -> bool {
        self.spec.local_object_ref.is_none()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn spec_with(endpoint: Option<&str>, addr: Option<&str>) -> RemoteServerSpec {
        RemoteServerSpec {
            endpoint: endpoint.map(String::from),
            server_address: addr.map(String::from),
            remote_namespace: "ns-1".to_string(),
            group: "g".to_string(),
            auth_ref: None,
        }
    }

    #[test]
    fn test_identity_prefers_endpoint() {
        let spec = spec_with(Some("addr.example.com"), Some("10.0.0.1:8848"));
        let id = spec.identity().unwrap();
        assert_eq!(id.server, "addr.example.com");
        assert_eq!(id.namespace, "ns-1");
    }

    #[test]
    fn test_identity_falls_back_to_address() {
        let spec = spec_with(None, Some("10.0.0.1:8848"));
        assert_eq!(spec.identity().unwrap().server, "10.0.0.1:8848");
    }

    #[test]
    fn test_identity_requires_a_server() {
        let spec = spec_with(None, None);
        assert!(matches!(spec.identity(), Err(CoreError::MissingServer)));

        // Empty strings count as absent
        let spec = spec_with(Some(""), None);
        assert!(spec.identity().is_err());
    }

    #[test]
    fn test_sync_policy_open_enumeration() {
        assert!(SyncPolicy::always().is_always());
        assert!(SyncPolicy::default().is_always());

        let custom = SyncPolicy::new("OnSpecChange");
        assert!(!custom.is_always());
        assert_eq!(custom.as_str(), "OnSpecChange");

        // Unknown values survive a serde round-trip
        let json = serde_json::to_string(&custom).unwrap();
        let back: SyncPolicy = serde_json::from_str(&json).unwrap();
        assert_eq!(back, custom);
    }

    #[test]
    fn test_direction_parsing() {
        use std::str::FromStr;
        assert_eq!(
            SyncDirection::from_str("cluster2server").unwrap(),
            SyncDirection::ClusterToServer
        );
        assert_eq!(
            SyncDirection::from_str("ServerToCluster").unwrap(),
            SyncDirection::ServerToCluster
        );
        assert!(SyncDirection::from_str("sideways").is_err());
    }

    #[test]
    fn test_default_local_object() {
        let resource = ConfigSync {
            meta: ResourceMeta {
                name: "app-conf".to_string(),
                namespace: "prod".to_string(),
                ..Default::default()
            },
            spec: ConfigSyncSpec {
                entry_keys: vec!["a".to_string()],
                additional_config: None,
                strategy: SyncStrategy {
                    sync_policy: SyncPolicy::always(),
                    sync_deletion: false,
                    sync_direction: SyncDirection::ClusterToServer,
                },
                remote_server: spec_with(Some("addr.example.com"), None),
                local_object_ref: None,
            },
            status: ConfigSyncStatus::default(),
        };

        assert!(resource.uses_default_local_object());
        assert_eq!(resource.local_object_key(), ResourceKey::new("prod", "app-conf"));
    }

    #[test]
    fn test_explicit_local_object_ref() {
        let mut resource = ConfigSync {
            meta: ResourceMeta {
                name: "app-conf".to_string(),
                namespace: "prod".to_string(),
                ..Default::default()
            },
            spec: ConfigSyncSpec {
                entry_keys: vec!["a".to_string()],
                additional_config: None,
                strategy: SyncStrategy {
                    sync_policy: SyncPolicy::always(),
                    sync_deletion: false,
                    sync_direction: SyncDirection::ClusterToServer,
                },
                remote_server: spec_with(Some("addr.example.com"), None),
                local_object_ref: Some(ObjectRef::named("shared-conf")),
            },
            status: ConfigSyncStatus::default(),
        };

        assert!(!resource.uses_default_local_object());
        assert_eq!(
            resource.local_object_key(),
            ResourceKey::new("prod", "shared-conf")
        );

        // Cross-namespace references resolve to the referenced namespace
        resource.spec.local_object_ref = Some(ObjectRef {
            name: "shared-conf".to_string(),
            namespace: Some("infra".to_string()),
        });
        assert_eq!(
            resource.local_object_key(),
            ResourceKey::new("infra", "shared-conf")
        );
    }

    #[test]
    fn test_finalizer_helpers() {
        let mut meta = ResourceMeta {
            name: "r".to_string(),
            namespace: "ns".to_string(),
            ..Default::default()
        };
        assert!(!meta.is_deleting());
        assert!(!meta.has_finalizer(CLEANUP_FINALIZER));

        meta.finalizers.push(CLEANUP_FINALIZER.to_string());
        meta.deletion_timestamp = Some(Utc::now());
        assert!(meta.is_deleting());
        assert!(meta.has_finalizer(CLEANUP_FINALIZER));
    }

    #[test]
    fn test_status_serde_round_trip() {
        let status = ConfigSyncStatus {
            phase: SyncPhase::Succeed,
            observed_generation: 3,
            local_object_ref: Some(ObjectRef::named("app-conf")),
            sync_statuses: vec![EntrySyncStatus {
                entry_key: "a".to_string(),
                last_sync_time: Utc::now(),
                ready: true,
                message: None,
            }],
        };

        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"phase\":\"succeed\""));
        let back: ConfigSyncStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, status);
    }
}
