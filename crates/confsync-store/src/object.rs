//! # Stored Object Shapes
//!
//! The two non-resource object kinds the controller reads and writes: the
//! local key/value object it syncs entries against, and the credential
//! object referenced by a resource's auth reference.

use confsync_core::ResourceKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// Key/Value Object
// =============================================================================

/// A local key/value configuration object.
///
/// `resource_version` follows optimistic-concurrency rules: a write must
/// carry the version it was read at (or 0 to create), and a stale version
/// yields a conflict error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KvObject {
    /// Namespaced identity of this object.
    pub key: ResourceKey,

    /// Write version; 0 means "not yet stored".
    #[serde(default)]
    pub resource_version: i64,

    /// The entry mapping.
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl KvObject {
    /// Creates an empty, unstored object under the given key.
    pub fn new(key: ResourceKey) -> Self {
        KvObject {
            key,
            resource_version: 0,
            data: BTreeMap::new(),
        }
    }

    /// Returns true when the object carries no entries.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

// =============================================================================
// Credential Object
// =============================================================================

/// A stored credential object.
///
/// Key material is a flat string map; the auth resolver decides which
/// fields it needs (`ak` / `sk` for access-key credentials).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    /// Namespaced identity of this credential.
    pub key: ResourceKey,

    /// Credential fields.
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl Credential {
    /// Creates a credential under the given key.
    pub fn new(key: ResourceKey) -> Self {
        Credential {
            key,
            data: BTreeMap::new(),
        }
    }

    /// Convenience setter used heavily by tests and seeding code.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(name.into(), value.into());
        self
    }

    /// Looks up one field.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.data.get(name).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kv_object_new_is_unstored() {
        let obj = KvObject::new(ResourceKey::new("ns", "conf"));
        assert_eq!(obj.resource_version, 0);
        assert!(obj.is_empty());
    }

    #[test]
    fn test_credential_fields() {
        let cred = Credential::new(ResourceKey::new("ns", "remote-credentials"))
            .with_field("ak", "AKID")
            .with_field("sk", "SECRET");
        assert_eq!(cred.field("ak"), Some("AKID"));
        assert_eq!(cred.field("sk"), Some("SECRET"));
        assert_eq!(cred.field("token"), None);
    }
}
