//! Object metadata and identities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Metadata common to every stored resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Resource name, unique within its namespace
    pub name: String,

    /// Owning namespace (absent for cluster-scoped resources)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Store-assigned unique identifier
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,

    /// Version bumped by the store on every write
    #[serde(default)]
    pub resource_version: u64,

    /// Version bumped on spec changes
    #[serde(default)]
    pub generation: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl ObjectMeta {
    /// Metadata for a namespaced resource
    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: Some(namespace.into()),
            ..Default::default()
        }
    }

    /// Metadata for a cluster-scoped resource
    pub fn cluster(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Identity of a certificate request: namespace plus name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestKey {
    pub namespace: String,
    pub name: String,
}

impl RequestKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_display() {
        let key = RequestKey::new("prod", "web-tls-1");
        assert_eq!(key.to_string(), "prod/web-tls-1");
    }

    #[test]
    fn test_meta_serializes_camel_case() {
        let mut meta = ObjectMeta::namespaced("prod", "req");
        meta.resource_version = 3;
        meta.labels.insert("env".into(), "prod".into());

        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["resourceVersion"], 3);
        assert_eq!(json["labels"]["env"], "prod");
        assert!(json.get("annotations").is_none());
    }
}
