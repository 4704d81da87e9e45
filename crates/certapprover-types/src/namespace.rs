//! Namespace resource, the policy context of a request

use crate::meta::ObjectMeta;
use serde::{Deserialize, Serialize};

/// A namespace and its labels/annotations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Namespace {
    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(default = "default_kind")]
    pub kind: String,

    pub metadata: ObjectMeta,
}

fn default_api_version() -> String {
    "v1".to_string()
}

fn default_kind() -> String {
    "Namespace".to_string()
}

impl Namespace {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            metadata: ObjectMeta::cluster(name),
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.labels.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}
