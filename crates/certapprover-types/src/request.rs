//! CertificateRequest resource and its status conditions
//!
//! A request is *decided* once any `Approved` or `Denied` condition carries
//! status `True`. A decided request is final: nothing in the approver touches
//! it again.

use crate::meta::{ObjectMeta, RequestKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A certificate-signing request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateRequest {
    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(default = "default_kind")]
    pub kind: String,

    pub metadata: ObjectMeta,

    #[serde(default)]
    pub spec: CertificateRequestSpec,

    #[serde(default)]
    pub status: CertificateRequestStatus,
}

fn default_api_version() -> String {
    "cert-manager.io/v1".to_string()
}

fn default_kind() -> String {
    "CertificateRequest".to_string()
}

impl CertificateRequest {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        spec: CertificateRequestSpec,
    ) -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            metadata: ObjectMeta::namespaced(namespace, name),
            spec,
            status: CertificateRequestStatus::default(),
        }
    }

    /// Identity of this request
    pub fn key(&self) -> RequestKey {
        RequestKey::new(self.namespace(), self.metadata.name.clone())
    }

    pub fn namespace(&self) -> &str {
        self.metadata.namespace.as_deref().unwrap_or_default()
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}

/// What the requester asked for
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateRequestSpec {
    /// PEM encoded CSR, opaque to the approver
    #[serde(default)]
    pub request: String,

    #[serde(default)]
    pub issuer_ref: IssuerReference,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,

    #[serde(default, rename = "isCA")]
    pub is_ca: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub usages: Vec<String>,

    /// Identity of the requester
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Vec<String>>,
}

/// Reference to the issuer expected to sign the request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuerReference {
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

/// Observed state of a request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateRequestStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<CertificateRequestCondition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_time: Option<DateTime<Utc>>,
}

impl CertificateRequestStatus {
    /// Whether the request already carries a true Approved or Denied condition.
    pub fn is_decided(&self) -> bool {
        self.conditions.iter().any(|c| {
            c.status == ConditionStatus::True
                && matches!(c.condition_type, ConditionType::Approved | ConditionType::Denied)
        })
    }

    pub fn is_approved(&self) -> bool {
        self.condition(&ConditionType::Approved)
            .is_some_and(|c| c.status == ConditionStatus::True)
    }

    pub fn is_denied(&self) -> bool {
        self.condition(&ConditionType::Denied)
            .is_some_and(|c| c.status == ConditionStatus::True)
    }

    /// First condition of the given type
    pub fn condition(&self, condition_type: &ConditionType) -> Option<&CertificateRequestCondition> {
        self.conditions
            .iter()
            .find(|c| &c.condition_type == condition_type)
    }

    /// Add or replace the condition with the same type.
    ///
    /// The transition time of an existing condition is kept when its status
    /// does not change. Returns `false` when the stored status is unchanged.
    pub fn set_condition(&mut self, condition: CertificateRequestCondition) -> bool {
        match self
            .conditions
            .iter_mut()
            .find(|c| c.condition_type == condition.condition_type)
        {
            Some(existing) if existing.status == condition.status => {
                if existing.reason == condition.reason
                    && existing.message == condition.message
                    && existing.observed_generation == condition.observed_generation
                {
                    return false;
                }
                existing.reason = condition.reason;
                existing.message = condition.message;
                existing.observed_generation = condition.observed_generation;
                true
            }
            Some(existing) => {
                *existing = condition;
                true
            }
            None => {
                self.conditions.push(condition);
                true
            }
        }
    }
}

/// A single status condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateRequestCondition {
    #[serde(rename = "type")]
    pub condition_type: ConditionType,

    pub status: ConditionStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl CertificateRequestCondition {
    pub fn new(condition_type: ConditionType, status: ConditionStatus) -> Self {
        Self {
            condition_type,
            status,
            reason: None,
            message: None,
            last_transition_time: None,
            observed_generation: None,
        }
    }

    /// Approved=True with the given reason and message
    pub fn approved(reason: impl Into<String>, message: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self::new(ConditionType::Approved, ConditionStatus::True)
            .with_reason(reason, message)
            .with_transition_time(at)
    }

    /// Denied=True with the given reason and message
    pub fn denied(reason: impl Into<String>, message: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self::new(ConditionType::Denied, ConditionStatus::True)
            .with_reason(reason, message)
            .with_transition_time(at)
    }

    pub fn with_reason(mut self, reason: impl Into<String>, message: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self.message = Some(message.into());
        self
    }

    pub fn with_transition_time(mut self, at: DateTime<Utc>) -> Self {
        self.last_transition_time = Some(at);
        self
    }
}

/// Condition types understood by the approver
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConditionType {
    Approved,
    Denied,
    Ready,
    InvalidRequest,
    /// Any condition type written by another controller
    Other(String),
}

impl ConditionType {
    pub fn as_str(&self) -> &str {
        match self {
            ConditionType::Approved => "Approved",
            ConditionType::Denied => "Denied",
            ConditionType::Ready => "Ready",
            ConditionType::InvalidRequest => "InvalidRequest",
            ConditionType::Other(other) => other,
        }
    }
}

impl From<String> for ConditionType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Approved" => ConditionType::Approved,
            "Denied" => ConditionType::Denied,
            "Ready" => ConditionType::Ready,
            "InvalidRequest" => ConditionType::InvalidRequest,
            _ => ConditionType::Other(value),
        }
    }
}

impl From<ConditionType> for String {
    fn from(value: ConditionType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tri-state condition status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}
