//! Approval notifications
//!
//! Events let operators tell "policy said no" (no event at all) apart from
//! "policy said yes but the approval could not be recorded" (a warning).

use crate::meta::RequestKey;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event reason used for every approval notification
pub const APPROVAL_REASON: &str = "Approval";

/// Notification emitted about a certificate request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalEvent {
    /// Unique event ID
    pub id: Uuid,

    /// Event timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,

    /// Request the event is about
    pub involved_object: RequestKey,

    /// Severity as understood by cluster event sinks
    #[serde(rename = "type")]
    pub severity: EventSeverity,

    pub reason: String,

    pub message: String,
}

impl ApprovalEvent {
    pub fn new(
        involved_object: RequestKey,
        severity: EventSeverity,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            involved_object,
            severity,
            reason: reason.into(),
            message: message.into(),
        }
    }
}

/// Event severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Expected outcome
    Normal,
    /// Outcome that needs operator attention
    Warning,
}
