//! Reconciliation of certificate requests
//!
//! A single reconcile drives one request to one outcome:
//!
//! 1. fetch the request; gone means done
//! 2. already Approved or Denied means done
//! 3. fetch the namespace
//! 4. evaluate the policy against both
//! 5. on allow, patch Approved=True and emit an event
//! 6. on deny, leave the request pending without any write
//!
//! Every step re-reads the store and the policy is deterministic, so a
//! retried attempt derives the same decision without a decision log.

pub mod approve;
pub mod fanout;
pub mod gather;

use crate::error::StorageError;
use crate::recorder::EventRecorder;
use crate::store::ResourceStore;
use certapprover_policy::{PolicyEngine, PolicyError, PolicyInput};
use certapprover_types::{Namespace, RequestKey};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, instrument};

/// Terminal outcome of a successful reconcile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The request no longer exists
    Gone,
    /// The request already carried a decision
    AlreadyDecided,
    /// The policy allowed the request and the approval was recorded
    Approved,
    /// The policy did not allow the request; nothing was written
    Pending,
}

/// Reconcile failures, scoped to a single attempt
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The request vanished
    #[error("certificate request {0} not found")]
    NotFound(RequestKey),

    /// Store read failed or the namespace is missing
    #[error("transient store failure: {0}")]
    Transient(#[source] StorageError),

    /// The policy could not be evaluated
    #[error("policy evaluation failed: {0}")]
    EvaluationFailed(#[source] PolicyError),

    /// The policy allowed the request but the approval was not stored
    #[error("unable to persist approval: {0}")]
    PersistFailed(#[source] StorageError),
}

impl ReconcileError {
    /// Whether the caller should retry with backoff
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ReconcileError::NotFound(_))
    }

    /// Whether repeated failures are reported to operators as events
    pub fn is_surfaced(&self) -> bool {
        matches!(
            self,
            ReconcileError::EvaluationFailed(_) | ReconcileError::PersistFailed(_)
        )
    }
}

/// The approval controller
#[derive(Clone)]
pub struct CertApprover {
    store: Arc<dyn ResourceStore>,
    policy: Arc<dyn PolicyEngine>,
    recorder: Arc<dyn EventRecorder>,
}

impl CertApprover {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        policy: Arc<dyn PolicyEngine>,
        recorder: Arc<dyn EventRecorder>,
    ) -> Self {
        Self {
            store,
            policy,
            recorder,
        }
    }

    /// Reconcile one request
    #[instrument(skip(self, key), fields(request = %key))]
    pub async fn reconcile(&self, key: &RequestKey) -> Result<ReconcileOutcome, ReconcileError> {
        let request = match gather::fetch_request(self.store.as_ref(), key).await {
            Ok(request) => request,
            Err(ReconcileError::NotFound(_)) => {
                debug!("Certificate request is gone, nothing to do");
                return Ok(ReconcileOutcome::Gone);
            }
            Err(e) => return Err(e),
        };

        if request.status.is_decided() {
            info!("Skipping certificate request, as it is decided already");
            return Ok(ReconcileOutcome::AlreadyDecided);
        }

        let namespace = gather::fetch_namespace(self.store.as_ref(), request.namespace())
            .await
            .inspect_err(|e| error!(error = %e, "Unable to get namespace"))?;

        let decision = self
            .policy
            .evaluate(&PolicyInput::new(&request, &namespace))
            .await
            .map_err(|e| {
                info!(error = %e, "Error during policy evaluation");
                ReconcileError::EvaluationFailed(e)
            })?;

        info!(allowed = decision.is_allowed(), "Policy evaluation result");

        if !decision.is_allowed() {
            return Ok(ReconcileOutcome::Pending);
        }

        approve::approve(
            self.store.as_ref(),
            self.recorder.as_ref(),
            &request,
            chrono::Utc::now(),
        )
        .await
    }

    /// Requests to re-reconcile after `namespace` changed
    pub async fn requests_for_namespace(&self, namespace: &Namespace) -> Vec<RequestKey> {
        fanout::requests_for_namespace(self.store.as_ref(), namespace.name()).await
    }

    pub fn store(&self) -> &Arc<dyn ResourceStore> {
        &self.store
    }

    pub fn recorder(&self) -> &Arc<dyn EventRecorder> {
        &self.recorder
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(!ReconcileError::NotFound(RequestKey::new("prod", "a")).is_retryable());
        assert!(ReconcileError::Transient(StorageError::Connection("down".into())).is_retryable());
        assert!(ReconcileError::EvaluationFailed(PolicyError::Evaluation {
            reason: "boom".into()
        })
        .is_retryable());
        assert!(ReconcileError::PersistFailed(StorageError::Conflict("stale".into())).is_retryable());
    }

    #[test]
    fn test_surfaced_errors() {
        assert!(!ReconcileError::Transient(StorageError::Connection("down".into())).is_surfaced());
        assert!(ReconcileError::EvaluationFailed(PolicyError::Evaluation {
            reason: "boom".into()
        })
        .is_surfaced());
        assert!(ReconcileError::PersistFailed(StorageError::Connection("down".into())).is_surfaced());
    }
}
