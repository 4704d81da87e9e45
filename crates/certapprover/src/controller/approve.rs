//! Recording an approval on a request

use super::{ReconcileError, ReconcileOutcome};
use crate::error::StorageError;
use crate::recorder::EventRecorder;
use crate::store::{RequestStore, ResourceStore, StatusPatch};
use certapprover_types::{
    events::APPROVAL_REASON, CertificateRequest, CertificateRequestCondition, EventSeverity,
};
use chrono::{DateTime, Utc};

/// Reason written on the Approved condition
pub const APPROVER_REASON: &str = "certapprover";

/// Message written on the Approved condition
pub const APPROVED_MESSAGE: &str = "CertificateRequest has been approved by certapprover";

const ACCEPTED_EVENT: &str = "Accepted by policy";
const UNPERSISTED_EVENT: &str = "Unable to approve policy, even though accepted by policy";

/// The additive patch recording an approval at `now`.
///
/// The patch only applies to a request that is still undecided when it is
/// written.
pub fn approval_patch(now: DateTime<Utc>) -> StatusPatch {
    StatusPatch::condition(CertificateRequestCondition::approved(
        APPROVER_REASON,
        APPROVED_MESSAGE,
        now,
    ))
    .only_if_undecided()
}

/// Patch the request to Approved=True and emit the matching event.
///
/// A request decided since it was read is left alone and reported as
/// [`ReconcileOutcome::AlreadyDecided`] without an event. Any other failed
/// patch emits a warning, since the policy already allowed the request and
/// the decision is now unrecorded.
pub async fn approve(
    store: &dyn ResourceStore,
    recorder: &dyn EventRecorder,
    request: &CertificateRequest,
    now: DateTime<Utc>,
) -> Result<ReconcileOutcome, ReconcileError> {
    match store.patch_status(&request.key(), approval_patch(now)).await {
        Ok(_) => {
            recorder.record(request, EventSeverity::Normal, APPROVAL_REASON, ACCEPTED_EVENT);
            Ok(ReconcileOutcome::Approved)
        }
        Err(StorageError::AlreadyDecided(_)) => {
            tracing::info!(request = %request.key(), "Certificate request was decided during evaluation");
            Ok(ReconcileOutcome::AlreadyDecided)
        }
        Err(e) => {
            tracing::error!(request = %request.key(), error = %e, "Unable to approve certificate request");
            recorder.record(request, EventSeverity::Warning, APPROVAL_REASON, UNPERSISTED_EVENT);
            Err(ReconcileError::PersistFailed(e))
        }
    }
}
