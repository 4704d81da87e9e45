//! Namespace change fanout
//!
//! A decision depends on the namespace as well as the request, so a
//! namespace change re-offers every request in it to the policy.

use crate::store::{RequestStore, ResourceStore};
use certapprover_types::RequestKey;

/// Keys of every request stored in `namespace`.
///
/// Best effort: a listing failure is logged and yields no keys.
pub async fn requests_for_namespace(store: &dyn ResourceStore, namespace: &str) -> Vec<RequestKey> {
    let requests = match store.list_requests(namespace).await {
        Ok(requests) => requests,
        Err(e) => {
            tracing::error!(
                namespace = %namespace,
                error = %e,
                "Unable to retrieve certificate requests for namespace"
            );
            return Vec::new();
        }
    };

    let keys: Vec<RequestKey> = requests.iter().map(|r| r.key()).collect();

    tracing::info!(
        namespace = %namespace,
        count = keys.len(),
        "Enqueuing certificate requests due to namespace change"
    );

    keys
}
