//! Fact gathering: fresh reads of a request and its namespace

use super::ReconcileError;
use crate::error::StorageError;
use crate::store::{NamespaceStore, RequestStore, ResourceStore};
use certapprover_types::{CertificateRequest, Namespace, RequestKey};

/// Fetch the current request. Absence is `NotFound`, any store failure is
/// `Transient`.
pub async fn fetch_request(
    store: &dyn ResourceStore,
    key: &RequestKey,
) -> Result<CertificateRequest, ReconcileError> {
    match store.get_request(key).await {
        Ok(Some(request)) => Ok(request),
        Ok(None) | Err(StorageError::NotFound(_)) => Err(ReconcileError::NotFound(key.clone())),
        Err(e) => Err(ReconcileError::Transient(e)),
    }
}

/// Fetch the current namespace. Absence and store failures are both
/// `Transient`: the namespace may not have reached the store yet.
pub async fn fetch_namespace(
    store: &dyn ResourceStore,
    name: &str,
) -> Result<Namespace, ReconcileError> {
    match store.get_namespace(name).await {
        Ok(Some(namespace)) => Ok(namespace),
        Ok(None) => Err(ReconcileError::Transient(StorageError::NotFound(format!(
            "namespace {}",
            name
        )))),
        Err(e) => Err(ReconcileError::Transient(e)),
    }
}
