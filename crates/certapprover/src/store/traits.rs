//! Storage trait definitions

use crate::error::StorageError;
use async_trait::async_trait;
use certapprover_types::{
    CertificateRequest, CertificateRequestCondition, CertificateRequestStatus, Namespace,
    RequestKey,
};
use tokio::sync::broadcast;

/// Result type for storage operations
pub type StoreResult<T> = Result<T, StorageError>;

/// Change notification published by a store
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    /// A request was created or updated
    RequestApplied(RequestKey),

    /// A request was deleted
    RequestDeleted(RequestKey),

    /// A namespace was created or updated
    NamespaceApplied {
        old: Option<Box<Namespace>>,
        new: Box<Namespace>,
    },
}

/// Additive status patch.
///
/// Conditions are merged by type into the stored status; every other
/// condition and status field is left as stored.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusPatch {
    pub conditions: Vec<CertificateRequestCondition>,
    /// Refuse the patch with [`StorageError::AlreadyDecided`] when the
    /// stored status is Approved or Denied at write time.
    pub only_if_undecided: bool,
}

impl StatusPatch {
    pub fn condition(condition: CertificateRequestCondition) -> Self {
        Self {
            conditions: vec![condition],
            only_if_undecided: false,
        }
    }

    /// Require the stored request to still be undecided
    pub fn only_if_undecided(mut self) -> Self {
        self.only_if_undecided = true;
        self
    }

    /// Whether the precondition rejects `status`
    pub fn is_refused_by(&self, status: &CertificateRequestStatus) -> bool {
        self.only_if_undecided && status.is_decided()
    }

    /// Merge into a status. Returns `false` if nothing changed.
    pub fn apply_to(&self, status: &mut CertificateRequestStatus) -> bool {
        let mut changed = false;
        for condition in &self.conditions {
            changed |= status.set_condition(condition.clone());
        }
        changed
    }
}

/// Storage for certificate requests
#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Get a request by key
    async fn get_request(&self, key: &RequestKey) -> StoreResult<Option<CertificateRequest>>;

    /// List requests in a namespace
    async fn list_requests(&self, namespace: &str) -> StoreResult<Vec<CertificateRequest>>;

    /// List requests in every namespace
    async fn list_all_requests(&self) -> StoreResult<Vec<CertificateRequest>>;

    /// Create a request; fails with `Conflict` if the key exists
    async fn create_request(&self, request: CertificateRequest) -> StoreResult<CertificateRequest>;

    /// Replace the spec, labels and annotations of an existing request.
    /// The stored status is kept.
    async fn update_request(&self, request: CertificateRequest) -> StoreResult<CertificateRequest>;

    /// Delete a request by key
    async fn delete_request(&self, key: &RequestKey) -> StoreResult<bool>;

    /// Merge a patch into the stored status of a request.
    ///
    /// The patch precondition is checked against the status the merge is
    /// applied to, so a decision written concurrently is never overwritten.
    async fn patch_status(
        &self,
        key: &RequestKey,
        patch: StatusPatch,
    ) -> StoreResult<CertificateRequest>;
}

/// Storage for namespaces
#[async_trait]
pub trait NamespaceStore: Send + Sync {
    /// Get a namespace by name
    async fn get_namespace(&self, name: &str) -> StoreResult<Option<Namespace>>;

    /// Create or update a namespace
    async fn upsert_namespace(&self, namespace: Namespace) -> StoreResult<Namespace>;
}

/// Combined store with change notifications
pub trait ResourceStore: RequestStore + NamespaceStore + Send + Sync {
    /// Subscribe to change notifications
    fn watch(&self) -> broadcast::Receiver<WatchEvent>;
}
