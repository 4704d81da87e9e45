//! In-memory store implementation
//!
//! Every write bumps a store-wide resource version, like a cluster API
//! server does. Status patches are applied as read-modify-write cycles
//! guarded by that version.

use super::traits::*;
use crate::error::StorageError;
use async_trait::async_trait;
use certapprover_types::{CertificateRequest, CertificateRequestStatus, Namespace, RequestKey};
use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

/// Version conflicts a status patch absorbs before failing
const PATCH_RETRIES: u32 = 5;
const WATCH_BUFFER: usize = 1024;

/// In-memory store for development and testing
#[derive(Debug)]
pub struct InMemoryStore {
    requests: Arc<RwLock<HashMap<RequestKey, CertificateRequest>>>,
    namespaces: Arc<RwLock<HashMap<String, Namespace>>>,
    resource_version: Arc<AtomicU64>,
    event_tx: broadcast::Sender<WatchEvent>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(WATCH_BUFFER);
        Self {
            requests: Arc::new(RwLock::new(HashMap::new())),
            namespaces: Arc::new(RwLock::new(HashMap::new())),
            resource_version: Arc::new(AtomicU64::new(0)),
            event_tx,
        }
    }

    fn next_version(&self) -> u64 {
        self.resource_version.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn notify(&self, event: WatchEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }

    /// Replace the whole status of a request if its resource version still
    /// matches `expected_version`.
    pub async fn replace_status(
        &self,
        key: &RequestKey,
        expected_version: u64,
        status: CertificateRequestStatus,
    ) -> StoreResult<CertificateRequest> {
        let stored = {
            let mut requests = self.requests.write().await;
            let request = requests
                .get_mut(key)
                .ok_or_else(|| StorageError::NotFound(format!("certificate request {}", key)))?;

            if request.metadata.resource_version != expected_version {
                return Err(StorageError::Conflict(format!(
                    "certificate request {} changed: expected version {}, found {}",
                    key, expected_version, request.metadata.resource_version
                )));
            }

            request.status = status;
            request.metadata.resource_version = self.next_version();
            request.clone()
        };

        self.notify(WatchEvent::RequestApplied(key.clone()));
        Ok(stored)
    }
}

#[async_trait]
impl RequestStore for InMemoryStore {
    async fn get_request(&self, key: &RequestKey) -> StoreResult<Option<CertificateRequest>> {
        let requests = self.requests.read().await;
        Ok(requests.get(key).cloned())
    }

    async fn list_requests(&self, namespace: &str) -> StoreResult<Vec<CertificateRequest>> {
        let requests = self.requests.read().await;
        Ok(requests
            .values()
            .filter(|r| r.namespace() == namespace)
            .cloned()
            .collect())
    }

    async fn list_all_requests(&self) -> StoreResult<Vec<CertificateRequest>> {
        let requests = self.requests.read().await;
        Ok(requests.values().cloned().collect())
    }

    async fn create_request(
        &self,
        mut request: CertificateRequest,
    ) -> StoreResult<CertificateRequest> {
        if request.metadata.name.is_empty() || request.namespace().is_empty() {
            return Err(StorageError::InvalidData(
                "certificate request needs a namespace and a name".to_string(),
            ));
        }

        let key = request.key();
        let stored = {
            let mut requests = self.requests.write().await;
            if requests.contains_key(&key) {
                return Err(StorageError::Conflict(format!(
                    "certificate request {} already exists",
                    key
                )));
            }

            request.metadata.uid = Uuid::new_v4().to_string();
            request.metadata.generation = 1;
            request.metadata.creation_timestamp = Some(chrono::Utc::now());
            request.metadata.resource_version = self.next_version();
            requests.insert(key.clone(), request.clone());
            request
        };

        self.notify(WatchEvent::RequestApplied(key));
        Ok(stored)
    }

    async fn update_request(
        &self,
        request: CertificateRequest,
    ) -> StoreResult<CertificateRequest> {
        let key = request.key();
        let stored = {
            let mut requests = self.requests.write().await;
            let existing = requests
                .get_mut(&key)
                .ok_or_else(|| StorageError::NotFound(format!("certificate request {}", key)))?;

            let spec_changed = existing.spec != request.spec;
            if !spec_changed
                && existing.metadata.labels == request.metadata.labels
                && existing.metadata.annotations == request.metadata.annotations
            {
                return Ok(existing.clone());
            }

            if spec_changed {
                existing.spec = request.spec;
                existing.metadata.generation += 1;
            }
            existing.metadata.labels = request.metadata.labels;
            existing.metadata.annotations = request.metadata.annotations;
            existing.metadata.resource_version = self.next_version();
            existing.clone()
        };

        self.notify(WatchEvent::RequestApplied(key));
        Ok(stored)
    }

    async fn delete_request(&self, key: &RequestKey) -> StoreResult<bool> {
        let removed = self.requests.write().await.remove(key).is_some();
        if removed {
            self.notify(WatchEvent::RequestDeleted(key.clone()));
        }
        Ok(removed)
    }

    async fn patch_status(
        &self,
        key: &RequestKey,
        patch: StatusPatch,
    ) -> StoreResult<CertificateRequest> {
        for attempt in 0..=PATCH_RETRIES {
            let current = self
                .get_request(key)
                .await?
                .ok_or_else(|| StorageError::NotFound(format!("certificate request {}", key)))?;

            if patch.is_refused_by(&current.status) {
                return Err(StorageError::AlreadyDecided(format!(
                    "certificate request {}",
                    key
                )));
            }

            let mut status = current.status.clone();
            if !patch.apply_to(&mut status) {
                return Ok(current);
            }

            match self
                .replace_status(key, current.metadata.resource_version, status)
                .await
            {
                Err(StorageError::Conflict(reason)) => {
                    tracing::debug!(request = %key, attempt, %reason, "Status patch conflicted, retrying");
                }
                result => return result,
            }
        }

        Err(StorageError::Conflict(format!(
            "certificate request {} kept changing during status patch",
            key
        )))
    }
}

#[async_trait]
impl NamespaceStore for InMemoryStore {
    async fn get_namespace(&self, name: &str) -> StoreResult<Option<Namespace>> {
        let namespaces = self.namespaces.read().await;
        Ok(namespaces.get(name).cloned())
    }

    async fn upsert_namespace(&self, mut namespace: Namespace) -> StoreResult<Namespace> {
        if namespace.name().is_empty() {
            return Err(StorageError::InvalidData("namespace needs a name".to_string()));
        }

        let (old, stored) = {
            let mut namespaces = self.namespaces.write().await;
            let old = namespaces.get(namespace.name()).cloned();

            match &old {
                Some(existing)
                    if existing.metadata.labels == namespace.metadata.labels
                        && existing.metadata.annotations == namespace.metadata.annotations =>
                {
                    return Ok(existing.clone());
                }
                Some(existing) => {
                    namespace.metadata.uid = existing.metadata.uid.clone();
                    namespace.metadata.creation_timestamp = existing.metadata.creation_timestamp;
                }
                None => {
                    namespace.metadata.uid = Uuid::new_v4().to_string();
                    namespace.metadata.creation_timestamp = Some(chrono::Utc::now());
                }
            }

            namespace.metadata.resource_version = self.next_version();
            namespaces.insert(namespace.name().to_string(), namespace.clone());
            (old, namespace)
        };

        self.notify(WatchEvent::NamespaceApplied {
            old: old.map(Box::new),
            new: Box::new(stored.clone()),
        });
        Ok(stored)
    }
}

impl ResourceStore for InMemoryStore {
    fn watch(&self) -> broadcast::Receiver<WatchEvent> {
        self.event_tx.subscribe()
    }
}
