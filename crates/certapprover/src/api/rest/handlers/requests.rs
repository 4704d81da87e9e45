//! Certificate request handlers

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult, StorageError};
use crate::recorder::EventRecorder;
use crate::store::{RequestStore, StatusPatch};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use certapprover_types::{
    CertificateRequest, CertificateRequestCondition, CertificateRequestStatus, EventSeverity,
    RequestKey,
};
use serde::Deserialize;

/// Reason written on an operator's Denied condition
pub const OPERATOR_DENIAL_REASON: &str = "DeniedByOperator";

const DEFAULT_DENIAL_MESSAGE: &str = "CertificateRequest has been denied by an operator";

/// List requests query params
#[derive(Debug, Default, Deserialize)]
pub struct ListRequestsQuery {
    pub namespace: Option<String>,
}

/// Deny request query params
#[derive(Debug, Default, Deserialize)]
pub struct DenyRequestQuery {
    pub message: Option<String>,
}

/// List requests, optionally in one namespace
pub async fn list_requests(
    State(state): State<AppState>,
    Query(query): Query<ListRequestsQuery>,
) -> ApiResult<Json<Vec<CertificateRequest>>> {
    let mut requests = match query.namespace {
        Some(namespace) => state.store.list_requests(&namespace).await?,
        None => state.store.list_all_requests().await?,
    };
    requests.sort_by_key(|r| r.key());

    Ok(Json(requests))
}

/// Get a specific request
pub async fn get_request(
    State(state): State<AppState>,
    Path((namespace, name)): Path<(String, String)>,
) -> ApiResult<Json<CertificateRequest>> {
    let key = RequestKey::new(namespace, name);
    let request = state
        .store
        .get_request(&key)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Certificate request {} not found", key)))?;

    Ok(Json(request))
}

/// Submit a new request. Any status in the body is discarded.
pub async fn create_request(
    State(state): State<AppState>,
    Json(mut request): Json<CertificateRequest>,
) -> ApiResult<(StatusCode, Json<CertificateRequest>)> {
    if request.metadata.name.is_empty() || request.namespace().is_empty() {
        return Err(ApiError::BadRequest(
            "metadata.namespace and metadata.name are required".to_string(),
        ));
    }
    request.status = CertificateRequestStatus::default();

    let stored = state.store.create_request(request).await?;

    tracing::info!(request = %stored.key(), "Created certificate request");

    Ok((StatusCode::CREATED, Json(stored)))
}

/// Replace the spec, labels and annotations of a request
pub async fn update_request(
    State(state): State<AppState>,
    Path((namespace, name)): Path<(String, String)>,
    Json(mut request): Json<CertificateRequest>,
) -> ApiResult<Json<CertificateRequest>> {
    request.metadata.namespace = Some(namespace);
    request.metadata.name = name;

    let stored = state.store.update_request(request).await?;

    tracing::info!(
        request = %stored.key(),
        generation = stored.metadata.generation,
        "Updated certificate request"
    );

    Ok(Json(stored))
}

/// Delete a request
pub async fn delete_request(
    State(state): State<AppState>,
    Path((namespace, name)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let key = RequestKey::new(namespace, name);
    if !state.store.delete_request(&key).await? {
        return Err(ApiError::NotFound(format!(
            "Certificate request {} not found",
            key
        )));
    }

    tracing::info!(request = %key, "Deleted certificate request");

    Ok(StatusCode::NO_CONTENT)
}

/// Deny an undecided request on behalf of an operator
pub async fn deny_request(
    State(state): State<AppState>,
    Path((namespace, name)): Path<(String, String)>,
    Query(query): Query<DenyRequestQuery>,
) -> ApiResult<Json<CertificateRequest>> {
    let key = RequestKey::new(namespace, name);
    let message = query
        .message
        .unwrap_or_else(|| DEFAULT_DENIAL_MESSAGE.to_string());
    let patch = StatusPatch::condition(CertificateRequestCondition::denied(
        OPERATOR_DENIAL_REASON,
        message.clone(),
        chrono::Utc::now(),
    ))
    .only_if_undecided();

    let denied = match state.store.patch_status(&key, patch).await {
        Ok(denied) => denied,
        Err(StorageError::AlreadyDecided(_)) => {
            return Err(ApiError::Conflict(format!(
                "Certificate request {} is already decided",
                key
            )))
        }
        Err(StorageError::NotFound(_)) => {
            return Err(ApiError::NotFound(format!(
                "Certificate request {} not found",
                key
            )))
        }
        Err(e) => return Err(e.into()),
    };

    state
        .recorder
        .record(&denied, EventSeverity::Warning, OPERATOR_DENIAL_REASON, &message);
    tracing::info!(request = %key, "Denied certificate request");

    Ok(Json(denied))
}


