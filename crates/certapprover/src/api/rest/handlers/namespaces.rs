//! Namespace handlers
//!
//! Namespaces are owned by the platform; these endpoints stand in for the
//! external edits whose label changes re-trigger policy evaluation.

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use crate::store::NamespaceStore;
use axum::{
    extract::{Path, State},
    Json,
};
use certapprover_types::Namespace;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Desired namespace metadata
#[derive(Debug, Default, Deserialize)]
pub struct PutNamespaceRequest {
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

/// Get a namespace
pub async fn get_namespace(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Namespace>> {
    let namespace = state
        .store
        .get_namespace(&name)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Namespace {} not found", name)))?;

    Ok(Json(namespace))
}

/// Create or replace the labels and annotations of a namespace
pub async fn put_namespace(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<PutNamespaceRequest>,
) -> ApiResult<Json<Namespace>> {
    let mut namespace = Namespace::new(name);
    namespace.metadata.labels = request.labels;
    namespace.metadata.annotations = request.annotations;

    let stored = state.store.upsert_namespace(namespace).await?;

    tracing::info!(
        namespace = %stored.name(),
        resource_version = stored.metadata.resource_version,
        "Applied namespace"
    );

    Ok(Json(stored))
}
