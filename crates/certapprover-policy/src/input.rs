//! Policy input document

use crate::error::{PolicyError, Result};
use certapprover_types::{CertificateRequest, Namespace};
use serde::Serialize;

/// Input handed to the policy: the request and the namespace it lives in.
///
/// Field names are part of the policy contract (`input.object`,
/// `input.namespace`).
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PolicyInput<'a> {
    pub object: &'a CertificateRequest,
    pub namespace: &'a Namespace,
}

impl<'a> PolicyInput<'a> {
    pub fn new(object: &'a CertificateRequest, namespace: &'a Namespace) -> Self {
        Self { object, namespace }
    }

    /// Serialize to the JSON document the evaluator consumes
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| PolicyError::Input {
            reason: e.to_string(),
        })
    }
}
