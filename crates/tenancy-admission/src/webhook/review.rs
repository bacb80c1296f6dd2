//! AdmissionReview handlers

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::Json;
use kube::api::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use tenancy_common::metrics::{record_admission_decision, AdmissionStage};
use tenancy_common::LogicalCluster;

use super::WebhookState;
use crate::attributes::Attributes;
use crate::context::RequestContext;
use crate::error::AdmissionError;

/// Query parameters the API server appends to webhook calls
#[derive(Debug, Default, Deserialize)]
pub struct ReviewQuery {
    /// Webhook timeout, e.g. `10s`
    pub timeout: Option<String>,
}

/// Handle a mutating admission review for Workspaces
pub async fn mutate_handler(
    State(state): State<Arc<WebhookState>>,
    Query(query): Query<ReviewQuery>,
    Json(body): Json<AdmissionReview<DynamicObject>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let req: AdmissionRequest<DynamicObject> = match body.try_into() {
        Ok(req) => req,
        Err(e) => {
            error!(error = %e, "Failed to parse admission request");
            return Json(AdmissionResponse::invalid(e.to_string()).into_review());
        }
    };

    let ctx = request_context(&state, &req, &query);
    let mut attrs = Attributes::from_request(&req);

    let response = match state.plugin.admit(&ctx, &mut attrs) {
        Ok(()) => patch_response(&req, attrs.object.as_ref()),
        Err(e) => deny(&req, AdmissionStage::Mutate, &e),
    };
    Json(response.into_review())
}

/// Handle a validating admission review for Workspaces
pub async fn validate_handler(
    State(state): State<Arc<WebhookState>>,
    Query(query): Query<ReviewQuery>,
    Json(body): Json<AdmissionReview<DynamicObject>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let req: AdmissionRequest<DynamicObject> = match body.try_into() {
        Ok(req) => req,
        Err(e) => {
            error!(error = %e, "Failed to parse admission request");
            return Json(AdmissionResponse::invalid(e.to_string()).into_review());
        }
    };

    let ctx = request_context(&state, &req, &query);
    let attrs = Attributes::from_request(&req);

    let response = match state.plugin.validate(&ctx, &attrs).await {
        Ok(()) => {
            debug!(uid = %req.uid, name = %req.name, "Workspace admitted");
            record_admission_decision(AdmissionStage::Validate, "allowed");
            AdmissionResponse::from(&req)
        }
        Err(e) => deny(&req, AdmissionStage::Validate, &e),
    };
    Json(response.into_review())
}

/// Parse an API server timeout such as `10s`, `500ms`, or `1m`
pub fn parse_timeout(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let (digits, unit) = raw.split_at(raw.find(|c: char| !c.is_ascii_digit())?);
    let value: u64 = digits.parse().ok()?;
    match unit {
        "ms" => Some(Duration::from_millis(value)),
        "s" => Some(Duration::from_secs(value)),
        "m" => Some(Duration::from_secs(value * 60)),
        _ => None,
    }
}

fn request_context(
    state: &WebhookState,
    req: &AdmissionRequest<DynamicObject>,
    query: &ReviewQuery,
) -> RequestContext {
    let timeout = query
        .timeout
        .as_deref()
        .and_then(parse_timeout)
        .unwrap_or(state.default_timeout);

    RequestContext::new(request_cluster(req, &state.default_cluster))
        .with_timeout(timeout)
        .with_cancellation(state.shutdown.child_token())
}

/// Logical cluster a request was made in
///
/// An existing object keeps the scope it was stored with, so updates read the
/// old object and never the requester's copy. Creates read the new object.
fn request_cluster(
    req: &AdmissionRequest<DynamicObject>,
    default_cluster: &LogicalCluster,
) -> LogicalCluster {
    let stored = match req.operation {
        Operation::Create => req.object.as_ref(),
        _ => req.old_object.as_ref().or(req.object.as_ref()),
    };
    stored
        .and_then(|obj| LogicalCluster::from_metadata(&obj.metadata))
        .unwrap_or_else(|| default_cluster.clone())
}

/// Allow, attaching a JSON patch when the mutating stage changed the object
fn patch_response(
    req: &AdmissionRequest<DynamicObject>,
    mutated: Option<&DynamicObject>,
) -> AdmissionResponse {
    let allowed = AdmissionResponse::from(req);
    let (Some(before), Some(after)) = (req.object.as_ref(), mutated) else {
        record_admission_decision(AdmissionStage::Mutate, "allowed");
        return allowed;
    };

    let (before, after) = match (serde_json::to_value(before), serde_json::to_value(after)) {
        (Ok(b), Ok(a)) => (b, a),
        (Err(e), _) | (_, Err(e)) => {
            let err = AdmissionError::malformed(format!("failed to serialize object: {e}"));
            return deny(req, AdmissionStage::Mutate, &err);
        }
    };

    let patch = json_patch::diff(&before, &after);
    if patch.0.is_empty() {
        record_admission_decision(AdmissionStage::Mutate, "allowed");
        return allowed;
    }

    info!(
        uid = %req.uid,
        name = %req.name,
        patch_ops = patch.0.len(),
        "Attaching required initializers to workspace"
    );
    match allowed.with_patch(patch) {
        Ok(response) => {
            record_admission_decision(AdmissionStage::Mutate, "mutated");
            response
        }
        Err(e) => {
            let err = AdmissionError::malformed(format!("patch serialization error: {e}"));
            deny(req, AdmissionStage::Mutate, &err)
        }
    }
}

/// Reject, carrying the error's status code and reason
fn deny(
    req: &AdmissionRequest<DynamicObject>,
    stage: AdmissionStage,
    err: &AdmissionError,
) -> AdmissionResponse {
    match err {
        AdmissionError::PolicyDenied { .. } | AdmissionError::NotReady => {
            info!(
                uid = %req.uid,
                name = %req.name,
                stage = stage.as_str(),
                error = %err,
                "Workspace rejected"
            );
        }
        AdmissionError::BackendUnavailable { backend, .. } => {
            warn!(
                uid = %req.uid,
                name = %req.name,
                stage = stage.as_str(),
                backend = *backend,
                error = %err,
                "Workspace rejected, backend unavailable"
            );
        }
        AdmissionError::MalformedRequest { .. } => {
            error!(
                uid = %req.uid,
                name = %req.name,
                stage = stage.as_str(),
                error = %err,
                "Malformed workspace admission request"
            );
        }
    }
    record_admission_decision(stage, err.metric_label());

    let mut response = AdmissionResponse::from(req).deny(err.to_string());
    response.result.code = err.status_code();
    response.result.reason = err.reason().to_string();
    response
}
