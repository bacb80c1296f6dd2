//! End-to-end admission chain tests
//!
//! Drives the mutating and validating webhooks the way the API server does:
//! mutate first, apply the returned patch, then validate the patched object.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use kube::api::{DynamicObject, ObjectMeta};
use kube::core::admission::{AdmissionResponse, AdmissionReview};
use serde_json::{json, Value};
use tower::ServiceExt;

use tenancy_admission::authz::CedarAuthorizerFactory;
use tenancy_admission::catalog::{CatalogKey, TypeCatalog};
use tenancy_admission::webhook::{router, WebhookState};
use tenancy_admission::WorkspaceTypeExists;
use tenancy_cedar::PolicyEngine;
use tenancy_common::crd::{Initializer, WorkspaceType, WorkspaceTypeSpec};
use tenancy_common::{LogicalCluster, LOGICAL_CLUSTER_ANNOTATION};

const ORG: &str = "root:org";

/// Members of team-a may use any type defined in root:org
const POLICIES: &str = r#"
permit(
    principal in Tenancy::Group::"team-a",
    action == Tenancy::Action::"use",
    resource in Tenancy::LogicalCluster::"root:org"
);
"#;

// =============================================================================
// Fixtures
// =============================================================================

fn workspace_type(name: &str, initializers: &[&str]) -> WorkspaceType {
    WorkspaceType {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            annotations: Some(BTreeMap::from([(
                LOGICAL_CLUSTER_ANNOTATION.to_string(),
                ORG.to_string(),
            )])),
            ..Default::default()
        },
        spec: WorkspaceTypeSpec {
            initializers: initializers.iter().map(|i| Initializer::new(*i)).collect(),
        },
    }
}

fn synced_catalog(types: Vec<WorkspaceType>) -> Arc<TypeCatalog> {
    let catalog = Arc::new(TypeCatalog::new());
    catalog.replace_all(types.into_iter().map(|wt| {
        let name = wt.metadata.name.clone().unwrap_or_default();
        (CatalogKey::new(LogicalCluster::new(ORG), &name), wt)
    }));
    catalog
}

fn app_with(catalog: Arc<TypeCatalog>) -> Router {
    let engine = PolicyEngine::with_policies(POLICIES).unwrap();
    let gate = catalog.readiness_gate();
    let plugin = WorkspaceTypeExists::new()
        .with_type_lister(catalog, gate)
        .with_authorizer_factory(Arc::new(CedarAuthorizerFactory::new(Arc::new(engine))));
    router(Arc::new(WebhookState::new(Arc::new(plugin))))
}

fn app() -> Router {
    app_with(synced_catalog(vec![workspace_type("team-a", &["A", "B"])]))
}

fn workspace(type_name: &str, phase: Option<&str>, initializers: &[&str]) -> Value {
    let mut ws = json!({
        "apiVersion": "tenancy.dev/v1alpha1",
        "kind": "Workspace",
        "metadata": {
            "name": "payments",
            "annotations": {"tenancy.dev/cluster": ORG},
            "labels": {"cost-center": "42"}
        },
        "spec": {"type": type_name}
    });
    if let Some(phase) = phase {
        ws["status"] = json!({"phase": phase, "initializers": initializers});
    }
    ws
}

fn review(
    operation: &str,
    object: Value,
    old_object: Option<Value>,
    user: &str,
    groups: &[&str],
) -> Value {
    json!({
        "apiVersion": "admission.k8s.io/v1",
        "kind": "AdmissionReview",
        "request": {
            "uid": "3f1c2b9e-1d2a-4c55-9a7e-0b7c1f0d9e11",
            "kind": {"group": "tenancy.dev", "version": "v1alpha1", "kind": "Workspace"},
            "resource": {"group": "tenancy.dev", "version": "v1alpha1", "resource": "workspaces"},
            "name": "payments",
            "operation": operation,
            "userInfo": {"username": user, "groups": groups},
            "object": object,
            "oldObject": old_object,
            "dryRun": false
        }
    })
}

fn create(object: Value, user: &str, groups: &[&str]) -> Value {
    review("CREATE", object, None, user, groups)
}

fn update(old: Value, new: Value) -> Value {
    review("UPDATE", new, Some(old), "workspace-scheduler", &["system:masters"])
}

async fn post(app: &Router, path: &str, body: &Value) -> AdmissionResponse {
    let request = Request::post(path)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let review: AdmissionReview<DynamicObject> = serde_json::from_slice(&bytes).unwrap();
    review.response.expect("review should carry a response")
}

/// Apply the mutating response's patch to the object inside `review`
fn apply_patch(review: &mut Value, response: &AdmissionResponse) {
    let Some(bytes) = response.patch.as_ref() else {
        return;
    };
    let patch: json_patch::Patch = serde_json::from_slice(bytes).unwrap();
    json_patch::patch(&mut review["request"]["object"], &patch.0).unwrap();
}

fn initializers(review: &Value) -> Value {
    review["request"]["object"]["status"]["initializers"].clone()
}

// =============================================================================
// Story Tests
// =============================================================================

/// Story: a Universal workspace is admitted for anyone, unchanged
#[tokio::test]
async fn story_universal_create_allowed_for_anyone() {
    let app = app_with(synced_catalog(vec![]));
    let body = create(workspace("Universal", None, &[]), "mallory", &[]);

    let mutated = post(&app, "/mutate/workspaces", &body).await;
    assert!(mutated.allowed);
    assert!(mutated.patch.is_none());

    let validated = post(&app, "/validate/workspaces", &body).await;
    assert!(validated.allowed);
}

/// Story: creating a team-a workspace without `use` is forbidden
#[tokio::test]
async fn story_create_without_use_is_forbidden() {
    let app = app();
    let body = create(workspace("team-a", None, &[]), "bob", &["team-b"]);

    let mutated = post(&app, "/mutate/workspaces", &body).await;
    assert!(mutated.allowed);
    assert!(mutated.patch.is_none());

    let validated = post(&app, "/validate/workspaces", &body).await;
    assert!(!validated.allowed);
    assert_eq!(validated.result.code, 403);
    assert_eq!(validated.result.reason, "Forbidden");
    assert!(validated.result.message.contains("verb='use'"));
}

/// Story: a member of team-a may create a team-a workspace
#[tokio::test]
async fn story_create_with_use_is_allowed() {
    let app = app();
    let body = create(workspace("Team-A", None, &[]), "alice", &["team-a"]);

    let validated = post(&app, "/validate/workspaces", &body).await;
    assert!(validated.allowed, "{:?}", validated.result);
}

/// Story: entering Initializing attaches the type's initializers
#[tokio::test]
async fn story_transition_attaches_initializers() {
    let app = app();
    let mut body = update(
        workspace("team-a", Some("Scheduling"), &[]),
        workspace("team-a", Some("Initializing"), &["A"]),
    );

    let mutated = post(&app, "/mutate/workspaces", &body).await;
    assert!(mutated.allowed);
    assert!(mutated.patch.is_some());
    apply_patch(&mut body, &mutated);
    assert_eq!(initializers(&body), json!(["A", "B"]));
    assert_eq!(
        body["request"]["object"]["metadata"]["labels"]["cost-center"],
        json!("42")
    );

    let validated = post(&app, "/validate/workspaces", &body).await;
    assert!(validated.allowed, "{:?}", validated.result);
}

/// Story: a later mutating webhook stripping an initializer is rejected
#[tokio::test]
async fn story_stripped_initializer_is_rejected() {
    let app = app();
    let mut body = update(
        workspace("team-a", Some("Scheduling"), &[]),
        workspace("team-a", Some("Initializing"), &["A"]),
    );

    let mutated = post(&app, "/mutate/workspaces", &body).await;
    apply_patch(&mut body, &mutated);
    body["request"]["object"]["status"]["initializers"] = json!(["A"]);

    let validated = post(&app, "/validate/workspaces", &body).await;
    assert!(!validated.allowed);
    assert_eq!(validated.result.code, 403);
    assert!(
        validated.result.message.contains("required initializer \"B\""),
        "{}",
        validated.result.message
    );
}

/// Story: a transition with a type missing from the catalog is rejected
#[tokio::test]
async fn story_transition_with_unknown_type() {
    let app = app_with(synced_catalog(vec![]));

    let body = update(
        workspace("team-a", Some("Scheduling"), &[]),
        workspace("team-a", Some("Initializing"), &[]),
    );
    let mutated = post(&app, "/mutate/workspaces", &body).await;
    assert!(!mutated.allowed);
    assert!(mutated.result.message.contains("spec.type \"team-a\" does not exist"));
    let validated = post(&app, "/validate/workspaces", &body).await;
    assert!(!validated.allowed);

    let body = update(
        workspace("Universal", Some("Scheduling"), &[]),
        workspace("Universal", Some("Initializing"), &[]),
    );
    let mutated = post(&app, "/mutate/workspaces", &body).await;
    assert!(mutated.allowed);
    assert!(mutated.patch.is_none());
    assert!(post(&app, "/validate/workspaces", &body).await.allowed);
}

// =============================================================================
// Edge Cases
// =============================================================================

#[tokio::test]
async fn test_not_ready_rejects_until_catalog_syncs() {
    let catalog = Arc::new(TypeCatalog::new());
    let app = app_with(catalog.clone());
    let body = create(workspace("Universal", None, &[]), "alice", &["team-a"]);

    let validated = post(&app, "/validate/workspaces", &body).await;
    assert!(!validated.allowed);
    assert_eq!(validated.result.reason, "NotReady");

    catalog.replace_all(std::iter::empty());
    assert!(post(&app, "/validate/workspaces", &body).await.allowed);
}

#[tokio::test]
async fn test_non_transition_update_passes_while_unsynced() {
    let app = app_with(Arc::new(TypeCatalog::new()));
    let body = update(
        workspace("team-a", Some("Initializing"), &["A"]),
        workspace("team-a", Some("Ready"), &[]),
    );

    assert!(post(&app, "/mutate/workspaces", &body).await.allowed);
    assert!(post(&app, "/validate/workspaces", &body).await.allowed);
}

#[tokio::test]
async fn test_other_resources_pass_through() {
    let app = app();
    let mut body = create(workspace("team-a", None, &[]), "bob", &[]);
    body["request"]["resource"]["resource"] = json!("workspacetypes");

    assert!(post(&app, "/validate/workspaces", &body).await.allowed);
}

#[tokio::test]
async fn test_malformed_old_object_is_internal_error() {
    let app = app();
    let mut body = update(
        workspace("team-a", Some("Scheduling"), &[]),
        workspace("team-a", Some("Initializing"), &[]),
    );
    body["request"]["oldObject"]["spec"]["type"] = json!(7);

    let mutated = post(&app, "/mutate/workspaces", &body).await;
    assert!(!mutated.allowed);
    assert_eq!(mutated.result.code, 500);
}

#[tokio::test]
async fn test_review_without_request_is_invalid() {
    let app = app();
    let body = json!({"apiVersion": "admission.k8s.io/v1", "kind": "AdmissionReview"});

    let response = post(&app, "/validate/workspaces", &body).await;
    assert!(!response.allowed);
}

#[tokio::test]
async fn test_timeout_query_is_accepted() {
    let app = app();
    let body = create(workspace("team-a", None, &[]), "alice", &["team-a"]);

    let response = post(&app, "/validate/workspaces?timeout=5s", &body).await;
    assert!(response.allowed);
}

#[tokio::test]
async fn test_unknown_phase_update_passes_both_stages() {
    let app = app();
    let body = update(
        workspace("team-a", Some("Unschedulable"), &[]),
        workspace("team-a", Some("Ready"), &[]),
    );

    let mutated = post(&app, "/mutate/workspaces", &body).await;
    assert!(mutated.allowed, "{:?}", mutated.result);
    assert!(mutated.patch.is_none());

    let validated = post(&app, "/validate/workspaces", &body).await;
    assert!(validated.allowed, "{:?}", validated.result);
}

#[tokio::test]
async fn test_moving_cluster_cannot_skip_initializers() {
    let mut bare = workspace_type("team-a", &[]);
    bare.metadata.annotations = Some(BTreeMap::from([(
        LOGICAL_CLUSTER_ANNOTATION.to_string(),
        "root:bare".to_string(),
    )]));
    let catalog = Arc::new(TypeCatalog::new());
    catalog.replace_all([
        (
            CatalogKey::new(LogicalCluster::new(ORG), "team-a"),
            workspace_type("team-a", &["A", "B"]),
        ),
        (CatalogKey::new(LogicalCluster::new("root:bare"), "team-a"), bare),
    ]);
    let app = app_with(catalog);

    let mut moved = workspace("team-a", Some("Initializing"), &[]);
    moved["metadata"]["annotations"]["tenancy.dev/cluster"] = json!("root:bare");
    let body = update(workspace("team-a", Some("Scheduling"), &[]), moved);

    let mutated = post(&app, "/mutate/workspaces", &body).await;
    assert!(!mutated.allowed);
    assert_eq!(mutated.result.code, 403);
    assert!(mutated.patch.is_none());

    let validated = post(&app, "/validate/workspaces", &body).await;
    assert!(!validated.allowed);
    assert!(validated.result.message.contains("root:bare"));
}
