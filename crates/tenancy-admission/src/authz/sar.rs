//! SubjectAccessReview authorizer backend
//!
//! Asks the API server of the type's logical cluster, reached at
//! `<server>/clusters/<cluster>`. Clients are built on first use and cached
//! per logical cluster, up to [`DEFAULT_MAX_CACHED_CLUSTERS`] of them. When the
//! cache is full it is dropped wholesale and rebuilt on demand.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::Uri;
use k8s_openapi::api::authorization::v1::{
    ResourceAttributes, SubjectAccessReview, SubjectAccessReviewSpec, SubjectAccessReviewStatus,
};
use kube::api::PostParams;
use kube::{Api, Client, Config};
use parking_lot::Mutex;
use tracing::debug;

use tenancy_common::LogicalCluster;

use super::{AuthzDecision, AuthzError, Authorizer, AuthorizerFactory, Decision, UseAttributes};

/// Clusters whose clients are kept before the cache is reset
pub const DEFAULT_MAX_CACHED_CLUSTERS: usize = 256;

/// Factory building SubjectAccessReview authorizers per logical cluster
pub struct SubjectAccessReviewFactory {
    base: Config,
    max_cached: usize,
    clients: Mutex<HashMap<LogicalCluster, Arc<dyn Authorizer>>>,
}

impl SubjectAccessReviewFactory {
    /// Create a factory from the kube config of the root API server
    pub fn new(base: Config) -> Self {
        Self::with_max_cached(base, DEFAULT_MAX_CACHED_CLUSTERS)
    }

    /// Like [`Self::new`], keeping at most `max_cached` cluster clients
    pub fn with_max_cached(base: Config, max_cached: usize) -> Self {
        Self {
            base,
            max_cached: max_cached.max(1),
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Number of cluster clients currently cached
    pub fn cached_clusters(&self) -> usize {
        self.clients.lock().len()
    }

    /// Kube config addressing `cluster` on the same server
    fn cluster_config(&self, cluster: &LogicalCluster) -> Result<Config, AuthzError> {
        let mut config = self.base.clone();
        let base = config.cluster_url.to_string();
        let url = format!("{}/clusters/{}", base.trim_end_matches('/'), cluster);
        config.cluster_url = url.parse::<Uri>().map_err(|e| AuthzError::Client {
            cluster: cluster.to_string(),
            message: format!("invalid cluster URL {url}: {e}"),
        })?;
        Ok(config)
    }
}

impl AuthorizerFactory for SubjectAccessReviewFactory {
    fn for_cluster(&self, cluster: &LogicalCluster) -> Result<Arc<dyn Authorizer>, AuthzError> {
        let mut clients = self.clients.lock();
        if let Some(existing) = clients.get(cluster) {
            return Ok(existing.clone());
        }

        let config = self.cluster_config(cluster)?;
        debug!(%cluster, url = %config.cluster_url, "Building SubjectAccessReview client");
        let client = Client::try_from(config).map_err(|e| AuthzError::Client {
            cluster: cluster.to_string(),
            message: e.to_string(),
        })?;

        let authorizer: Arc<dyn Authorizer> = Arc::new(SubjectAccessReviewAuthorizer { client });
        if clients.len() >= self.max_cached {
            debug!(evicted = clients.len(), "SubjectAccessReview client cache full, resetting");
            clients.clear();
        }
        clients.insert(cluster.clone(), authorizer.clone());
        Ok(authorizer)
    }

    fn backend(&self) -> &'static str {
        "subject_access_review"
    }
}

struct SubjectAccessReviewAuthorizer {
    client: Client,
}

#[async_trait]
impl Authorizer for SubjectAccessReviewAuthorizer {
    async fn authorize(&self, attrs: &UseAttributes) -> Result<AuthzDecision, AuthzError> {
        let api: Api<SubjectAccessReview> = Api::all(self.client.clone());
        let review = api
            .create(&PostParams::default(), &build_review(attrs))
            .await
            .map_err(|e| AuthzError::Request(e.to_string()))?;
        decision_from_status(review.status.unwrap_or_default())
    }
}

fn build_review(attrs: &UseAttributes) -> SubjectAccessReview {
    SubjectAccessReview {
        spec: SubjectAccessReviewSpec {
            user: Some(attrs.user.username.clone()),
            uid: attrs.user.uid.clone(),
            groups: Some(attrs.user.groups.clone()),
            extra: (!attrs.user.extra.is_empty()).then(|| attrs.user.extra.clone()),
            resource_attributes: Some(ResourceAttributes {
                verb: Some(attrs.verb.clone()),
                group: Some(attrs.api_group.clone()),
                version: Some(attrs.api_version.clone()),
                resource: Some(attrs.resource.clone()),
                name: Some(attrs.name.clone()),
                ..Default::default()
            }),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn decision_from_status(status: SubjectAccessReviewStatus) -> Result<AuthzDecision, AuthzError> {
    let reason = status.reason.unwrap_or_default();
    if status.allowed {
        return Ok(AuthzDecision {
            decision: Decision::Allow,
            reason,
        });
    }
    if status.denied == Some(true) {
        return Ok(AuthzDecision {
            decision: Decision::Deny,
            reason,
        });
    }
    match status.evaluation_error {
        Some(err) if !err.is_empty() => Err(AuthzError::Request(err)),
        _ => Ok(AuthzDecision {
            decision: Decision::NoOpinion,
            reason,
        }),
    }
}
