//! Workspace type `use` authorization
//!
//! An [`AuthorizerFactory`] hands out an [`Authorizer`] scoped to one logical
//! cluster. [`UsageAuthorizer`] asks it the single question this gate cares
//! about and folds every outcome into a [`UsageDecision`].

pub mod cedar;
pub mod sar;

use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tracing::{debug, info, warn};

use tenancy_common::metrics::{record_use_decision, AuthDecision};
use tenancy_common::{LogicalCluster, TENANCY_GROUP, TENANCY_VERSION, WORKSPACE_TYPES_RESOURCE};

use crate::attributes::UserInfo;
use crate::context::RequestContext;

pub use cedar::CedarAuthorizerFactory;
pub use sar::SubjectAccessReviewFactory;

/// Verb required to create a workspace of a given type
pub const USE_VERB: &str = "use";

/// A single permission check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UseAttributes {
    /// Requesting principal
    pub user: UserInfo,
    /// Always [`USE_VERB`]
    pub verb: String,
    /// API group of the resource
    pub api_group: String,
    /// API version of the resource
    pub api_version: String,
    /// Plural resource name
    pub resource: String,
    /// Name of the workspace type
    pub name: String,
}

impl UseAttributes {
    /// `use` on `workspacetypes.tenancy.dev/<name>`
    pub fn for_type(user: UserInfo, name: impl Into<String>) -> Self {
        Self {
            user,
            verb: USE_VERB.to_string(),
            api_group: TENANCY_GROUP.to_string(),
            api_version: TENANCY_VERSION.to_string(),
            resource: WORKSPACE_TYPES_RESOURCE.to_string(),
            name: name.into(),
        }
    }
}

/// Raw answer from an authorizer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Explicitly allowed
    Allow,
    /// Explicitly denied
    Deny,
    /// The authorizer has no rule for this request
    NoOpinion,
}

/// Decision plus the authorizer's explanation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthzDecision {
    /// The decision
    pub decision: Decision,
    /// Optional explanation from the backend
    pub reason: String,
}

impl AuthzDecision {
    /// Decision with an empty reason
    pub fn new(decision: Decision) -> Self {
        Self {
            decision,
            reason: String::new(),
        }
    }
}

/// Failure to obtain a decision
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthzError {
    /// No authorizer could be built for the logical cluster
    #[error("failed to build authorizer for logical cluster {cluster}: {message}")]
    Client {
        /// Target logical cluster
        cluster: String,
        /// Underlying failure
        message: String,
    },
    /// The authorizer failed while evaluating
    #[error("authorization request failed: {0}")]
    Request(String),
}

/// Answers permission checks within one logical cluster
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Evaluate a single permission check
    async fn authorize(&self, attrs: &UseAttributes) -> Result<AuthzDecision, AuthzError>;
}

/// Builds authorizers scoped to a logical cluster
#[cfg_attr(test, automock)]
pub trait AuthorizerFactory: Send + Sync {
    /// Authorizer for checks against `cluster`
    fn for_cluster(&self, cluster: &LogicalCluster) -> Result<Arc<dyn Authorizer>, AuthzError>;

    /// Backend label for logs and metrics
    fn backend(&self) -> &'static str;
}

/// Outcome of a `use` check as seen by the admission stages
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsageDecision {
    /// The principal may use the type
    Allow,
    /// The authorizer said no (or had no opinion)
    Deny(String),
    /// No decision could be obtained
    Error(String),
}

/// Runs `use` checks against the logical cluster that owns a type
#[derive(Clone)]
pub struct UsageAuthorizer {
    factory: Arc<dyn AuthorizerFactory>,
}

impl std::fmt::Debug for UsageAuthorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageAuthorizer")
            .field("backend", &self.factory.backend())
            .finish()
    }
}

impl UsageAuthorizer {
    /// Create a usage authorizer over `factory`
    pub fn new(factory: Arc<dyn AuthorizerFactory>) -> Self {
        Self { factory }
    }

    /// May `user` use type `type_name` owned by `cluster`?
    ///
    /// Runs under the request's deadline and cancellation. Nothing is retried.
    pub async fn authorize(
        &self,
        ctx: &RequestContext,
        user: &UserInfo,
        cluster: &LogicalCluster,
        type_name: &str,
    ) -> UsageDecision {
        let backend = self.factory.backend();

        let authorizer = match self.factory.for_cluster(cluster) {
            Ok(a) => a,
            Err(e) => {
                warn!(backend, %cluster, error = %e, "Failed to build authorizer");
                record_use_decision(backend, AuthDecision::Error);
                return UsageDecision::Error(e.to_string());
            }
        };

        let attrs = UseAttributes::for_type(user.clone(), type_name);
        let outcome = match ctx.run(authorizer.authorize(&attrs)).await {
            Ok(result) => result,
            Err(interrupted) => Err(AuthzError::Request(interrupted.to_string())),
        };

        match outcome {
            Ok(AuthzDecision {
                decision: Decision::Allow,
                ..
            }) => {
                debug!(backend, %cluster, user = %user.username, type_name, "use allowed");
                record_use_decision(backend, AuthDecision::Allow);
                UsageDecision::Allow
            }
            Ok(AuthzDecision { decision, reason }) => {
                info!(
                    backend,
                    %cluster,
                    user = %user.username,
                    type_name,
                    ?decision,
                    %reason,
                    "use denied"
                );
                record_use_decision(backend, AuthDecision::Deny);
                UsageDecision::Deny(reason)
            }
            Err(e) => {
                warn!(
                    backend,
                    %cluster,
                    user = %user.username,
                    type_name,
                    error = %e,
                    "use check failed"
                );
                record_use_decision(backend, AuthDecision::Error);
                UsageDecision::Error(e.to_string())
            }
        }
    }
}
