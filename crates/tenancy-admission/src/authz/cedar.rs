//! Cedar authorizer backend
//!
//! Delegates `use` checks to the in-process [`PolicyEngine`]. Cedar never
//! abstains: anything not permitted is a [`Decision::Deny`].

use std::sync::Arc;

use async_trait::async_trait;

use tenancy_cedar::{PolicyEngine, UseDecision, UseRequest};
use tenancy_common::LogicalCluster;

use super::{AuthzDecision, AuthzError, Authorizer, AuthorizerFactory, Decision, UseAttributes};

/// Factory handing out Cedar authorizers bound to a logical cluster
#[derive(Clone)]
pub struct CedarAuthorizerFactory {
    engine: Arc<PolicyEngine>,
}

impl CedarAuthorizerFactory {
    /// Create a factory over a shared policy engine
    pub fn new(engine: Arc<PolicyEngine>) -> Self {
        Self { engine }
    }
}

impl AuthorizerFactory for CedarAuthorizerFactory {
    fn for_cluster(&self, cluster: &LogicalCluster) -> Result<Arc<dyn Authorizer>, AuthzError> {
        Ok(Arc::new(CedarAuthorizer {
            engine: self.engine.clone(),
            cluster: cluster.clone(),
        }))
    }

    fn backend(&self) -> &'static str {
        "cedar"
    }
}

struct CedarAuthorizer {
    engine: Arc<PolicyEngine>,
    cluster: LogicalCluster,
}

#[async_trait]
impl Authorizer for CedarAuthorizer {
    async fn authorize(&self, attrs: &UseAttributes) -> Result<AuthzDecision, AuthzError> {
        let request = UseRequest {
            username: attrs.user.username.clone(),
            groups: attrs.user.groups.clone(),
            cluster: self.cluster.to_string(),
            type_name: attrs.name.clone(),
        };

        match self.engine.authorize_use(&request).await {
            Ok(UseDecision::Allow) => Ok(AuthzDecision::new(Decision::Allow)),
            Ok(UseDecision::Deny) => Ok(AuthzDecision {
                decision: Decision::Deny,
                reason: format!(
                    "no Cedar policy permits {} to use {}/{}",
                    attrs.user.username, self.cluster, attrs.name
                ),
            }),
            Err(e) => Err(AuthzError::Request(e.to_string())),
        }
    }
}
