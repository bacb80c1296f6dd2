//! Cedar policy engine
//!
//! Evaluates `use` requests for workspace types against Cedar policies loaded
//! from CedarPolicy CRDs. Cedar is default-deny: without a matching `permit`
//! (and no matching `forbid`) the answer is [`UseDecision::Deny`].

use std::sync::Arc;

use cedar_policy::{Authorizer, Context, Decision, Entities, PolicyId, PolicySet, Request};
use kube::{Api, Client};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::entities::{build_entity_uid, build_user_entity, build_workspace_type_entities};
use tenancy_common::crd::CedarPolicy;

// ============================================================================
// Error types
// ============================================================================

/// Error type for Cedar policy operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration error (invalid policy text, etc.)
    #[error("configuration error: {0}")]
    Config(String),
    /// Internal error (entity building, request construction)
    #[error("internal error: {0}")]
    Internal(String),
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),
}

/// Result type for Cedar policy operations
pub type Result<T> = std::result::Result<T, Error>;

/// Cedar action evaluated for every request
pub(crate) const USE_ACTION: &str = "use";

// ============================================================================
// Request / decision
// ============================================================================

/// A principal asking to use a workspace type
#[derive(Debug, Clone)]
pub struct UseRequest {
    /// Authenticated username
    pub username: String,
    /// Groups the user belongs to
    pub groups: Vec<String>,
    /// Logical cluster that owns the workspace type
    pub cluster: String,
    /// Workspace type name
    pub type_name: String,
}

/// Outcome of a `use` evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UseDecision {
    /// A permit matched and no forbid did
    Allow,
    /// No permit matched, or a forbid did
    Deny,
}

// ============================================================================
// PolicyEngine
// ============================================================================

/// Cedar policy engine holding the currently loaded policy set
pub struct PolicyEngine {
    authorizer: Authorizer,
    /// Parsed policy set, swapped wholesale on reload
    policy_set: Arc<RwLock<PolicySet>>,
}

impl PolicyEngine {
    /// Create a new policy engine with no policies (default-deny)
    pub fn new() -> Self {
        Self {
            authorizer: Authorizer::new(),
            policy_set: Arc::new(RwLock::new(PolicySet::new())),
        }
    }

    /// Create a policy engine from the CedarPolicy CRDs in `namespace`
    pub async fn from_crds(client: &Client, namespace: &str) -> Result<Self> {
        let policy_set = Self::load_policies_from_crds(client, namespace).await?;
        Ok(Self {
            authorizer: Authorizer::new(),
            policy_set: Arc::new(RwLock::new(policy_set)),
        })
    }

    /// Create a policy engine with explicit policies (for testing)
    pub fn with_policies(policy_text: &str) -> Result<Self> {
        let policy_set: PolicySet =
            policy_text
                .parse()
                .map_err(|e: cedar_policy::ParseErrors| {
                    Error::Config(format!("Invalid Cedar policy: {}", e))
                })?;
        Ok(Self {
            authorizer: Authorizer::new(),
            policy_set: Arc::new(RwLock::new(policy_set)),
        })
    }

    /// Check if any policies are loaded
    pub async fn has_policies(&self) -> bool {
        !self.policy_set.read().await.is_empty()
    }

    /// Reload policies from CRDs, replacing the current set
    pub async fn reload(&self, client: &Client, namespace: &str) -> Result<()> {
        let new_policy_set = Self::load_policies_from_crds(client, namespace).await?;
        let mut policy_set = self.policy_set.write().await;
        *policy_set = new_policy_set;
        info!("Reloaded Cedar policies");
        Ok(())
    }

    /// Decide whether a principal may use a workspace type
    #[instrument(
        skip(self, request),
        fields(
            user = %request.username,
            cluster = %request.cluster,
            workspace_type = %request.type_name,
            otel.kind = "internal"
        )
    )]
    pub async fn authorize_use(&self, request: &UseRequest) -> Result<UseDecision> {
        let policy_set = self.policy_set.read().await;
        self.evaluate_use(request, &policy_set)
    }

    // ========================================================================
    // Private helpers
    // ========================================================================

    fn evaluate_use(&self, request: &UseRequest, policy_set: &PolicySet) -> Result<UseDecision> {
        let principal = build_entity_uid("User", &request.username)?;
        let action = build_entity_uid("Action", USE_ACTION)?;

        let mut entity_vec = build_user_entity(&request.username, &request.groups)?;
        let (resource, type_entities) =
            build_workspace_type_entities(&request.cluster, &request.type_name)?;
        entity_vec.extend(type_entities);

        let entities = Entities::from_entities(entity_vec, None)
            .map_err(|e| Error::Internal(format!("Failed to create entities set: {}", e)))?;

        let cedar_request = Request::new(
            principal.clone(),
            action.clone(),
            resource.clone(),
            Context::empty(),
            None,
        )
        .map_err(|e| Error::Internal(format!("Failed to build Cedar request: {}", e)))?;

        let response = self
            .authorizer
            .is_authorized(&cedar_request, policy_set, &entities);

        for error in response.diagnostics().errors() {
            warn!(%error, "Cedar policy evaluation error");
        }

        debug!(
            principal = %principal,
            action = %action,
            resource = %resource,
            decision = ?response.decision(),
            "Cedar authorization result"
        );

        Ok(match response.decision() {
            Decision::Allow => UseDecision::Allow,
            Decision::Deny => UseDecision::Deny,
        })
    }

    async fn load_policies_from_crds(client: &Client, namespace: &str) -> Result<PolicySet> {
        let api: Api<CedarPolicy> = Api::namespaced(client.clone(), namespace);
        let mut policies = api.list(&Default::default()).await?.items;

        // Higher priority first; name breaks ties so reloads are deterministic
        policies.sort_by(|a, b| {
            b.spec
                .priority
                .cmp(&a.spec.priority)
                .then_with(|| a.metadata.name.cmp(&b.metadata.name))
        });

        let mut policy_set = PolicySet::new();
        let mut loaded = 0;
        let mut errors = 0;
        for crd in &policies {
            let (l, e) = Self::add_policy_to_set(&mut policy_set, crd);
            loaded += l;
            errors += e;
        }

        info!(
            namespace,
            resources = policies.len(),
            loaded,
            errors,
            "Loaded Cedar policies from CRDs"
        );

        Ok(policy_set)
    }

    /// Add the statements of one CedarPolicy to the set
    ///
    /// Statement IDs are prefixed with the resource name, since every parsed
    /// document numbers its statements from `policy0`.
    ///
    /// Returns (loaded_count, error_count)
    fn add_policy_to_set(policy_set: &mut PolicySet, crd: &CedarPolicy) -> (usize, usize) {
        let name = crd.metadata.name.clone().unwrap_or_default();
        if !crd.spec.enabled {
            debug!(name = %name, "Skipping disabled CedarPolicy");
            return (0, 0);
        }

        let parsed = match crd.spec.policies.parse::<PolicySet>() {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(name = %name, error = %e, "Failed to parse CedarPolicy");
                return (0, 1);
            }
        };

        let mut loaded = 0;
        let mut errors = 0;
        for policy in parsed.policies() {
            let id = PolicyId::new(format!("{}.{}", name, policy.id()));
            if let Err(e) = policy_set.add(policy.new_id(id)) {
                warn!(name = %name, error = %e, "Failed to add policy");
                errors += 1;
            } else {
                loaded += 1;
            }
        }
        (loaded, errors)
    }
}

impl Default for PolicyEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tenancy_common::crd::CedarPolicySpec;

    fn use_request(user: &str, groups: &[&str], cluster: &str, type_name: &str) -> UseRequest {
        UseRequest {
            username: user.to_string(),
            groups: groups.iter().map(|g| g.to_string()).collect(),
            cluster: cluster.to_string(),
            type_name: type_name.to_string(),
        }
    }

    fn cedar_policy(name: &str, text: &str, enabled: bool) -> CedarPolicy {
        CedarPolicy::new(
            name,
            CedarPolicySpec {
                description: None,
                policies: text.to_string(),
                priority: 0,
                enabled,
            },
        )
    }

    #[tokio::test]
    async fn test_deny_by_default() {
        let engine = PolicyEngine::new();
        let decision = engine
            .authorize_use(&use_request("alice", &[], "root:org", "team"))
            .await
            .unwrap();
        assert_eq!(decision, UseDecision::Deny);
        assert!(!engine.has_policies().await);
    }

    #[tokio::test]
    async fn test_permit_all_policy() {
        let engine = PolicyEngine::with_policies("permit(principal, action, resource);").unwrap();
        assert!(engine.has_policies().await);
        let decision = engine
            .authorize_use(&use_request("alice", &[], "root:org", "team"))
            .await
            .unwrap();
        assert_eq!(decision, UseDecision::Allow);
    }

    #[tokio::test]
    async fn test_specific_type_grant() {
        let engine = PolicyEngine::with_policies(
            r#"
            permit(
                principal == Tenancy::User::"alice",
                action == Tenancy::Action::"use",
                resource == Tenancy::WorkspaceType::"root:org/team"
            );
            "#,
        )
        .unwrap();

        let allowed = engine
            .authorize_use(&use_request("alice", &[], "root:org", "team"))
            .await
            .unwrap();
        let other_type = engine
            .authorize_use(&use_request("alice", &[], "root:org", "database"))
            .await
            .unwrap();
        let other_user = engine
            .authorize_use(&use_request("bob", &[], "root:org", "team"))
            .await
            .unwrap();

        assert_eq!(allowed, UseDecision::Allow);
        assert_eq!(other_type, UseDecision::Deny);
        assert_eq!(other_user, UseDecision::Deny);
    }

    #[tokio::test]
    async fn test_group_grant_scoped_to_logical_cluster() {
        let engine = PolicyEngine::with_policies(
            r#"
            permit(
                principal in Tenancy::Group::"platform",
                action == Tenancy::Action::"use",
                resource in Tenancy::LogicalCluster::"root:org"
            );
            "#,
        )
        .unwrap();

        let in_org = engine
            .authorize_use(&use_request("carol", &["platform"], "root:org", "team"))
            .await
            .unwrap();
        let other_org = engine
            .authorize_use(&use_request("carol", &["platform"], "root:other", "team"))
            .await
            .unwrap();
        let not_member = engine
            .authorize_use(&use_request("dave", &["dev"], "root:org", "team"))
            .await
            .unwrap();

        assert_eq!(in_org, UseDecision::Allow);
        assert_eq!(other_org, UseDecision::Deny);
        assert_eq!(not_member, UseDecision::Deny);
    }

    #[tokio::test]
    async fn test_attribute_condition_on_type_name() {
        let engine = PolicyEngine::with_policies(
            r#"
            permit(principal, action == Tenancy::Action::"use", resource)
            when { resource.name like "sandbox-*" };
            "#,
        )
        .unwrap();

        let sandbox = engine
            .authorize_use(&use_request("eve", &[], "root", "sandbox-small"))
            .await
            .unwrap();
        let prod = engine
            .authorize_use(&use_request("eve", &[], "root", "production"))
            .await
            .unwrap();

        assert_eq!(sandbox, UseDecision::Allow);
        assert_eq!(prod, UseDecision::Deny);
    }

    #[tokio::test]
    async fn test_forbid_overrides_permit() {
        let engine = PolicyEngine::with_policies(
            r#"
            permit(principal in Tenancy::Group::"admins", action, resource);
            forbid(
                principal == Tenancy::User::"contractor",
                action == Tenancy::Action::"use",
                resource == Tenancy::WorkspaceType::"root/production"
            );
            "#,
        )
        .unwrap();

        let admin = engine
            .authorize_use(&use_request("admin", &["admins"], "root", "production"))
            .await
            .unwrap();
        let contractor = engine
            .authorize_use(&use_request("contractor", &["admins"], "root", "production"))
            .await
            .unwrap();

        assert_eq!(admin, UseDecision::Allow);
        assert_eq!(contractor, UseDecision::Deny);
    }

    #[test]
    fn test_invalid_policy_text_is_config_error() {
        let result = PolicyEngine::with_policies("permit(principal, action");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_policies_from_two_resources_do_not_collide() {
        let mut set = PolicySet::new();
        let a = cedar_policy("a", "permit(principal, action, resource);", true);
        let b = cedar_policy("b", "permit(principal, action, resource);", true);

        assert_eq!(PolicyEngine::add_policy_to_set(&mut set, &a), (1, 0));
        assert_eq!(PolicyEngine::add_policy_to_set(&mut set, &b), (1, 0));
        assert_eq!(set.policies().count(), 2);
    }

    #[test]
    fn test_disabled_and_invalid_resources() {
        let mut set = PolicySet::new();
        let disabled = cedar_policy("off", "permit(principal, action, resource);", false);
        let invalid = cedar_policy("bad", "permit(", true);

        assert_eq!(PolicyEngine::add_policy_to_set(&mut set, &disabled), (0, 0));
        assert_eq!(PolicyEngine::add_policy_to_set(&mut set, &invalid), (0, 1));
        assert!(set.is_empty());
    }
}
