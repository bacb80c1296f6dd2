//! CedarPolicy CRD for workspace type usage grants
//!
//! A CedarPolicy carries Cedar statements deciding who may `use` which
//! WorkspaceType. Policies live in the tenancy system namespace.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// CedarPolicy grants or forbids the `use` action on workspace types.
///
/// Example:
/// ```yaml
/// apiVersion: tenancy.dev/v1alpha1
/// kind: CedarPolicy
/// metadata:
///   name: platform-team-types
///   namespace: tenancy-system
/// spec:
///   description: Platform engineers may create team workspaces in root:org
///   policies: |
///     permit(
///       principal in Tenancy::Group::"platform",
///       action == Tenancy::Action::"use",
///       resource in Tenancy::LogicalCluster::"root:org"
///     );
/// ```
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "tenancy.dev",
    version = "v1alpha1",
    kind = "CedarPolicy",
    namespaced,
    printcolumn = r#"{"name":"Description","type":"string","jsonPath":".spec.description"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CedarPolicySpec {
    /// Human-readable description of what this policy does
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Cedar policy text
    ///
    /// Entity types available to policies:
    /// - Tenancy::User / Tenancy::Group (principal)
    /// - Tenancy::Action::"use" (action)
    /// - Tenancy::WorkspaceType (resource, `"<cluster>/<name>"`)
    /// - Tenancy::LogicalCluster (parent of every WorkspaceType)
    pub policies: String,

    /// Priority for policy loading (higher = loaded first)
    #[serde(default)]
    pub priority: i32,

    /// Disabled policies are not loaded
    #[serde(default = "super::default_true")]
    pub enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_cedar_policy_yaml() {
        let yaml = r#"
apiVersion: tenancy.dev/v1alpha1
kind: CedarPolicy
metadata:
  name: admin-use
  namespace: tenancy-system
spec:
  description: Admins may use every type
  policies: |
    permit(principal in Tenancy::Group::"admins", action, resource);
"#;
        let policy: CedarPolicy = serde_yaml::from_str(yaml).expect("parse");
        assert_eq!(
            policy.spec.description,
            Some("Admins may use every type".to_string())
        );
        assert!(policy.spec.policies.contains("admins"));
        assert!(policy.spec.enabled);
        assert_eq!(policy.spec.priority, 0);
    }

    #[test]
    fn disabled_policy_yaml() {
        let yaml = r#"
apiVersion: tenancy.dev/v1alpha1
kind: CedarPolicy
metadata:
  name: off
spec:
  policies: ""
  enabled: false
  priority: 10
"#;
        let policy: CedarPolicy = serde_yaml::from_str(yaml).expect("parse");
        assert!(!policy.spec.enabled);
        assert_eq!(policy.spec.priority, 10);
    }
}
