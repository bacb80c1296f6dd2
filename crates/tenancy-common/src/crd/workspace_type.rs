//! WorkspaceType CRD
//!
//! A WorkspaceType is a catalog entry declaring which initializers every
//! workspace of that type must carry once it enters `Initializing`.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::Initializer;
use crate::LogicalCluster;

/// WorkspaceType declares the initializers required by a kind of workspace.
///
/// The object name is the lowercase type name that `Workspace.spec.type`
/// refers to.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "tenancy.dev",
    version = "v1alpha1",
    kind = "WorkspaceType",
    derive = "PartialEq",
    plural = "workspacetypes",
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceTypeSpec {
    /// Initializers added to every workspace of this type on entering Initializing
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub initializers: Vec<Initializer>,
}

impl WorkspaceType {
    /// Logical cluster recorded on the object, if any
    pub fn logical_cluster(&self) -> Option<LogicalCluster> {
        LogicalCluster::from_metadata(&self.metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_type_yaml() {
        let yaml = r#"
apiVersion: tenancy.dev/v1alpha1
kind: WorkspaceType
metadata:
  name: team
  annotations:
    tenancy.dev/cluster: root:org
spec:
  initializers:
    - root:org:team
"#;
        let wt: WorkspaceType = serde_yaml::from_str(yaml).expect("parse");
        assert_eq!(wt.spec.initializers, vec![Initializer::new("root:org:team")]);
        assert_eq!(wt.logical_cluster(), Some(LogicalCluster::new("root:org")));
    }

    #[test]
    fn test_initializers_default_empty() {
        let yaml = r#"
apiVersion: tenancy.dev/v1alpha1
kind: WorkspaceType
metadata:
  name: plain
spec: {}
"#;
        let wt: WorkspaceType = serde_yaml::from_str(yaml).expect("parse");
        assert!(wt.spec.initializers.is_empty());
        assert_eq!(wt.logical_cluster(), None);
    }
}
