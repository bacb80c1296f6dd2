//! Workspace CRD
//!
//! A Workspace is a tenant-owned unit of isolation. Its `spec.type` names a
//! [`WorkspaceType`](super::WorkspaceType) from the same logical cluster, and
//! its status walks through `Scheduling -> Initializing -> Ready`.

use std::fmt;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::LogicalCluster;

/// Name of the implicit type that always exists and requires nothing
pub const UNIVERSAL_TYPE: &str = "Universal";

fn default_workspace_type() -> String {
    UNIVERSAL_TYPE.to_string()
}

/// Workspace declares a tenant workspace of a given type.
///
/// Example:
/// ```yaml
/// apiVersion: tenancy.dev/v1alpha1
/// kind: Workspace
/// metadata:
///   name: payments
///   annotations:
///     tenancy.dev/cluster: root:org
/// spec:
///   type: team
/// ```
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "tenancy.dev",
    version = "v1alpha1",
    kind = "Workspace",
    derive = "PartialEq",
    plural = "workspaces",
    status = "WorkspaceStatus",
    printcolumn = r#"{"name":"Type","type":"string","jsonPath":".spec.type"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceSpec {
    /// Name of the WorkspaceType this workspace instantiates (case-insensitive)
    #[serde(rename = "type", default = "default_workspace_type")]
    pub type_name: String,
}

/// Workspace status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceStatus {
    /// Current lifecycle phase
    #[serde(default)]
    pub phase: WorkspacePhase,

    /// Initializers that must be cleared before the workspace leaves Initializing
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub initializers: Vec<Initializer>,
}

/// Workspace lifecycle phase
///
/// Phases this crate does not act on, including ones added by other
/// controllers, are carried verbatim in [`WorkspacePhase::Other`]. Matching is
/// exact: `initializing` is not `Initializing`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(from = "String", into = "String")]
pub enum WorkspacePhase {
    /// Waiting to be placed on a shard
    #[default]
    Scheduling,
    /// Initializers are running
    Initializing,
    /// Workspace is usable
    Ready,
    /// Any other phase, kept as written
    Other(String),
}

impl WorkspacePhase {
    /// The phase as it appears in `status.phase`
    pub fn as_str(&self) -> &str {
        match self {
            Self::Scheduling => "Scheduling",
            Self::Initializing => "Initializing",
            Self::Ready => "Ready",
            Self::Other(phase) => phase,
        }
    }

    /// Whether this is exactly `Initializing`
    pub fn is_initializing(&self) -> bool {
        matches!(self, Self::Initializing)
    }
}

impl From<String> for WorkspacePhase {
    fn from(phase: String) -> Self {
        match phase.as_str() {
            "Scheduling" => Self::Scheduling,
            "Initializing" => Self::Initializing,
            "Ready" => Self::Ready,
            _ => Self::Other(phase),
        }
    }
}

impl From<&str> for WorkspacePhase {
    fn from(phase: &str) -> Self {
        Self::from(phase.to_string())
    }
}

impl From<WorkspacePhase> for String {
    fn from(phase: WorkspacePhase) -> Self {
        match phase {
            WorkspacePhase::Other(phase) => phase,
            known => known.as_str().to_string(),
        }
    }
}

impl JsonSchema for WorkspacePhase {
    fn schema_name() -> String {
        "WorkspacePhase".to_string()
    }

    fn is_referenceable() -> bool {
        false
    }

    fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        String::json_schema(gen)
    }
}

impl fmt::Display for WorkspacePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque identifier of a precondition a workspace must satisfy while Initializing
#[derive(
    Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize, JsonSchema,
)]
#[serde(transparent)]
pub struct Initializer(String);

impl Initializer {
    /// Create an initializer identifier
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Initializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Initializer {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl Workspace {
    /// Current phase, `Scheduling` when no status has been written yet
    pub fn phase(&self) -> WorkspacePhase {
        self.status
            .as_ref()
            .map(|s| s.phase.clone())
            .unwrap_or_default()
    }

    /// Initializers currently attached to the workspace
    pub fn initializers(&self) -> &[Initializer] {
        self.status
            .as_ref()
            .map(|s| s.initializers.as_slice())
            .unwrap_or_default()
    }

    /// Logical cluster recorded on the object, if any
    pub fn logical_cluster(&self) -> Option<LogicalCluster> {
        LogicalCluster::from_metadata(&self.metadata)
    }

    /// Whether this workspace asks for the implicit Universal type
    pub fn is_universal(&self) -> bool {
        self.spec.type_name == UNIVERSAL_TYPE
    }
}
