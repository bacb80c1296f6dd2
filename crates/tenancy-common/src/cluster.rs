//! Logical cluster (tenant scope) identity
//!
//! Every Workspace and WorkspaceType lives inside a logical cluster. Names are
//! only unique within one, so every lookup of a related object has to carry
//! the logical cluster alongside the name.

use std::fmt;

use kube::api::ObjectMeta;
use serde::{Deserialize, Serialize};

/// Annotation recording the logical cluster an object belongs to
pub const LOGICAL_CLUSTER_ANNOTATION: &str = "tenancy.dev/cluster";

/// Logical cluster used when neither the request nor the object names one
pub const DEFAULT_LOGICAL_CLUSTER: &str = "root";

/// Name of a logical cluster, e.g. `root:org:team-a`
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogicalCluster(String);

impl LogicalCluster {
    /// Create a logical cluster name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The logical cluster name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Read the logical cluster annotation from object metadata
    ///
    /// Returns `None` when the annotation is missing or empty.
    pub fn from_metadata(metadata: &ObjectMeta) -> Option<Self> {
        metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(LOGICAL_CLUSTER_ANNOTATION))
            .filter(|v| !v.is_empty())
            .map(|v| Self::new(v.clone()))
    }
}

impl Default for LogicalCluster {
    fn default() -> Self {
        Self::new(DEFAULT_LOGICAL_CLUSTER)
    }
}

impl fmt::Display for LogicalCluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LogicalCluster {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
