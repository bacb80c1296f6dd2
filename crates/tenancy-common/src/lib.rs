//! Common types for the workspace tenancy admission gate: CRDs, logical
//! cluster scoping, metrics, and telemetry.

#![deny(missing_docs)]

pub mod cluster;
pub mod crd;
pub mod metrics;
pub mod telemetry;

pub use cluster::{LogicalCluster, LOGICAL_CLUSTER_ANNOTATION};

/// API group served by the tenancy CRDs
pub const TENANCY_GROUP: &str = "tenancy.dev";

/// API version served by the tenancy CRDs
pub const TENANCY_VERSION: &str = "v1alpha1";

/// Plural resource name for Workspaces
pub const WORKSPACES_RESOURCE: &str = "workspaces";

/// Plural resource name for WorkspaceTypes
pub const WORKSPACE_TYPES_RESOURCE: &str = "workspacetypes";

/// Namespace holding CedarPolicy resources and the admission deployment
pub const TENANCY_SYSTEM_NAMESPACE: &str = "tenancy-system";

/// Default port for the admission webhook HTTPS server
pub const DEFAULT_WEBHOOK_PORT: u16 = 9443;
