//! Custom Resource Definitions for workspace tenancy

mod cedar_policy;
mod workspace;
mod workspace_type;

pub use cedar_policy::{CedarPolicy, CedarPolicySpec};
pub use workspace::{
    Initializer, Workspace, WorkspacePhase, WorkspaceSpec, WorkspaceStatus, UNIVERSAL_TYPE,
};
pub use workspace_type::{WorkspaceType, WorkspaceTypeSpec};

pub(crate) fn default_true() -> bool {
    true
}
