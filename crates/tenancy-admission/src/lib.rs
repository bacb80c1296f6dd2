//! Admission gate for tenant workspaces
//!
//! Decides, for every create and update of a `Workspace`, whether its type
//! exists and may be used by the requester, and keeps the type's required
//! initializers attached once the workspace enters `Initializing`.
//!
//! The decision engine is [`plugin::WorkspaceTypeExists`]. Around it:
//! - [`catalog`]: tenant-scoped, case-insensitive WorkspaceType lookups fed by an informer
//! - [`readiness`]: refuses decisions until the catalog has synced
//! - [`authz`]: the `use` check, backed by Cedar or SubjectAccessReview
//! - [`webhook`]: AdmissionReview endpoints for the mutating and validating stages

#![deny(missing_docs)]

pub mod attributes;
pub mod authz;
pub mod catalog;
pub mod config;
pub mod context;
pub mod decode;
pub mod error;
pub mod initializers;
pub mod plugin;
pub mod readiness;
pub mod transition;
pub mod webhook;

pub use attributes::{Attributes, GroupResource, Operation, UserInfo};
pub use context::RequestContext;
pub use error::{AdmissionError, InitializationError};
pub use plugin::{WorkspaceTypeExists, PLUGIN_NAME};
pub use readiness::ReadinessGate;
