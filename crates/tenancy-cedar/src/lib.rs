//! Cedar policy engine for workspace type usage
//!
//! Answers a single question: may this principal `use` this WorkspaceType?
//!
//! # Entity Model
//!
//! ```text
//! Tenancy::User::"alice@example.com"           (principal)
//! Tenancy::Group::"platform"                   (principal parent)
//! Tenancy::Action::"use"                       (action)
//! Tenancy::WorkspaceType::"root:org/team"      (resource, cluster/name)
//! Tenancy::LogicalCluster::"root:org"          (resource parent)
//! ```

#![deny(missing_docs)]

mod engine;
mod entities;
mod watcher;

pub use engine::{Error, PolicyEngine, Result, UseDecision, UseRequest};
pub use watcher::run_policy_watcher;
