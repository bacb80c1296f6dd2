//! Workspace type catalog
//!
//! A read-only, case-insensitive, tenant-scoped view of WorkspaceType objects.
//! The [`informer`] replaces the snapshot wholesale or edits single entries;
//! admission stages only ever read through [`TypeLister`].

pub mod informer;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;
use parking_lot::RwLock;

use tenancy_common::crd::{Initializer, WorkspaceType, UNIVERSAL_TYPE};
use tenancy_common::LogicalCluster;

use crate::error::AdmissionError;
use crate::readiness::ReadinessGate;

pub use informer::run_type_informer;

/// Lookup key: logical cluster plus lowercased type name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CatalogKey {
    cluster: LogicalCluster,
    name: String,
}

impl CatalogKey {
    /// Build a key, folding the name to lowercase
    pub fn new(cluster: LogicalCluster, name: &str) -> Self {
        Self {
            cluster,
            name: name.to_lowercase(),
        }
    }

    /// Logical cluster part of the key
    pub fn cluster(&self) -> &LogicalCluster {
        &self.cluster
    }

    /// Lowercased name part of the key
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Catalog lookup failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    /// No type with this name exists in this logical cluster
    #[error("workspace type {name:?} not found in logical cluster {cluster}")]
    NotFound {
        /// Logical cluster searched
        cluster: LogicalCluster,
        /// Lowercased type name searched
        name: String,
    },
    /// The catalog could not be consulted
    #[error("workspace type catalog unavailable: {0}")]
    Unavailable(String),
}

/// Read access to workspace types
#[cfg_attr(test, automock)]
pub trait TypeLister: Send + Sync {
    /// Look up a workspace type by key
    fn get(&self, key: &CatalogKey) -> Result<Arc<WorkspaceType>, CatalogError>;
}

type Snapshot = Arc<HashMap<CatalogKey, Arc<WorkspaceType>>>;

/// In-memory catalog fed by the WorkspaceType informer
///
/// Readers clone the current snapshot `Arc` and never hold the lock while
/// using it.
#[derive(Debug, Default)]
pub struct TypeCatalog {
    entries: RwLock<Snapshot>,
    synced: Arc<AtomicBool>,
}

impl TypeCatalog {
    /// Create an empty, unsynced catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every entry and mark the catalog synced
    pub fn replace_all(&self, entries: impl IntoIterator<Item = (CatalogKey, WorkspaceType)>) {
        let snapshot: HashMap<_, _> = entries
            .into_iter()
            .map(|(key, wt)| (key, Arc::new(wt)))
            .collect();
        *self.entries.write() = Arc::new(snapshot);
        self.synced.store(true, Ordering::Release);
    }

    /// Insert or replace one entry
    pub fn upsert(&self, key: CatalogKey, workspace_type: WorkspaceType) {
        let mut guard = self.entries.write();
        let mut next = HashMap::clone(&guard);
        next.insert(key, Arc::new(workspace_type));
        *guard = Arc::new(next);
    }

    /// Remove one entry
    pub fn remove(&self, key: &CatalogKey) {
        let mut guard = self.entries.write();
        if guard.contains_key(key) {
            let mut next = HashMap::clone(&guard);
            next.remove(key);
            *guard = Arc::new(next);
        }
    }

    /// Current snapshot
    pub fn snapshot(&self) -> Snapshot {
        self.entries.read().clone()
    }

    /// Number of types across all logical clusters
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the catalog holds no types
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the initial list has been loaded
    pub fn has_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }

    /// Readiness gate that opens once the initial list has been loaded
    pub fn readiness_gate(&self) -> ReadinessGate {
        ReadinessGate::from_flag(self.synced.clone())
    }
}

impl TypeLister for TypeCatalog {
    fn get(&self, key: &CatalogKey) -> Result<Arc<WorkspaceType>, CatalogError> {
        self.snapshot()
            .get(key)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound {
                cluster: key.cluster().clone(),
                name: key.name().to_string(),
            })
    }
}

/// A workspace type after resolution
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedType {
    /// The implicit type: always valid, requires nothing
    Universal,
    /// A catalog entry
    Catalog {
        /// Logical cluster that owns the type
        cluster: LogicalCluster,
        /// The type definition
        workspace_type: Arc<WorkspaceType>,
    },
}

impl ResolvedType {
    /// Initializers every workspace of this type must carry while Initializing
    pub fn required_initializers(&self) -> &[Initializer] {
        match self {
            Self::Universal => &[],
            Self::Catalog { workspace_type, .. } => &workspace_type.spec.initializers,
        }
    }

    /// Type name as stored in the catalog
    pub fn name(&self) -> &str {
        match self {
            Self::Universal => UNIVERSAL_TYPE,
            Self::Catalog { workspace_type, .. } => {
                workspace_type.metadata.name.as_deref().unwrap_or_default()
            }
        }
    }
}

/// Resolve `type_name` within `cluster`
///
/// A missing `Universal` entry resolves to [`ResolvedType::Universal`]; any
/// other missing type is a policy denial.
pub fn resolve_type(
    lister: &dyn TypeLister,
    cluster: &LogicalCluster,
    type_name: &str,
) -> Result<ResolvedType, AdmissionError> {
    match lister.get(&CatalogKey::new(cluster.clone(), type_name)) {
        Ok(workspace_type) => Ok(ResolvedType::Catalog {
            cluster: workspace_type
                .logical_cluster()
                .unwrap_or_else(|| cluster.clone()),
            workspace_type,
        }),
        Err(CatalogError::NotFound { .. }) if type_name == UNIVERSAL_TYPE => {
            Ok(ResolvedType::Universal)
        }
        Err(CatalogError::NotFound { .. }) => Err(AdmissionError::policy_denied(format!(
            "spec.type {type_name:?} does not exist"
        ))),
        Err(CatalogError::Unavailable(message)) => {
            Err(AdmissionError::backend_unavailable("catalog", message))
        }
    }
}
