//! WorkspaceType informer
//!
//! Keeps a [`TypeCatalog`] in step with the API server. The initial list is
//! buffered and swapped in at once on `InitDone`, which is also what opens the
//! readiness gate. Relists after a dropped watch swap the whole map again.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::runtime::watcher::{self, Event};
use kube::{Api, ResourceExt};
use tracing::{debug, info, warn};

use tenancy_common::crd::WorkspaceType;
use tenancy_common::LogicalCluster;

use super::{CatalogKey, TypeCatalog};

/// Pause before resuming after a watch error
const WATCH_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Catalog key for a type object, `None` if it has no name
pub fn catalog_key(
    workspace_type: &WorkspaceType,
    default_cluster: &LogicalCluster,
) -> Option<CatalogKey> {
    let name = workspace_type.metadata.name.as_deref()?;
    let cluster = workspace_type
        .logical_cluster()
        .unwrap_or_else(|| default_cluster.clone());
    Some(CatalogKey::new(cluster, name))
}

/// Applies watcher events to a catalog
#[derive(Debug)]
pub struct CatalogUpdater {
    catalog: Arc<TypeCatalog>,
    default_cluster: LogicalCluster,
    pending: Option<HashMap<CatalogKey, WorkspaceType>>,
}

impl CatalogUpdater {
    /// Create an updater writing into `catalog`
    pub fn new(catalog: Arc<TypeCatalog>, default_cluster: LogicalCluster) -> Self {
        Self {
            catalog,
            default_cluster,
            pending: None,
        }
    }

    /// Apply one watcher event
    pub fn apply(&mut self, event: Event<WorkspaceType>) {
        match event {
            Event::Init => {
                debug!("WorkspaceType list started");
                self.pending = Some(HashMap::new());
            }
            Event::InitApply(wt) => {
                let Some(key) = catalog_key(&wt, &self.default_cluster) else {
                    return;
                };
                self.pending.get_or_insert_with(HashMap::new).insert(key, wt);
            }
            Event::InitDone => {
                let entries = self.pending.take().unwrap_or_default();
                info!(types = entries.len(), "WorkspaceType catalog synced");
                self.catalog.replace_all(entries);
            }
            Event::Apply(wt) => {
                if let Some(key) = catalog_key(&wt, &self.default_cluster) {
                    debug!(cluster = %key.cluster(), name = %key.name(), "WorkspaceType applied");
                    self.catalog.upsert(key, wt);
                }
            }
            Event::Delete(wt) => {
                if let Some(key) = catalog_key(&wt, &self.default_cluster) {
                    debug!(cluster = %key.cluster(), name = %key.name(), "WorkspaceType deleted");
                    self.catalog.remove(&key);
                }
            }
        }
    }
}

/// Watch WorkspaceTypes and keep `catalog` current
///
/// Runs until the watch stream ends.
pub async fn run_type_informer(
    api: Api<WorkspaceType>,
    catalog: Arc<TypeCatalog>,
    default_cluster: LogicalCluster,
) {
    // Shorter than the client's read timeout so the server closes the watch first
    let config = watcher::Config::default().timeout(25);
    let mut stream = std::pin::pin!(watcher::watcher(api, config));
    let mut updater = CatalogUpdater::new(catalog, default_cluster);

    info!("Starting WorkspaceType informer");

    while let Some(event) = stream.next().await {
        match event {
            Ok(event) => {
                if let Event::Apply(wt) | Event::Delete(wt) = &event {
                    debug!(name = %wt.name_any(), "WorkspaceType change observed");
                }
                updater.apply(event);
            }
            Err(e) => {
                warn!(error = %e, "WorkspaceType watcher error, will retry");
                tokio::time::sleep(WATCH_RETRY_DELAY).await;
            }
        }
    }

    info!("WorkspaceType informer stopped");
}
