//! CedarPolicy watcher
//!
//! Reloads the policy engine whenever a CedarPolicy in the watched namespace
//! changes, so grants take effect without restarting the admission server.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::runtime::watcher::{self, Event};
use kube::{Api, Client, ResourceExt};
use tracing::{debug, info, warn};

use crate::engine::PolicyEngine;
use tenancy_common::crd::CedarPolicy;

/// Pause before resuming after a watch error
const WATCH_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Watch CedarPolicy resources and reload `engine` on every change
///
/// Runs until the watch stream ends.
pub async fn run_policy_watcher(engine: Arc<PolicyEngine>, client: Client, namespace: String) {
    let api: Api<CedarPolicy> = Api::namespaced(client.clone(), &namespace);
    // Shorter than the client's read timeout so the server closes the watch first
    let config = watcher::Config::default().timeout(25);
    let mut stream = std::pin::pin!(watcher::watcher(api, config));

    info!(namespace = %namespace, "Starting CedarPolicy watcher");

    while let Some(event) = stream.next().await {
        let reason = match event {
            Ok(Event::Apply(policy)) => format!("applied {}", policy.name_any()),
            Ok(Event::Delete(policy)) => format!("deleted {}", policy.name_any()),
            Ok(Event::InitDone) => "initial list complete".to_string(),
            Ok(Event::Init) | Ok(Event::InitApply(_)) => continue,
            Err(e) => {
                warn!(error = %e, "CedarPolicy watcher error, will retry");
                tokio::time::sleep(WATCH_RETRY_DELAY).await;
                continue;
            }
        };

        debug!(%reason, "CedarPolicy change observed");
        if let Err(e) = engine.reload(&client, &namespace).await {
            warn!(error = %e, %reason, "Failed to reload Cedar policies, keeping previous set");
        }
    }

    info!(namespace = %namespace, "CedarPolicy watcher stopped");
}
