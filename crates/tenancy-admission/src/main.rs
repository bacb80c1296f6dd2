//! tenancy-admission - workspace type admission webhook

use std::sync::Arc;

use clap::Parser;
use kube::{Api, Client, CustomResourceExt};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use tenancy_admission::authz::{
    AuthorizerFactory, CedarAuthorizerFactory, SubjectAccessReviewFactory,
};
use tenancy_admission::catalog::{run_type_informer, TypeCatalog};
use tenancy_admission::config::{AuthorizerBackend, Cli};
use tenancy_admission::webhook::{self, WebhookState};
use tenancy_admission::{WorkspaceTypeExists, PLUGIN_NAME};
use tenancy_cedar::{run_policy_watcher, PolicyEngine};
use tenancy_common::crd::{CedarPolicy, Workspace, WorkspaceType};
use tenancy_common::telemetry::{init_telemetry, TelemetryConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // TLS for both the webhook listener and the kube client
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!("CRITICAL: Failed to install rustls crypto provider: {:?}", e);
        std::process::exit(1);
    }

    let cli = Cli::parse();

    if cli.crd {
        for crd in [Workspace::crd(), WorkspaceType::crd(), CedarPolicy::crd()] {
            println!("---");
            print!("{}", serde_yaml::to_string(&crd)?);
        }
        return Ok(());
    }

    let telemetry = init_telemetry(
        TelemetryConfig::for_service("tenancy-admission")
            .with_plugin(PLUGIN_NAME)
            .with_default_cluster(cli.default_cluster()),
    )?;

    info!(
        plugin = PLUGIN_NAME,
        authorizer = ?cli.authorizer,
        listen_addr = %cli.listen_addr,
        "Starting tenancy admission"
    );

    let client = Client::try_default().await?;
    let shutdown = CancellationToken::new();

    let catalog = Arc::new(TypeCatalog::new());
    tokio::spawn(run_type_informer(
        Api::<WorkspaceType>::all(client.clone()),
        catalog.clone(),
        cli.default_cluster(),
    ));

    let factory: Arc<dyn AuthorizerFactory> = match cli.authorizer {
        AuthorizerBackend::Cedar => {
            let engine = Arc::new(PolicyEngine::from_crds(&client, &cli.policy_namespace).await?);
            tokio::spawn(run_policy_watcher(
                engine.clone(),
                client.clone(),
                cli.policy_namespace.clone(),
            ));
            Arc::new(CedarAuthorizerFactory::new(engine))
        }
        AuthorizerBackend::SubjectAccessReview => {
            let config = kube::Config::infer().await?;
            Arc::new(SubjectAccessReviewFactory::new(config))
        }
    };

    let readiness = catalog.readiness_gate();
    let plugin = WorkspaceTypeExists::new()
        .with_type_lister(catalog, readiness)
        .with_authorizer_factory(factory);
    plugin.validate_initialization()?;

    let state = Arc::new(WebhookState {
        plugin: Arc::new(plugin),
        default_cluster: cli.default_cluster(),
        default_timeout: cli.request_timeout(),
        shutdown: shutdown.clone(),
    });

    tokio::spawn(shutdown_on_signal(shutdown.clone()));

    let served = webhook::serve(webhook::router(state), &cli.serve_config(), shutdown).await;
    if let Err(e) = &served {
        error!(error = %e, "Admission webhook failed");
    }
    telemetry.shutdown();
    Ok(served?)
}

/// Cancel `shutdown` on SIGINT or SIGTERM
async fn shutdown_on_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
    shutdown.cancel();
}
