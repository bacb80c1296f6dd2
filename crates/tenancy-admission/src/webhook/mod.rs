//! Admission webhook server
//!
//! Exposes the plugin's two stages as AdmissionReview endpoints:
//! - `POST /mutate/workspaces` runs [`WorkspaceTypeExists::admit`]
//! - `POST /validate/workspaces` runs [`WorkspaceTypeExists::validate`]
//! - `GET /healthz` and `GET /readyz` for probes

mod review;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use tokio_util::sync::CancellationToken;
use tracing::info;

use tenancy_common::LogicalCluster;

use crate::plugin::WorkspaceTypeExists;

pub use review::{mutate_handler, parse_timeout, validate_handler};

/// Grace period for in-flight requests once shutdown starts
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Error type for webhook server operations
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// The certificate or key could not be loaded
    #[error("TLS config error: {0}")]
    Tls(String),

    /// The server failed to bind or serve
    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Shared state for webhook handlers
#[derive(Debug, Clone)]
pub struct WebhookState {
    /// The admission plugin
    pub plugin: Arc<WorkspaceTypeExists>,
    /// Logical cluster assumed when a request does not name one
    pub default_cluster: LogicalCluster,
    /// Deadline for a request that does not carry `?timeout=`
    pub default_timeout: Duration,
    /// Cancelled when the server shuts down
    pub shutdown: CancellationToken,
}

impl WebhookState {
    /// Create webhook state around a wired plugin
    pub fn new(plugin: Arc<WorkspaceTypeExists>) -> Self {
        Self {
            plugin,
            default_cluster: LogicalCluster::default(),
            default_timeout: Duration::from_secs(10),
            shutdown: CancellationToken::new(),
        }
    }
}

/// Build the webhook router
pub fn router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/mutate/workspaces", post(mutate_handler))
        .route("/validate/workspaces", post(validate_handler))
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(readyz_handler))
        .with_state(state)
}

async fn readyz_handler(
    axum::extract::State(state): axum::extract::State<Arc<WebhookState>>,
) -> (StatusCode, &'static str) {
    if state.plugin.is_ready() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "workspace type catalog not synced")
    }
}

/// Where and how to listen
#[derive(Debug, Clone)]
pub struct ServeConfig {
    /// Address to bind
    pub addr: SocketAddr,
    /// PEM certificate and key paths; plaintext when absent
    pub tls: Option<(PathBuf, PathBuf)>,
}

/// Serve `app` until `shutdown` is cancelled
pub async fn serve(
    app: Router,
    config: &ServeConfig,
    shutdown: CancellationToken,
) -> Result<(), WebhookError> {
    match &config.tls {
        Some((cert, key)) => {
            let tls_config = RustlsConfig::from_pem_file(cert, key)
                .await
                .map_err(|e| WebhookError::Tls(e.to_string()))?;

            let handle = axum_server::Handle::new();
            let signal = handle.clone();
            tokio::spawn(async move {
                shutdown.cancelled().await;
                signal.graceful_shutdown(Some(SHUTDOWN_GRACE));
            });

            info!(addr = %config.addr, "Starting admission webhook (TLS)");
            axum_server::bind_rustls(config.addr, tls_config)
                .handle(handle)
                .serve(app.into_make_service())
                .await?;
        }
        None => {
            let listener = tokio::net::TcpListener::bind(config.addr).await?;
            info!(addr = %config.addr, "Starting admission webhook (plaintext)");
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await?;
        }
    }

    info!("Admission webhook stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::catalog::TypeCatalog;

    fn app(catalog: Arc<TypeCatalog>) -> Router {
        let gate = catalog.readiness_gate();
        let plugin = WorkspaceTypeExists::new().with_type_lister(catalog, gate);
        router(Arc::new(WebhookState::new(Arc::new(plugin))))
    }

    async fn get_status(app: Router, uri: &str) -> StatusCode {
        app.oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_healthz() {
        let app = app(Arc::new(TypeCatalog::new()));
        assert_eq!(get_status(app, "/healthz").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_readyz_follows_catalog_sync() {
        let catalog = Arc::new(TypeCatalog::new());
        assert_eq!(
            get_status(app(catalog.clone()), "/readyz").await,
            StatusCode::SERVICE_UNAVAILABLE
        );

        catalog.replace_all(std::iter::empty());
        assert_eq!(get_status(app(catalog), "/readyz").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_tls_files_fail() {
        let config = ServeConfig {
            addr: "127.0.0.1:0".parse().unwrap(),
            tls: Some((
                PathBuf::from("/nonexistent/tls.crt"),
                PathBuf::from("/nonexistent/tls.key"),
            )),
        };
        let result = serve(Router::new(), &config, CancellationToken::new()).await;
        assert!(matches!(result, Err(WebhookError::Tls(_))));
    }

    #[tokio::test]
    async fn test_plaintext_server_stops_on_shutdown() {
        let config = ServeConfig {
            addr: "127.0.0.1:0".parse().unwrap(),
            tls: None,
        };
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        assert!(serve(Router::new(), &config, shutdown).await.is_ok());
    }
}
