//! Command-line and environment configuration

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use tenancy_common::cluster::DEFAULT_LOGICAL_CLUSTER;
use tenancy_common::{LogicalCluster, DEFAULT_WEBHOOK_PORT, TENANCY_SYSTEM_NAMESPACE};

use crate::webhook::ServeConfig;

/// Which backend answers workspace type `use` checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AuthorizerBackend {
    /// In-process Cedar policies loaded from CedarPolicy resources
    Cedar,
    /// SubjectAccessReview against the owning logical cluster
    SubjectAccessReview,
}

/// Tenancy admission - workspace type validation webhook
#[derive(Parser, Debug, Clone)]
#[command(name = "tenancy-admission", version, about, long_about = None)]
pub struct Cli {
    /// Print CRD manifests and exit
    #[arg(long)]
    pub crd: bool,

    /// Address the webhook listens on
    #[arg(long, env = "TENANCY_LISTEN_ADDR", default_value_t = default_listen_addr())]
    pub listen_addr: SocketAddr,

    /// PEM certificate for the webhook; plaintext when unset
    #[arg(long, env = "TENANCY_TLS_CERT", requires = "tls_key")]
    pub tls_cert: Option<PathBuf>,

    /// PEM private key for the webhook
    #[arg(long, env = "TENANCY_TLS_KEY", requires = "tls_cert")]
    pub tls_key: Option<PathBuf>,

    /// Backend for `use` authorization
    #[arg(long, env = "TENANCY_AUTHORIZER", value_enum, default_value_t = AuthorizerBackend::Cedar)]
    pub authorizer: AuthorizerBackend,

    /// Namespace holding CedarPolicy resources
    #[arg(long, env = "TENANCY_POLICY_NAMESPACE", default_value = TENANCY_SYSTEM_NAMESPACE)]
    pub policy_namespace: String,

    /// Logical cluster for objects that do not carry one
    #[arg(long, env = "TENANCY_DEFAULT_CLUSTER", default_value = DEFAULT_LOGICAL_CLUSTER)]
    pub default_cluster: String,

    /// Request deadline when the API server does not send one
    #[arg(long, env = "TENANCY_REQUEST_TIMEOUT_SECS", default_value_t = 10)]
    pub request_timeout_secs: u64,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], DEFAULT_WEBHOOK_PORT))
}

impl Cli {
    /// Default logical cluster
    pub fn default_cluster(&self) -> LogicalCluster {
        LogicalCluster::new(self.default_cluster.clone())
    }

    /// Default per-request deadline
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Listener configuration
    pub fn serve_config(&self) -> ServeConfig {
        ServeConfig {
            addr: self.listen_addr,
            tls: self.tls_cert.clone().zip(self.tls_key.clone()),
        }
    }
}
