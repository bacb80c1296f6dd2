//! Logging, tracing and metrics bootstrap
//!
//! Logs are always JSON on stdout. When an OTLP endpoint is configured, spans
//! and the counters in [`crate::metrics`] are exported too, tagged with the
//! admission plugin and the default logical cluster the process serves.

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::TracerProvider;
use opentelemetry_sdk::{runtime, Resource};
use opentelemetry_semantic_conventions::resource::{SERVICE_NAME, SERVICE_VERSION};
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::LogicalCluster;

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "info,tenancy=debug,kube=info,tower=warn,hyper=warn";

/// Resource attribute naming the logical cluster used when a request carries none
pub const DEFAULT_CLUSTER_ATTRIBUTE: &str = "tenancy.logical_cluster.default";

/// Resource attribute naming the admission plugin served by this process
pub const PLUGIN_ATTRIBUTE: &str = "tenancy.admission.plugin";

/// Errors that can occur during telemetry initialization
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Failed to initialize OpenTelemetry tracer
    #[error("failed to initialize tracer: {0}")]
    TracerInit(String),

    /// Failed to initialize OTLP metrics exporter
    #[error("failed to initialize metrics exporter: {0}")]
    MetricsInit(String),

    /// Failed to initialize tracing subscriber
    #[error("failed to initialize tracing subscriber: {0}")]
    SubscriberInit(String),
}

/// What the process reports about itself
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// `service.name` of traces and metrics
    pub service_name: String,

    /// OTLP gRPC endpoint, e.g. `http://otel-collector:4317`; logs only when unset
    pub otlp_endpoint: Option<String>,

    /// Admission plugin this process serves, if any
    pub plugin: Option<String>,

    /// Logical cluster assumed for requests that name none
    pub default_cluster: LogicalCluster,
}

impl TelemetryConfig {
    /// Config for `service_name`, exporting to `OTEL_EXPORTER_OTLP_ENDPOINT` if set
    pub fn for_service(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    /// Tag exported telemetry with the admission plugin name
    pub fn with_plugin(mut self, plugin: impl Into<String>) -> Self {
        self.plugin = Some(plugin.into());
        self
    }

    /// Tag exported telemetry with the default logical cluster
    pub fn with_default_cluster(mut self, cluster: LogicalCluster) -> Self {
        self.default_cluster = cluster;
        self
    }

    fn resource_attributes(&self) -> Vec<KeyValue> {
        let mut attributes = vec![
            KeyValue::new(SERVICE_NAME, self.service_name.clone()),
            KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
            KeyValue::new(DEFAULT_CLUSTER_ATTRIBUTE, self.default_cluster.to_string()),
        ];
        if let Some(plugin) = &self.plugin {
            attributes.push(KeyValue::new(PLUGIN_ATTRIBUTE, plugin.clone()));
        }

        // Downward API
        for (var, key) in [
            ("POD_NAME", "k8s.pod.name"),
            ("POD_NAMESPACE", "k8s.namespace.name"),
        ] {
            if let Ok(value) = std::env::var(var) {
                attributes.push(KeyValue::new(key, value));
            }
        }
        attributes
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "tenancy".to_string(),
            otlp_endpoint: std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok(),
            plugin: None,
            default_cluster: LogicalCluster::default(),
        }
    }
}

/// Keeps OTLP exporters alive; [`TelemetryGuard::shutdown`] flushes them
#[must_use = "dropping the guard without shutdown loses buffered spans and metrics"]
#[derive(Debug, Default)]
pub struct TelemetryGuard {
    tracer: Option<TracerProvider>,
    meter: Option<SdkMeterProvider>,
}

impl TelemetryGuard {
    /// Whether spans and metrics are being exported
    pub fn is_exporting(&self) -> bool {
        self.tracer.is_some() || self.meter.is_some()
    }

    /// Flush and stop the exporters
    pub fn shutdown(self) {
        if let Some(tracer) = self.tracer {
            if let Err(e) = tracer.shutdown() {
                eprintln!("failed to flush traces: {e}");
            }
        }
        if let Some(meter) = self.meter {
            if let Err(e) = meter.shutdown() {
                eprintln!("failed to flush metrics: {e}");
            }
        }
    }
}

/// Install the global subscriber, propagator and, if configured, OTLP exporters
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    global::set_text_map_propagator(TraceContextPropagator::new());

    let mut guard = TelemetryGuard::default();
    let otel_layer = match &config.otlp_endpoint {
        Some(endpoint) => {
            let resource = Resource::new(config.resource_attributes());
            let meter = otlp_meter_provider(endpoint, resource.clone())?;
            global::set_meter_provider(meter.clone());
            let tracer = otlp_tracer_provider(endpoint, resource)?;
            global::set_tracer_provider(tracer.clone());

            let layer = tracing_opentelemetry::layer()
                .with_tracer(tracer.tracer(config.service_name.clone()));
            guard = TelemetryGuard {
                tracer: Some(tracer),
                meter: Some(meter),
            };
            Some(layer)
        }
        None => None,
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(false)
        .with_target(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(otel_layer)
        .try_init()
        .map_err(|e| TelemetryError::SubscriberInit(e.to_string()))?;

    Ok(guard)
}

fn otlp_tracer_provider(
    endpoint: &str,
    resource: Resource,
) -> Result<TracerProvider, TelemetryError> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| TelemetryError::TracerInit(e.to_string()))?;

    Ok(TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_resource(resource)
        .build())
}

fn otlp_meter_provider(
    endpoint: &str,
    resource: Resource,
) -> Result<SdkMeterProvider, TelemetryError> {
    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    Ok(SdkMeterProvider::builder()
        .with_reader(PeriodicReader::builder(exporter, runtime::Tokio).build())
        .with_resource(resource)
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attribute(attributes: &[KeyValue], key: &str) -> Option<String> {
        attributes
            .iter()
            .find(|kv| kv.key.as_str() == key)
            .map(|kv| kv.value.to_string())
    }

    #[test]
    fn test_resource_carries_plugin_and_cluster() {
        let config = TelemetryConfig::for_service("tenancy-admission")
            .with_plugin("tenancy.dev/WorkspaceTypeExists")
            .with_default_cluster(LogicalCluster::new("root:org"));
        let attributes = config.resource_attributes();

        assert_eq!(
            attribute(&attributes, SERVICE_NAME).as_deref(),
            Some("tenancy-admission")
        );
        assert_eq!(
            attribute(&attributes, PLUGIN_ATTRIBUTE).as_deref(),
            Some("tenancy.dev/WorkspaceTypeExists")
        );
        assert_eq!(
            attribute(&attributes, DEFAULT_CLUSTER_ATTRIBUTE).as_deref(),
            Some("root:org")
        );
        assert!(attribute(&attributes, SERVICE_VERSION).is_some());
    }

    #[test]
    fn test_plugin_attribute_is_optional() {
        let attributes = TelemetryConfig::for_service("tenancy").resource_attributes();
        assert_eq!(attribute(&attributes, PLUGIN_ATTRIBUTE), None);
        assert_eq!(
            attribute(&attributes, DEFAULT_CLUSTER_ATTRIBUTE).as_deref(),
            Some("root")
        );
    }

    #[test]
    fn test_guard_without_exporters() {
        let guard = TelemetryGuard::default();
        assert!(!guard.is_exporting());
        guard.shutdown();
    }

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok());
    }
}
