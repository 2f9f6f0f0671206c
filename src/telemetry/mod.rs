//! Tracing and OpenTelemetry setup.
//!
//! With an OTLP endpoint, spans, metrics and log records go to the
//! collector and a compact stderr layer stays on. Without one, only the
//! stderr fmt layer is installed.

pub mod element;
pub mod metrics;

use crate::error::{Error, Result};

/// Configuration for telemetry initialization.
pub struct TelemetryConfig {
    /// OTLP gRPC endpoint such as "http://localhost:4317".
    pub endpoint: Option<String>,
    /// Reported as `service.name`.
    pub service_name: String,
    /// Fallback filter directive when `RUST_LOG` is unset.
    pub log_level: String,
}

impl TelemetryConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            endpoint: None,
            service_name: service_name.into(),
            log_level: "info".to_string(),
        }
    }
}

/// Keeps the OTel providers alive. Dropping it flushes and shuts them down.
pub struct TelemetryGuard {
    pipelines: Option<Pipelines>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(pipelines) = self.pipelines.take() {
            let _ = pipelines.logs.shutdown();
            let _ = pipelines.metrics.shutdown();
            let _ = pipelines.traces.shutdown();
        }
    }
}

/// The three OTLP export pipelines sharing one resource.
struct Pipelines {
    traces: opentelemetry_sdk::trace::SdkTracerProvider,
    metrics: opentelemetry_sdk::metrics::SdkMeterProvider,
    logs: opentelemetry_sdk::logs::SdkLoggerProvider,
}

impl Pipelines {
    fn export_to(endpoint: &str, service_name: String) -> Result<Self> {
        use opentelemetry_otlp::WithExportConfig as _;

        let resource = opentelemetry_sdk::Resource::builder()
            .with_service_name(service_name)
            .build();

        let spans = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()
            .map_err(|e| exporter_error("span", e))?;
        let metrics = opentelemetry_otlp::MetricExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()
            .map_err(|e| exporter_error("metric", e))?;
        let logs = opentelemetry_otlp::LogExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()
            .map_err(|e| exporter_error("log", e))?;

        Ok(Self {
            traces: opentelemetry_sdk::trace::SdkTracerProvider::builder()
                .with_batch_exporter(spans)
                .with_resource(resource.clone())
                .build(),
            metrics: opentelemetry_sdk::metrics::SdkMeterProvider::builder()
                .with_periodic_exporter(metrics)
                .with_resource(resource.clone())
                .build(),
            logs: opentelemetry_sdk::logs::SdkLoggerProvider::builder()
                .with_batch_exporter(logs)
                .with_resource(resource)
                .build(),
        })
    }
}

fn exporter_error(signal: &str, err: impl std::fmt::Display) -> Error {
    Error::Other(format!("failed to create OTLP {signal} exporter: {err}"))
}

/// Install the global subscriber: a compact stderr layer always, plus span
/// and log export when `config.endpoint` is set. Queue metrics go to the
/// global meter provider, which stays a no-op without an endpoint.
///
/// # Errors
///
/// Fails on an unparseable log level, when an exporter cannot be built, or
/// when a global subscriber is already installed.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard> {
    use opentelemetry::trace::TracerProvider as _;
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::layer::SubscriberExt as _;
    use tracing_subscriber::util::SubscriberInitExt as _;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| Error::Config(format!("invalid log level {:?}: {e}", config.log_level)))?;

    let pipelines = config
        .endpoint
        .as_deref()
        .map(|endpoint| Pipelines::export_to(endpoint, config.service_name.clone()))
        .transpose()?;

    let trace_layer = pipelines.as_ref().map(|p| {
        tracing_opentelemetry::layer().with_tracer(p.traces.tracer("workqueue"))
    });
    let log_layer = pipelines.as_ref().map(|p| {
        opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge::new(&p.logs)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(std::io::stderr),
        )
        .with(trace_layer)
        .with(log_layer)
        .try_init()
        .map_err(|e| Error::Other(format!("failed to init tracing subscriber: {e}")))?;

    if let Some(p) = &pipelines {
        opentelemetry::global::set_meter_provider(p.metrics.clone());
    }

    Ok(TelemetryGuard { pipelines })
}
