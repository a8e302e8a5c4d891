//! OTLP/HTTP exporters for a wired collector.

use std::time::Duration;

use opentelemetry_otlp::{MetricExporter, Protocol, SpanExporter, WithExportConfig, WithHttpConfig};

use crate::config::ExportConfig;
use crate::degrade::{CollectorEndpoint, WiringError};

/// One client per signal: the span and metric pipelines run on different
/// runtimes and must not share a connection pool.
fn http_client(config: &ExportConfig) -> Result<reqwest::Client, WiringError> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
        .timeout(Duration::from_millis(config.export_timeout_ms))
        .build()
        .map_err(WiringError::Client)
}

/// Span exporter posting JSON to `<endpoint>/v1/traces`.
pub fn span_exporter(
    endpoint: &CollectorEndpoint,
    config: &ExportConfig,
) -> Result<SpanExporter, WiringError> {
    SpanExporter::builder()
        .with_http()
        .with_http_client(http_client(config)?)
        .with_protocol(Protocol::HttpJson)
        .with_endpoint(endpoint.traces_url().to_string())
        .with_timeout(Duration::from_millis(config.export_timeout_ms))
        .build()
        .map_err(|e| WiringError::Exporter(e.to_string()))
}

/// Metric exporter posting JSON to `<endpoint>/v1/metrics`.
pub fn metric_exporter(
    endpoint: &CollectorEndpoint,
    config: &ExportConfig,
) -> Result<MetricExporter, WiringError> {
    MetricExporter::builder()
        .with_http()
        .with_http_client(http_client(config)?)
        .with_protocol(Protocol::HttpJson)
        .with_endpoint(endpoint.metrics_url().to_string())
        .with_timeout(Duration::from_millis(config.export_timeout_ms))
        .build()
        .map_err(|e| WiringError::Exporter(e.to_string()))
}
