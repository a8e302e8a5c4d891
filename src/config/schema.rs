//! Configuration schema definitions.
//!
//! This module defines the complete startup configuration of the telemetry client.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::logging::Level;

/// Root configuration for a service's telemetry client.
///
/// Created once at process start and never mutated; shared read-only via `Arc`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    /// Service name reported on every log record, span and metric.
    pub service_name: String,

    /// Service version (e.g., "1.0.0").
    pub version: String,

    /// Deployment environment (e.g., "dev", "staging", "production").
    pub environment: String,

    /// Address of the remote OTLP collector (e.g., "alloy.monitoring:4318").
    ///
    /// Absent or empty disables metrics and tracing; logging keeps working.
    #[serde(default)]
    pub collector_endpoint: Option<String>,

    /// Minimum level written to the log sink.
    #[serde(default)]
    pub log_level: Level,

    /// Export pipeline tuning.
    #[serde(default)]
    pub export: ExportConfig,
}

impl TelemetryConfig {
    /// Create a configuration with the three required identity fields.
    pub fn new(
        service_name: impl Into<String>,
        version: impl Into<String>,
        environment: impl Into<String>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            version: version.into(),
            environment: environment.into(),
            collector_endpoint: None,
            log_level: Level::default(),
            export: ExportConfig::default(),
        }
    }

    /// Set the collector endpoint.
    pub fn with_collector_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.collector_endpoint = Some(endpoint.into());
        self
    }

    /// Set the minimum log level.
    pub fn with_log_level(mut self, level: Level) -> Self {
        self.log_level = level;
        self
    }

    /// Replace the export tuning.
    pub fn with_export(mut self, export: ExportConfig) -> Self {
        self.export = export;
        self
    }

    /// The configured collector endpoint, treating blank strings as absent.
    pub fn collector_endpoint(&self) -> Option<&str> {
        self.collector_endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
    }
}

/// Export pipeline configuration.
///
/// Defaults follow the usual OTLP SDK batch settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Maximum finished spans waiting for export; further spans are dropped.
    pub max_queue_size: usize,

    /// Maximum spans sent in a single export request.
    pub max_export_batch_size: usize,

    /// Delay between scheduled span flushes in milliseconds.
    pub scheduled_delay_ms: u64,

    /// Interval between metric exports in milliseconds.
    pub metric_interval_ms: u64,

    /// Timeout for a single export request in milliseconds.
    pub export_timeout_ms: u64,

    /// Timeout for the startup reachability check in milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 2048,
            max_export_batch_size: 512,
            scheduled_delay_ms: 5_000,
            metric_interval_ms: 60_000,
            export_timeout_ms: 10_000,
            connect_timeout_ms: 2_000,
        }
    }
}
