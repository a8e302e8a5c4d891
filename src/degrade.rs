//! Collector wiring and the enabled/disabled gate.
//!
//! # State Machine
//! ```text
//! Uninitialized ──(no endpoint | unreachable)──▶ Disabled   (permanent)
//!       │
//!       └──────────(reachable)─────────────────▶ Enabled    (permanent)
//! ```
//!
//! # Design Decisions
//! - Wiring is attempted exactly once, at construction; there is no reconnect loop
//! - Runtime export failures never move Enabled back to Disabled; the affected
//!   batch is dropped and reported at WARN
//! - The gate is a single `Option<Backend>` in the logger, checked at the top of
//!   each operation

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::{lookup_host, TcpStream};
use url::{Host, Url};

use opentelemetry_sdk::export::trace::SpanExporter;
use opentelemetry_sdk::metrics::exporter::PushMetricExporter as PushMetricsExporter;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::TracerProvider;

use crate::config::TelemetryConfig;
use crate::export::{otlp, ExportStats, ReportingMetricExporter, ReportingSpanExporter};
use crate::logging::Emitter;
use crate::metrics::{self, RequestInstruments};
use crate::trace::{self, Tracer};

/// Errors that keep the collector from being wired at startup.
#[derive(Debug, Error)]
pub enum WiringError {
    #[error("no collector endpoint configured")]
    MissingEndpoint,

    #[error("invalid collector endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("cannot resolve collector host '{host}': {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot connect to collector at {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("collector at {address} did not accept a connection within {timeout_ms} ms")]
    Timeout { address: String, timeout_ms: u64 },

    #[error("cannot build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("cannot build OTLP exporter: {0}")]
    Exporter(String),
}

/// Whether metrics and tracing do real work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryState {
    Disabled,
    Enabled,
}

impl fmt::Display for TelemetryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryState::Disabled => f.write_str("disabled"),
            TelemetryState::Enabled => f.write_str("enabled"),
        }
    }
}

/// A parsed collector address.
///
/// Accepts `host:port` (plain HTTP) or a full `http(s)://` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorEndpoint {
    base: Url,
    host: String,
    port: u16,
}

impl CollectorEndpoint {
    pub fn parse(raw: &str) -> Result<Self, WiringError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(WiringError::MissingEndpoint);
        }
        let invalid = |reason: String| WiringError::InvalidEndpoint {
            endpoint: raw.to_string(),
            reason,
        };

        let text = if raw.contains("://") {
            raw.to_string()
        } else {
            format!("http://{}", raw)
        };
        let base = Url::parse(&text).map_err(|e| invalid(e.to_string()))?;

        if !matches!(base.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme '{}'", base.scheme())));
        }
        let host = match base.host() {
            Some(Host::Domain(d)) => d.to_string(),
            Some(Host::Ipv4(a)) => a.to_string(),
            Some(Host::Ipv6(a)) => a.to_string(),
            None => return Err(invalid("missing host".to_string())),
        };
        let port = base
            .port_or_known_default()
            .ok_or_else(|| invalid("missing port".to_string()))?;

        Ok(Self { base, host, port })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn traces_url(&self) -> Url {
        self.signal_url("v1/traces")
    }

    pub fn metrics_url(&self) -> Url {
        self.signal_url("v1/metrics")
    }

    fn signal_url(&self, suffix: &str) -> Url {
        let mut url = self.base.clone();
        let path = format!("{}/{}", self.base.path().trim_end_matches('/'), suffix);
        url.set_path(&path);
        url
    }

    /// Resolve the host and open (then drop) a TCP connection.
    pub async fn check_reachable(&self, timeout: Duration) -> Result<(), WiringError> {
        let address = format!("{}:{}", self.host, self.port);
        let attempt = async {
            let mut addrs = lookup_host((self.host.as_str(), self.port))
                .await
                .map_err(|source| WiringError::Resolve {
                    host: self.host.clone(),
                    source,
                })?;
            let addr = addrs.next().ok_or_else(|| WiringError::Resolve {
                host: self.host.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses"),
            })?;
            TcpStream::connect(addr)
                .await
                .map_err(|source| WiringError::Connect {
                    address: address.clone(),
                    source,
                })?;
            Ok::<(), WiringError>(())
        };

        match tokio::time::timeout(timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(WiringError::Timeout {
                address: address.clone(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }
}

/// Parse, check and build the OTLP exporters for `config`.
pub(crate) async fn wire(
    config: &TelemetryConfig,
) -> Result<(Box<dyn SpanExporter>, Box<dyn PushMetricsExporter>), WiringError> {
    let raw = config
        .collector_endpoint()
        .ok_or(WiringError::MissingEndpoint)?;
    let endpoint = CollectorEndpoint::parse(raw)?;
    endpoint
        .check_reachable(Duration::from_millis(config.export.connect_timeout_ms))
        .await?;

    let spans = otlp::span_exporter(&endpoint, &config.export)?;
    let metrics = otlp::metric_exporter(&endpoint, &config.export)?;
    tracing::debug!(
        traces = %endpoint.traces_url(),
        metrics = %endpoint.metrics_url(),
        "collector wired"
    );
    Ok((Box::new(spans), Box::new(metrics)))
}

/// Everything that only exists in the Enabled state.
pub(crate) struct Backend {
    pub(crate) tracer: Tracer,
    pub(crate) instruments: RequestInstruments,
    pub(crate) stats: Arc<ExportStats>,
    tracer_provider: TracerProvider,
    meter_provider: SdkMeterProvider,
}

impl Backend {
    /// Create the providers and instruments; the SDK starts the export tasks.
    pub(crate) fn start(
        config: &TelemetryConfig,
        spans: Box<dyn SpanExporter>,
        metrics: Box<dyn PushMetricsExporter>,
        emitter: Emitter,
    ) -> Self {
        let stats = Arc::new(ExportStats::default());
        let spans = ReportingSpanExporter::new(spans, emitter.clone(), stats.clone());
        let metrics = ReportingMetricExporter::new(metrics, emitter, stats.clone());

        let (tracer_provider, tracer) = trace::pipeline(config, spans, stats.clone());
        let (meter_provider, instruments) = metrics::pipeline(config, metrics);

        Self {
            tracer,
            instruments,
            stats,
            tracer_provider,
            meter_provider,
        }
    }

    /// Export queued spans and a metric snapshot.
    ///
    /// The SDK calls block on the export workers, so they run off the
    /// async executor.
    pub(crate) async fn flush(&self) {
        if self.stats.is_shut_down() {
            return;
        }
        let tracer_provider = self.tracer_provider.clone();
        let meter_provider = self.meter_provider.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            let spans = tracer_provider.force_flush();
            let metrics = meter_provider.force_flush();
            (spans, metrics)
        })
        .await;

        match outcome {
            Ok((spans, metrics)) => {
                for err in spans.into_iter().filter_map(Result::err) {
                    tracing::debug!(error = %err, "span flush incomplete");
                }
                if let Err(err) = metrics {
                    tracing::debug!(error = %err, "metric flush incomplete");
                }
            }
            Err(err) => tracing::warn!(error = %err, "flush task failed"),
        }
    }

    /// Drain everything queued, then stop both pipelines. Idempotent.
    pub(crate) async fn shutdown(&self) {
        if self.stats.is_shut_down() {
            return;
        }
        self.stats.mark_shut_down();

        let tracer_provider = self.tracer_provider.clone();
        let meter_provider = self.meter_provider.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            let spans = tracer_provider.shutdown();
            let metrics = meter_provider.shutdown();
            (spans, metrics)
        })
        .await;

        match outcome {
            Ok((spans, metrics)) => {
                if let Err(err) = spans {
                    tracing::debug!(error = %err, "span pipeline shutdown");
                }
                if let Err(err) = metrics {
                    tracing::debug!(error = %err, "metric pipeline shutdown");
                }
            }
            Err(err) => tracing::warn!(error = %err, "shutdown task failed"),
        }
    }
}
