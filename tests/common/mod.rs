//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    extract::State,
    http::{StatusCode, Uri},
    routing::post,
    Json, Router,
};
use futures_util::future::BoxFuture;
use opentelemetry::trace::TraceError;
use opentelemetry::KeyValue;
use opentelemetry_sdk::export::trace::{ExportResult, SpanData, SpanExporter};
use opentelemetry_sdk::metrics::data::{Histogram, ResourceMetrics, Sum};
use opentelemetry_sdk::metrics::exporter::PushMetricExporter as PushMetricsExporter;
use opentelemetry_sdk::metrics::{MetricError, MetricResult, Temporality};
use opentelemetry_sdk::testing::metrics::InMemoryMetricExporter;
use serde_json::Value;
use tokio::net::TcpListener;

use service_telemetry::logging::MemorySink;
use service_telemetry::metrics::{REQUESTS_TOTAL, REQUEST_DURATION};
use service_telemetry::{Logger, TelemetryConfig};

#[derive(Clone)]
struct CollectorState {
    received: Arc<Mutex<Vec<(String, Value)>>>,
    status: Arc<AtomicU16>,
}

/// A minimal OTLP/HTTP collector that records every accepted payload.
pub struct MockCollector {
    pub addr: SocketAddr,
    state: CollectorState,
}

impl MockCollector {
    /// Start a collector on an ephemeral local port.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = CollectorState {
            received: Arc::new(Mutex::new(Vec::new())),
            status: Arc::new(AtomicU16::new(200)),
        };

        let app = Router::new()
            .route("/v1/traces", post(receive))
            .route("/v1/metrics", post(receive))
            .with_state(state.clone());

        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, state }
    }

    /// Endpoint in the `host:port` form deployments use.
    pub fn endpoint(&self) -> String {
        self.addr.to_string()
    }

    /// Status returned for subsequent requests.
    pub fn set_status(&self, status: u16) {
        self.state.status.store(status, Ordering::SeqCst);
    }

    /// Accepted payloads posted to `path`.
    pub fn payloads(&self, path: &str) -> Vec<Value> {
        self.state
            .received
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p == path)
            .map(|(_, body)| body.clone())
            .collect()
    }

    /// Every span received so far, across payloads.
    pub fn spans(&self) -> Vec<Value> {
        self.payloads("/v1/traces")
            .iter()
            .flat_map(|p| array(&p["resourceSpans"]))
            .flat_map(|rs| array(&rs["scopeSpans"]))
            .flat_map(|ss| array(&ss["spans"]))
            .collect()
    }

    /// The most recent export of the named metric.
    pub fn last_metric(&self, name: &str) -> Option<Value> {
        self.payloads("/v1/metrics")
            .iter()
            .flat_map(|p| array(&p["resourceMetrics"]))
            .flat_map(|rm| array(&rm["scopeMetrics"]))
            .flat_map(|sm| array(&sm["metrics"]))
            .filter(|m| m["name"] == name)
            .last()
    }
}

async fn receive(
    State(state): State<CollectorState>,
    uri: Uri,
    Json(body): Json<Value>,
) -> StatusCode {
    let status = StatusCode::from_u16(state.status.load(Ordering::SeqCst)).unwrap_or(StatusCode::OK);
    if status.is_success() {
        state
            .received
            .lock()
            .unwrap()
            .push((uri.path().to_string(), body));
    }
    status
}

fn array(value: &Value) -> Vec<Value> {
    value.as_array().cloned().unwrap_or_default()
}

/// Value of an OTLP JSON attribute, whatever its `*Value` wrapper.
pub fn attribute(attributes: &Value, key: &str) -> Option<String> {
    let kv = attributes.as_array()?.iter().find(|kv| kv["key"] == key)?;
    leaf(&kv["value"])
}

fn leaf(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Object(map) => map.values().next().and_then(leaf),
        _ => None,
    }
}

/// OTLP JSON encodes 64-bit integers as strings or numbers.
pub fn json_u64(value: &Value) -> Option<u64> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

/// The data points of an OTLP JSON metric, whatever its aggregation.
pub fn data_points(metric: &Value) -> Vec<Value> {
    metric
        .as_object()
        .into_iter()
        .flat_map(|m| m.values())
        .find_map(|v| v.get("dataPoints"))
        .map(array)
        .unwrap_or_default()
}

/// Span exporter that keeps what it receives and can be told to fail or stall.
///
/// Unlike the SDK's in-memory exporter it keeps spans across shutdown.
#[derive(Debug, Clone, Default)]
pub struct RecordingExporter {
    spans: Arc<Mutex<Vec<SpanData>>>,
    failing: Arc<AtomicBool>,
    stall: Arc<Mutex<Option<Duration>>>,
}

impl RecordingExporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Hold every export for `delay` before completing it.
    pub fn set_stall(&self, delay: Duration) {
        *self.stall.lock().unwrap() = Some(delay);
    }

    pub fn finished_spans(&self) -> Vec<SpanData> {
        self.spans.lock().unwrap().clone()
    }

    pub fn span_names(&self) -> Vec<String> {
        self.finished_spans()
            .into_iter()
            .map(|s| s.name.to_string())
            .collect()
    }
}

impl SpanExporter for RecordingExporter {
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        let failing = self.failing.load(Ordering::SeqCst);
        let stall = *self.stall.lock().unwrap();
        let spans = self.spans.clone();
        Box::pin(async move {
            if let Some(delay) = stall {
                tokio::time::sleep(delay).await;
            }
            if failing {
                return Err(TraceError::from("collector unavailable"));
            }
            spans.lock().unwrap().extend(batch);
            Ok(())
        })
    }
}

/// Metric exporter that rejects every export.
#[derive(Debug, Clone, Copy)]
pub struct RejectingMetrics;

#[async_trait]
impl PushMetricsExporter for RejectingMetrics {
    async fn export(&self, _metrics: &mut ResourceMetrics) -> MetricResult<()> {
        Err(MetricError::Other("collector unavailable".to_string()))
    }

    async fn force_flush(&self) -> MetricResult<()> {
        Ok(())
    }

    fn shutdown(&self) -> MetricResult<()> {
        Ok(())
    }

    fn temporality(&self) -> Temporality {
        Temporality::Cumulative
    }
}

/// A local `host:port` with nothing listening on it.
pub fn unused_endpoint() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr.to_string()
}

pub fn gateway_config() -> TelemetryConfig {
    TelemetryConfig::new("gateway", "1.0.0", "dev")
}

/// An Enabled logger that records logs, spans and metrics in memory.
pub struct Harness {
    pub logger: Logger,
    pub sink: MemorySink,
    pub spans: RecordingExporter,
    pub metrics: InMemoryMetricExporter,
}

impl Harness {
    pub async fn start() -> Self {
        Self::with_config(gateway_config()).await
    }

    pub async fn with_config(config: TelemetryConfig) -> Self {
        let sink = MemorySink::new();
        let spans = RecordingExporter::new();
        let metrics = InMemoryMetricExporter::default();
        let logger = Logger::builder(config)
            .sink(sink.clone())
            .span_exporter(spans.clone())
            .metric_exporter(metrics.clone())
            .build()
            .await;
        Self {
            logger,
            sink,
            spans,
            metrics,
        }
    }

    /// Cumulative request count exported for (endpoint, status_code).
    pub fn request_count(&self, endpoint: &str, status_code: u16) -> u64 {
        let status = KeyValue::new("status_code", status_code.to_string());
        let endpoint = KeyValue::new("endpoint", endpoint.to_string());
        self.exported(REQUESTS_TOTAL, |data| {
            let sum = data.downcast_ref::<Sum<u64>>()?;
            sum.data_points
                .iter()
                .find(|p| p.attributes.contains(&status) && p.attributes.contains(&endpoint))
                .map(|p| p.value)
        })
    }

    /// Cumulative number of durations exported for `endpoint`.
    pub fn duration_count(&self, endpoint: &str) -> u64 {
        let endpoint = KeyValue::new("endpoint", endpoint.to_string());
        self.exported(REQUEST_DURATION, |data| {
            let histogram = data.downcast_ref::<Histogram<f64>>()?;
            histogram
                .data_points
                .iter()
                .find(|p| p.attributes.contains(&endpoint))
                .map(|p| p.count)
        })
    }

    fn exported(
        &self,
        name: &str,
        read: impl Fn(&dyn std::any::Any) -> Option<u64>,
    ) -> u64 {
        let exports = self.metrics.get_finished_metrics().unwrap_or_default();
        exports
            .iter()
            .rev()
            .flat_map(|rm| rm.scope_metrics.iter())
            .flat_map(|sm| sm.metrics.iter())
            .filter(|m| m.name == name)
            .find_map(|m| read(m.data.as_any()))
            .unwrap_or(0)
    }
}

/// Find the first record with the given message.
pub fn record_with_message(sink: &MemorySink, message: &str) -> Option<Value> {
    sink.records()
        .into_iter()
        .find(|r| r["message"] == message)
}
