//! Request metrics.
//!
//! # Responsibilities
//! - Define request metrics (counter and duration histogram)
//! - Periodically export cumulative snapshots to the collector
//!
//! # Metrics
//! - `http_requests_total` (counter): requests by endpoint, status_code, service
//! - `http_request_duration_seconds` (histogram): latency by endpoint, service
//!
//! # Design Decisions
//! - Aggregation is the SDK's; instruments are created once at startup and
//!   reused for the process lifetime
//! - Histogram buckets tuned for typical web latencies
//! - The periodic reader runs on its own current-thread runtime

use std::time::Duration;

use opentelemetry::metrics::{Counter, Histogram, Meter, MeterProvider as _};
use opentelemetry::KeyValue;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::runtime;

use crate::config::TelemetryConfig;
use crate::export::{self, ReportingMetricExporter};
use crate::trace::INSTRUMENTATION_SCOPE;

/// Name of the request counter.
pub const REQUESTS_TOTAL: &str = "http_requests_total";
/// Name of the request duration histogram.
pub const REQUEST_DURATION: &str = "http_request_duration_seconds";

/// Duration histogram bucket bounds, in seconds.
pub const DEFAULT_DURATION_BOUNDS: &[f64] =
    &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// The two request instruments.
#[derive(Clone)]
pub(crate) struct RequestInstruments {
    requests: Counter<u64>,
    durations: Histogram<f64>,
    service: String,
}

impl RequestInstruments {
    pub(crate) fn new(meter: &Meter, service: &str) -> Self {
        let requests = meter
            .u64_counter(REQUESTS_TOTAL)
            .with_description("HTTP requests")
            .build();
        let durations = meter
            .f64_histogram(REQUEST_DURATION)
            .with_description("Request duration in seconds")
            .with_unit("s")
            .with_boundaries(DEFAULT_DURATION_BOUNDS.to_vec())
            .build();
        Self {
            requests,
            durations,
            service: service.to_string(),
        }
    }

    pub(crate) fn count(&self, endpoint: &str, status_code: u16) {
        let mut labels = self.labels(endpoint);
        labels.push(KeyValue::new("status_code", status_code.to_string()));
        self.requests.add(1, &labels);
    }

    /// Negative and NaN inputs are ignored.
    pub(crate) fn record(&self, endpoint: &str, seconds: f64) {
        if seconds.is_nan() || seconds < 0.0 {
            return;
        }
        self.durations.record(seconds, &self.labels(endpoint));
    }

    fn labels(&self, endpoint: &str) -> Vec<KeyValue> {
        vec![
            KeyValue::new("endpoint", endpoint.to_string()),
            KeyValue::new("service", self.service.clone()),
        ]
    }
}

/// Build the meter provider and the request instruments on it.
pub(crate) fn pipeline(
    config: &TelemetryConfig,
    exporter: ReportingMetricExporter,
) -> (SdkMeterProvider, RequestInstruments) {
    let reader = PeriodicReader::builder(exporter, runtime::TokioCurrentThread)
        .with_interval(Duration::from_millis(config.export.metric_interval_ms))
        .with_timeout(Duration::from_millis(config.export.export_timeout_ms))
        .build();
    let provider = SdkMeterProvider::builder()
        .with_reader(reader)
        .with_resource(export::resource(config))
        .build();
    let meter = provider.meter(INSTRUMENTATION_SCOPE);
    let instruments = RequestInstruments::new(&meter, &config.service_name);
    (provider, instruments)
}
