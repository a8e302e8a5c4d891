//! Telemetry export to the collector.
//!
//! # Data Flow
//! ```text
//! SDK BatchSpanProcessor ─→ ReportingSpanExporter   ─┐
//!                                                    ├→ opentelemetry-otlp (HTTP/JSON) → collector
//! SDK PeriodicReader     ─→ ReportingMetricExporter ─┘
//! ```
//!
//! # Design Decisions
//! - Batching, aggregation and encoding belong to `opentelemetry_sdk` and
//!   `opentelemetry-otlp`; this module only wraps their exporters
//! - One attempt per batch; failures are counted, reported once at WARN
//!   through the logging path, then dropped
//! - Any `SpanExporter` / `PushMetricsExporter` can be injected in place of
//!   the OTLP ones, e.g. the SDK's in-memory exporters in tests

pub mod otlp;
pub mod reporting;

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use opentelemetry::KeyValue;
use opentelemetry_sdk::export::trace::{ExportResult, SpanData, SpanExporter};
use opentelemetry_sdk::metrics::data::ResourceMetrics;
use opentelemetry_sdk::metrics::exporter::PushMetricExporter as PushMetricsExporter;
use opentelemetry_sdk::metrics::{MetricResult, Temporality};
use opentelemetry_sdk::Resource;
use serde::Serialize;

use crate::config::TelemetryConfig;

pub use reporting::{ReportingMetricExporter, ReportingSpanExporter};

/// Resource attributes attached to every span and metric batch.
pub fn resource(config: &TelemetryConfig) -> Resource {
    Resource::new([
        KeyValue::new("service.name", config.service_name.clone()),
        KeyValue::new("service.version", config.version.clone()),
        KeyValue::new("deployment.environment", config.environment.clone()),
    ])
}

/// Accepts and forgets everything. Stands in for a signal that has no
/// injected exporter.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Discard;

impl SpanExporter for Discard {
    fn export(&mut self, _batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        Box::pin(std::future::ready(Ok(())))
    }
}

#[async_trait]
impl PushMetricsExporter for Discard {
    async fn export(&self, _metrics: &mut ResourceMetrics) -> MetricResult<()> {
        Ok(())
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

/// Counters shared by the span pipeline and the exporters.
#[derive(Debug, Default)]
pub(crate) struct ExportStats {
    spans_exported: AtomicU64,
    spans_dropped: AtomicU64,
    export_failures: AtomicU64,
    /// Ended spans handed to the batch processor and not yet settled.
    pending: AtomicUsize,
    shut_down: AtomicBool,
}

impl ExportStats {
    /// Reserve a queue slot; false when `limit` spans are already pending.
    pub(crate) fn try_enqueue(&self, limit: usize) -> bool {
        self.pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < limit).then_some(n + 1))
            .is_ok()
    }

    /// Free the slots of a settled batch.
    pub(crate) fn release(&self, count: usize) {
        let _ = self
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| Some(n.saturating_sub(count)));
    }

    pub(crate) fn record_exported(&self, count: usize) {
        self.spans_exported.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self, count: usize) {
        self.spans_dropped.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.export_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn mark_shut_down(&self) {
        self.shut_down.store(true, Ordering::Release);
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    pub(crate) fn snapshot(&self) -> TelemetryStats {
        TelemetryStats {
            spans_exported: self.spans_exported.load(Ordering::Relaxed),
            spans_dropped: self.spans_dropped.load(Ordering::Relaxed),
            export_failures: self.export_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the export pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TelemetryStats {
    /// Spans accepted by the exporter.
    pub spans_exported: u64,
    /// Spans discarded because the queue was full, the pipeline was shut
    /// down, or their batch failed.
    pub spans_dropped: u64,
    /// Failed span or metric export attempts.
    pub export_failures: u64,
}
