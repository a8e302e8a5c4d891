//! Exporter wrappers that report outcomes through the logging path.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use opentelemetry_sdk::export::trace::{ExportResult, SpanData, SpanExporter};
use opentelemetry_sdk::metrics::data::ResourceMetrics;
use opentelemetry_sdk::metrics::exporter::PushMetricExporter as PushMetricsExporter;
use opentelemetry_sdk::metrics::{MetricResult, Temporality};
use opentelemetry_sdk::Resource;

use crate::export::ExportStats;
use crate::fields;
use crate::logging::Emitter;

#[derive(Debug, Clone)]
struct Reporter {
    emitter: Emitter,
    stats: Arc<ExportStats>,
}

impl Reporter {
    fn span_failure(&self, count: usize, error: String) {
        self.stats.record_failure();
        self.stats.record_dropped(count);
        self.emitter.warn(
            "Failed to export spans",
            fields! { "error" => error, "count" => count },
        );
    }
}

/// Settles one span batch exactly once, even if the SDK abandons the export
/// future on timeout.
struct InFlight {
    reporter: Reporter,
    count: usize,
    settled: bool,
}

impl InFlight {
    fn settle(mut self, result: &ExportResult) {
        self.settled = true;
        match result {
            Ok(()) => {
                self.reporter.stats.record_exported(self.count);
                tracing::debug!(count = self.count, "exported span batch");
            }
            Err(e) => self.reporter.span_failure(self.count, e.to_string()),
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if !self.settled {
            self.reporter
                .span_failure(self.count, "export abandoned before completion".to_string());
        }
        self.reporter.stats.release(self.count);
    }
}

/// Wraps a span exporter: counts exported and dropped spans, logs failures.
#[derive(Debug)]
pub struct ReportingSpanExporter {
    inner: Box<dyn SpanExporter>,
    reporter: Reporter,
}

impl ReportingSpanExporter {
    pub(crate) fn new(inner: Box<dyn SpanExporter>, emitter: Emitter, stats: Arc<ExportStats>) -> Self {
        Self {
            inner,
            reporter: Reporter { emitter, stats },
        }
    }
}

impl SpanExporter for ReportingSpanExporter {
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        let in_flight = InFlight {
            reporter: self.reporter.clone(),
            count: batch.len(),
            settled: false,
        };
        let export = self.inner.export(batch);
        Box::pin(async move {
            let result = export.await;
            in_flight.settle(&result);
            result
        })
    }

    fn shutdown(&mut self) {
        self.inner.shutdown();
    }

    fn force_flush(&mut self) -> BoxFuture<'static, ExportResult> {
        self.inner.force_flush()
    }

    fn set_resource(&mut self, resource: &Resource) {
        self.inner.set_resource(resource);
    }
}

/// Wraps a metric exporter: logs and counts failed exports.
pub struct ReportingMetricExporter {
    inner: Box<dyn PushMetricsExporter>,
    reporter: Reporter,
}

impl ReportingMetricExporter {
    pub(crate) fn new(
        inner: Box<dyn PushMetricsExporter>,
        emitter: Emitter,
        stats: Arc<ExportStats>,
    ) -> Self {
        Self {
            inner,
            reporter: Reporter { emitter, stats },
        }
    }
}

#[async_trait]
impl PushMetricsExporter for ReportingMetricExporter {
    async fn export(&self, metrics: &mut ResourceMetrics) -> MetricResult<()> {
        let count: usize = metrics.scope_metrics.iter().map(|s| s.metrics.len()).sum();
        let result = self.inner.export(metrics).await;
        match &result {
            Ok(()) => tracing::debug!(count, "exported metrics"),
            Err(e) => {
                self.reporter.stats.record_failure();
                self.reporter.emitter.warn(
                    "Failed to export metrics",
                    fields! { "error" => e.to_string(), "count" => count },
                );
            }
        }
        result
    }

    async fn force_flush(&self) -> MetricResult<()> {
        self.inner.force_flush().await
    }

    fn shutdown(&self) -> MetricResult<()> {
        self.inner.shutdown()
    }

    fn temporality(&self) -> Temporality {
        self.inner.temporality()
    }
}
