//! Queue bound in front of the SDK batch processor.

use std::sync::Arc;

use opentelemetry::trace::TraceResult;
use opentelemetry::Context as OtelContext;
use opentelemetry_sdk::export::trace::SpanData;
use opentelemetry_sdk::trace::{Span, SpanProcessor};
use opentelemetry_sdk::Resource;

use crate::export::ExportStats;

/// Drops ended spans once `max_queue_size` of them await export.
///
/// The SDK batch processor discards overflow silently; this wrapper makes the
/// drop visible in [`TelemetryStats`](crate::export::TelemetryStats). Slots
/// are released when the exporter settles a batch.
#[derive(Debug)]
pub(crate) struct BoundedProcessor<P> {
    inner: P,
    max_queue_size: usize,
    stats: Arc<ExportStats>,
}

impl<P: SpanProcessor> BoundedProcessor<P> {
    pub(crate) fn new(inner: P, max_queue_size: usize, stats: Arc<ExportStats>) -> Self {
        Self {
            inner,
            max_queue_size,
            stats,
        }
    }
}

impl<P: SpanProcessor> SpanProcessor for BoundedProcessor<P> {
    fn on_start(&self, span: &mut Span, cx: &OtelContext) {
        self.inner.on_start(span, cx);
    }

    fn on_end(&self, span: SpanData) {
        // Spans ended after shutdown are counted by `SpanEnd`.
        if self.stats.is_shut_down() {
            return;
        }
        if !self.stats.try_enqueue(self.max_queue_size) {
            self.stats.record_dropped(1);
            tracing::trace!(span = %span.name, "span queue full, dropping span");
            return;
        }
        self.inner.on_end(span);
    }

    fn force_flush(&self) -> TraceResult<()> {
        self.inner.force_flush()
    }

    fn shutdown(&self) -> TraceResult<()> {
        self.inner.shutdown()
    }

    fn set_resource(&mut self, resource: &Resource) {
        self.inner.set_resource(resource);
    }
}
