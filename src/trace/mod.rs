//! Distributed tracing support.
//!
//! # Responsibilities
//! - Create spans as children of the span carried by a [`Context`](crate::context::Context)
//! - Record string attributes and timestamped events on live spans
//! - Hand ended spans to the SDK batch processor for export
//!
//! # Design Decisions
//! - Every span is recorded (`Sampler::AlwaysOn`), even under an unsampled remote parent
//! - Ending is idempotent and never blocks; overflow beyond `max_queue_size`
//!   is dropped and counted
//! - The batch processor runs on its own current-thread runtime, so flushing
//!   from inside the caller's runtime cannot starve it

mod processor;
pub mod tracer;

pub use tracer::{SpanEnd, Tracer};

use std::sync::Arc;
use std::time::Duration;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::runtime;
use opentelemetry_sdk::trace::{BatchConfigBuilder, BatchSpanProcessor, Sampler, TracerProvider};

use crate::config::TelemetryConfig;
use crate::export::{self, ExportStats, ReportingSpanExporter};
use processor::BoundedProcessor;

/// Instrumentation scope reported with every span.
pub const INSTRUMENTATION_SCOPE: &str = "service-telemetry";

/// Build the tracer provider and a [`Tracer`] on it.
pub(crate) fn pipeline(
    config: &TelemetryConfig,
    exporter: ReportingSpanExporter,
    stats: Arc<ExportStats>,
) -> (TracerProvider, Tracer) {
    let tuning = &config.export;
    let batch = BatchConfigBuilder::default()
        .with_max_queue_size(tuning.max_queue_size)
        .with_max_export_batch_size(tuning.max_export_batch_size)
        .with_scheduled_delay(Duration::from_millis(tuning.scheduled_delay_ms))
        .with_max_export_timeout(Duration::from_millis(tuning.export_timeout_ms))
        .build();
    let batch = BatchSpanProcessor::builder(exporter, runtime::TokioCurrentThread)
        .with_batch_config(batch)
        .build();

    let provider = TracerProvider::builder()
        .with_span_processor(BoundedProcessor::new(batch, tuning.max_queue_size, stats.clone()))
        .with_sampler(Sampler::AlwaysOn)
        .with_resource(export::resource(config))
        .build();
    let tracer = Tracer::new(config, provider.tracer(INSTRUMENTATION_SCOPE), stats);
    (provider, tracer)
}

#[cfg(test)]
mod tests {
    use opentelemetry::trace::{SpanId, Status};
    use opentelemetry::Value;
    use opentelemetry_sdk::export::trace::SpanData;
    use opentelemetry_sdk::testing::trace::InMemorySpanExporter;

    use super::*;
    use crate::context::Context;
    use crate::logging::{Emitter, MemorySink};

    fn tracer(exporter: &InMemorySpanExporter) -> (TracerProvider, Tracer, Arc<ExportStats>) {
        let config = Arc::new(TelemetryConfig::new("gateway", "1.0.0", "dev"));
        let emitter = Emitter::new(config.clone(), Arc::new(MemorySink::new()));
        let stats = Arc::new(ExportStats::default());
        let reporting =
            ReportingSpanExporter::new(Box::new(exporter.clone()), emitter, stats.clone());
        let (provider, tracer) = pipeline(&config, reporting, stats.clone());
        (provider, tracer, stats)
    }

    fn attribute<'a>(span: &'a SpanData, key: &str) -> Option<&'a Value> {
        span.attributes
            .iter()
            .find(|kv| kv.key.as_str() == key)
            .map(|kv| &kv.value)
    }

    async fn flush(provider: &TracerProvider) {
        let provider = provider.clone();
        tokio::task::spawn_blocking(move || provider.force_flush())
            .await
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_parent_child_linkage() {
        let exporter = InMemorySpanExporter::default();
        let (provider, tracer, stats) = tracer(&exporter);

        let (root_ctx, end_root) = tracer.start(&Context::new(), "request");
        let (child_ctx, end_child) = tracer.start(&root_ctx, "db_query");

        let root = root_ctx.span_context().unwrap();
        let child = child_ctx.span_context().unwrap();
        assert_eq!(root.trace_id(), child.trace_id());
        assert_ne!(root.span_id(), child.span_id());

        // The parent context still carries the parent span.
        assert_eq!(root_ctx.span_context().unwrap().span_id(), root.span_id());

        end_child.end();
        end_root.end();
        flush(&provider).await;

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 2);
        let exported_child = spans.iter().find(|s| s.name == "db_query").unwrap();
        assert_eq!(exported_child.parent_span_id, root.span_id());
        assert_eq!(exported_child.status, Status::Unset);
        assert_eq!(
            attribute(exported_child, "service").map(|v| v.to_string()),
            Some("gateway".to_string())
        );
        assert_eq!(
            attribute(exported_child, "environment").map(|v| v.to_string()),
            Some("dev".to_string())
        );
        let exported_root = spans.iter().find(|s| s.name == "request").unwrap();
        assert_eq!(exported_root.parent_span_id, SpanId::INVALID);
        assert_eq!(stats.snapshot().spans_exported, 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_remote_parent_continues_trace() {
        let exporter = InMemorySpanExporter::default();
        let (provider, tracer, _) = tracer(&exporter);

        // Unsampled upstream: the local span is still recorded.
        let upstream = Context::from_traceparent(
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-00",
        )
        .unwrap();
        let (ctx, end) = tracer.start(&upstream, "handle");
        assert!(ctx.active_span_context().is_some());
        end.end();
        flush(&provider).await;

        let span = ctx.span_context().unwrap();
        assert_eq!(span.trace_id().to_string(), "4bf92f3577b34da6a3ce929d0e0e4736");
        assert!(!span.is_remote());
        let exported = exporter.get_finished_spans().unwrap();
        assert_eq!(exported.len(), 1);
        assert_eq!(exported[0].parent_span_id.to_string(), "00f067aa0ba902b7");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_end_is_idempotent() {
        let exporter = InMemorySpanExporter::default();
        let (provider, tracer, stats) = tracer(&exporter);

        let (ctx, end) = tracer.start(&Context::new(), "work");
        let other = end.clone();
        end.end();
        other.end();
        end.end();
        assert!(ctx.active_span_context().is_none());
        flush(&provider).await;

        assert_eq!(exporter.get_finished_spans().unwrap().len(), 1);
        assert_eq!(stats.snapshot().spans_dropped, 0);
    }
}
