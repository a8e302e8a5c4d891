//! Span creation and the end handle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use opentelemetry::trace::{SpanKind, TraceContextExt, Tracer as _};
use opentelemetry::KeyValue;
use opentelemetry_sdk::trace::Tracer as SdkTracer;

use crate::config::TelemetryConfig;
use crate::context::Context;
use crate::export::ExportStats;

/// Creates spans on the SDK tracer with the service attributes attached.
#[derive(Clone)]
pub struct Tracer {
    tracer: SdkTracer,
    baseline: Arc<[KeyValue]>,
    stats: Arc<ExportStats>,
}

impl Tracer {
    pub(crate) fn new(config: &TelemetryConfig, tracer: SdkTracer, stats: Arc<ExportStats>) -> Self {
        let baseline = [
            KeyValue::new("service", config.service_name.clone()),
            KeyValue::new("version", config.version.clone()),
            KeyValue::new("environment", config.environment.clone()),
        ];
        Self {
            tracer,
            baseline: baseline.into(),
            stats,
        }
    }

    /// Start a child of whatever span `parent` carries, or a new root.
    pub fn start(&self, parent: &Context, name: &str) -> (Context, SpanEnd) {
        let span = self
            .tracer
            .span_builder(name.to_string())
            .with_kind(SpanKind::Internal)
            .with_attributes(self.baseline.to_vec())
            .start_with_context(&self.tracer, parent.otel());
        let otel = parent.otel().with_span(span);

        let end = SpanEnd {
            inner: Some(Arc::new(EndState {
                cx: otel.clone(),
                ended: AtomicBool::new(false),
                stats: self.stats.clone(),
            })),
        };
        (Context::from_otel(otel), end)
    }
}

impl std::fmt::Debug for Tracer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracer")
            .field("baseline", &self.baseline)
            .finish()
    }
}

struct EndState {
    cx: opentelemetry::Context,
    ended: AtomicBool,
    stats: Arc<ExportStats>,
}

/// Ends one span. Clones share the span; only the first `end` has effect.
#[derive(Clone)]
#[must_use = "a span that is never ended is exported only when its last handle drops"]
pub struct SpanEnd {
    inner: Option<Arc<EndState>>,
}

impl SpanEnd {
    /// Handle returned when tracing is disabled.
    pub fn noop() -> Self {
        Self { inner: None }
    }

    pub fn is_noop(&self) -> bool {
        self.inner.is_none()
    }

    /// Record the end time and queue the span for export.
    ///
    /// Never blocks. After shutdown the span is counted as dropped.
    pub fn end(&self) {
        let Some(state) = &self.inner else {
            return;
        };
        if state.ended.swap(true, Ordering::AcqRel) {
            return;
        }
        if state.stats.is_shut_down() {
            state.stats.record_dropped(1);
        }
        state.cx.span().end();
    }
}

impl std::fmt::Debug for SpanEnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ended = self
            .inner
            .as_ref()
            .map(|s| s.ended.load(Ordering::Acquire));
        f.debug_struct("SpanEnd").field("ended", &ended).finish()
    }
}
