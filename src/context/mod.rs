//! Correlation context.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → Context::new() or Context::from_traceparent(header)
//!     → Logger::start_span(&ctx, ..) returns a child Context
//!     → passed by reference down the call chain
//!     → log calls read the recording span's ids back out of it
//!     → Context::traceparent() for outgoing requests
//! ```
//!
//! # Design Decisions
//! - Context is an explicit value wrapping an `opentelemetry::Context`; the
//!   OpenTelemetry thread-local "current" context is never read or attached
//! - Starting a span layers a new Context on the parent; the parent is untouched
//! - Only a span this process is recording correlates logs; a remote parent
//!   from `traceparent` is used for parenting and propagation only

use std::collections::HashMap;

use opentelemetry::propagation::TextMapPropagator;
use opentelemetry::trace::TraceContextExt;
use opentelemetry_sdk::propagation::TraceContextPropagator;

pub use opentelemetry::trace::{SpanContext, SpanId, TraceId};

/// W3C trace context header name.
pub const TRACEPARENT_HEADER: &str = "traceparent";

/// Carrier of the active span for one logical operation.
///
/// Holds zero or one active span. Pass it explicitly through every call
/// boundary of the operation. Cloning is cheap.
#[derive(Clone, Default)]
pub struct Context {
    inner: opentelemetry::Context,
}

impl Context {
    /// An empty context with no active span.
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue a trace from an incoming `traceparent` header.
    ///
    /// Returns `None` when the header is malformed or carries invalid ids.
    pub fn from_traceparent(header: &str) -> Option<Self> {
        let carrier = HashMap::from([(TRACEPARENT_HEADER.to_string(), header.trim().to_string())]);
        let inner = TraceContextPropagator::new()
            .extract_with_context(&opentelemetry::Context::new(), &carrier);
        let ctx = Self { inner };
        ctx.span_context().map(|_| ctx)
    }

    /// `traceparent` value for outgoing requests, if a span is present.
    pub fn traceparent(&self) -> Option<String> {
        let mut carrier: HashMap<String, String> = HashMap::new();
        TraceContextPropagator::new().inject_context(&self.inner, &mut carrier);
        carrier.remove(TRACEPARENT_HEADER)
    }

    /// Identifiers of the span this context carries, ended, remote or not.
    pub fn span_context(&self) -> Option<SpanContext> {
        let span = self.inner.span();
        let span_context = span.span_context();
        span_context.is_valid().then(|| span_context.clone())
    }

    /// Identifiers to correlate log records with.
    ///
    /// Only a span that is still recording in this process counts; an ended
    /// span or a remote parent yields `None`.
    pub fn active_span_context(&self) -> Option<SpanContext> {
        if self.inner.span().is_recording() {
            self.span_context()
        } else {
            None
        }
    }

    /// Whether a span (local or remote) is present.
    pub fn has_span(&self) -> bool {
        self.span_context().is_some()
    }

    pub(crate) fn from_otel(inner: opentelemetry::Context) -> Self {
        Self { inner }
    }

    pub(crate) fn otel(&self) -> &opentelemetry::Context {
        &self.inner
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("span", &self.span_context())
            .finish()
    }
}
