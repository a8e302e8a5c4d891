//! The telemetry facade services call into.
//!
//! # Responsibilities
//! - Leveled, trace-correlated structured logging (always available)
//! - Request count and duration metrics (Enabled only)
//! - Span start/attribute/event/end (Enabled only)
//! - Flush and shutdown of the export pipeline
//!
//! # Design Decisions
//! - Construct one `Logger` at startup and pass it (or a clone) to every component
//! - Every metric and trace operation checks the Enabled gate first and
//!   returns through the same no-op path otherwise
//! - No operation waits on the network; export runs on background tasks

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use opentelemetry::trace::TraceContextExt;
use opentelemetry::KeyValue;
use opentelemetry_sdk::export::trace::SpanExporter;
use opentelemetry_sdk::metrics::exporter::PushMetricExporter as PushMetricsExporter;

use crate::config::TelemetryConfig;
use crate::context::Context;
use crate::degrade::{self, Backend, TelemetryState, WiringError};
use crate::export::{Discard, TelemetryStats};
use crate::fields;
use crate::logging::fields::value_to_string;
use crate::logging::{Emitter, Fields, Level, LogSink, StdoutSink};
use crate::trace::SpanEnd;

/// Structured logger, metrics and tracing behind one handle.
///
/// Cloning is cheap and every clone shares the same state.
#[derive(Clone)]
pub struct Logger {
    config: Arc<TelemetryConfig>,
    emitter: Emitter,
    backend: Option<Arc<Backend>>,
}

impl Logger {
    /// Build a logger, wiring the collector if one is configured and reachable.
    ///
    /// Never fails: without a usable collector the logger is returned in the
    /// Disabled state with logging fully working.
    pub async fn new(config: TelemetryConfig) -> Self {
        LoggerBuilder::new(config).build().await
    }

    /// A logger whose metrics and tracing are no-ops. Needs no runtime.
    pub fn disabled(config: TelemetryConfig) -> Self {
        LoggerBuilder::new(config).build_disabled()
    }

    pub fn builder(config: TelemetryConfig) -> LoggerBuilder {
        LoggerBuilder::new(config)
    }

    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    /// True only if collector wiring succeeded.
    pub fn is_initialized(&self) -> bool {
        self.backend.is_some()
    }

    pub fn state(&self) -> TelemetryState {
        if self.is_initialized() {
            TelemetryState::Enabled
        } else {
            TelemetryState::Disabled
        }
    }

    fn enabled(&self) -> Option<&Backend> {
        self.backend.as_deref()
    }

    // --- Logging ---

    pub fn debug(&self, ctx: &Context, message: &str, fields: &[Fields]) {
        self.emitter.emit(Level::Debug, ctx, message, fields);
    }

    pub fn info(&self, ctx: &Context, message: &str, fields: &[Fields]) {
        self.emitter.emit(Level::Info, ctx, message, fields);
    }

    pub fn warn(&self, ctx: &Context, message: &str, fields: &[Fields]) {
        self.emitter.emit(Level::Warn, ctx, message, fields);
    }

    /// Log at ERROR with the error's description in the `error` field.
    ///
    /// Caller fields are merged after `error` and may replace it.
    pub fn error(
        &self,
        ctx: &Context,
        message: &str,
        err: &dyn std::error::Error,
        fields: &[Fields],
    ) {
        if !self.emitter.enabled(Level::Error) {
            return;
        }
        let mut all = Vec::with_capacity(fields.len() + 1);
        all.push(fields! { "error" => err.to_string() });
        all.extend_from_slice(fields);
        self.emitter.emit(Level::Error, ctx, message, &all);
    }

    // --- Metrics ---

    /// Increment the request counter for (endpoint, status_code, service).
    pub fn count_request(&self, _ctx: &Context, endpoint: &str, status_code: u16) {
        let Some(backend) = self.enabled() else {
            return;
        };
        backend.instruments.count(endpoint, status_code);
    }

    /// Record a request duration, in seconds, for (endpoint, service).
    pub fn record_duration(&self, _ctx: &Context, endpoint: &str, elapsed: Duration) {
        let Some(backend) = self.enabled() else {
            return;
        };
        backend.instruments.record(endpoint, elapsed.as_secs_f64());
    }

    // --- Tracing ---

    /// Start a span as a child of the span in `ctx`.
    ///
    /// Returns the child context and its end handle. When Disabled, returns
    /// `ctx` unchanged and a no-op handle.
    pub fn start_span(&self, ctx: &Context, operation: &str) -> (Context, SpanEnd) {
        let Some(backend) = self.enabled() else {
            return (ctx.clone(), SpanEnd::noop());
        };
        backend.tracer.start(ctx, operation)
    }

    /// Attach a timestamped event to the active span.
    ///
    /// Field values are converted to strings; the event name is also recorded
    /// under the `event` attribute.
    pub fn add_span_event(&self, ctx: &Context, name: &str, fields: &[Fields]) {
        if self.enabled().is_none() {
            return;
        }
        let span = ctx.otel().span();
        if !span.is_recording() {
            return;
        }

        let mut attributes = BTreeMap::new();
        attributes.insert("event".to_string(), name.to_string());
        for f in fields {
            for (k, v) in f.iter() {
                attributes.insert(k.clone(), value_to_string(v));
            }
        }
        span.add_event(
            name.to_string(),
            attributes
                .into_iter()
                .map(|(k, v)| KeyValue::new(k, v))
                .collect(),
        );
    }

    /// Set a string attribute on the active span.
    pub fn add_span_attribute(&self, ctx: &Context, key: &str, value: &str) {
        if self.enabled().is_none() {
            return;
        }
        let span = ctx.otel().span();
        if span.is_recording() {
            span.set_attribute(KeyValue::new(key.to_string(), value.to_string()));
        }
    }

    // --- Lifecycle ---

    /// Export everything buffered so far. No-op when Disabled.
    pub async fn force_flush(&self) {
        if let Some(backend) = self.enabled() {
            backend.flush().await;
        }
    }

    /// Flush and stop the export tasks. Later spans are dropped.
    pub async fn shutdown(&self) {
        if let Some(backend) = self.enabled() {
            backend.shutdown().await;
        }
    }

    /// Export pipeline counters; all zero when Disabled.
    pub fn stats(&self) -> TelemetryStats {
        self.enabled()
            .map(|b| b.stats.snapshot())
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("service", &self.config.service_name)
            .field("state", &self.state())
            .finish()
    }
}

/// Configures how a [`Logger`] is built.
pub struct LoggerBuilder {
    config: TelemetryConfig,
    sink: Option<Arc<dyn LogSink>>,
    span_exporter: Option<Box<dyn SpanExporter>>,
    metric_exporter: Option<Box<dyn PushMetricsExporter>>,
}

impl LoggerBuilder {
    pub fn new(config: TelemetryConfig) -> Self {
        Self {
            config,
            sink: None,
            span_exporter: None,
            metric_exporter: None,
        }
    }

    /// Write records somewhere other than stdout.
    pub fn sink(mut self, sink: impl LogSink + 'static) -> Self {
        self.sink = Some(Arc::new(sink));
        self
    }

    /// Export spans here instead of to the configured endpoint.
    ///
    /// Injecting either exporter counts as successful wiring and skips the
    /// reachability check. A signal without an injected exporter gets a
    /// discarding one.
    pub fn span_exporter(mut self, exporter: impl SpanExporter + 'static) -> Self {
        self.span_exporter = Some(Box::new(exporter));
        self
    }

    /// Export metrics here instead of to the configured endpoint.
    pub fn metric_exporter(mut self, exporter: impl PushMetricsExporter) -> Self {
        self.metric_exporter = Some(Box::new(exporter));
        self
    }

    /// Wire the collector (or injected exporters) and start export tasks.
    pub async fn build(mut self) -> Logger {
        let (config, emitter) = self.parts();

        let exporters = match (self.span_exporter.take(), self.metric_exporter.take()) {
            (None, None) => match degrade::wire(&config).await {
                Ok(exporters) => Some(exporters),
                Err(WiringError::MissingEndpoint) => None,
                Err(e) => {
                    emitter.warn(
                        "Telemetry collector unavailable, metrics and tracing disabled",
                        fields! {
                            "error" => e.to_string(),
                            "collector_endpoint" => config.collector_endpoint().unwrap_or_default(),
                        },
                    );
                    None
                }
            },
            (spans, metrics) => Some((
                spans.unwrap_or_else(|| Box::new(Discard)),
                metrics.unwrap_or_else(|| Box::new(Discard)),
            )),
        };

        let backend = exporters.map(|(spans, metrics)| {
            Arc::new(Backend::start(&config, spans, metrics, emitter.clone()))
        });

        Logger {
            config,
            emitter,
            backend,
        }
    }

    /// Build without wiring anything.
    pub fn build_disabled(self) -> Logger {
        let (config, emitter) = self.parts();
        Logger {
            config,
            emitter,
            backend: None,
        }
    }

    fn parts(&self) -> (Arc<TelemetryConfig>, Emitter) {
        let config = Arc::new(self.config.clone());
        let sink = self
            .sink
            .clone()
            .unwrap_or_else(|| Arc::new(StdoutSink));
        let emitter = Emitter::new(config.clone(), sink);
        (config, emitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::MemorySink;
    use opentelemetry::Value;
    use opentelemetry_sdk::testing::trace::InMemorySpanExporter;

    fn config() -> TelemetryConfig {
        TelemetryConfig::new("gateway", "1.0.0", "dev")
    }

    #[test]
    fn test_disabled_is_noop() {
        let sink = MemorySink::new();
        let logger = LoggerBuilder::new(config()).sink(sink.clone()).build_disabled();
        let ctx = Context::new();

        let (child, end) = logger.start_span(&ctx, "work");
        assert!(!child.has_span());
        assert!(end.is_noop());
        logger.count_request(&child, "/work", 200);
        logger.record_duration(&child, "/work", Duration::from_millis(5));
        logger.add_span_event(&child, "event", &[]);
        logger.add_span_attribute(&child, "k", "v");
        end.end();
        end.end();

        assert_eq!(logger.stats(), TelemetryStats::default());
        assert_eq!(logger.state(), TelemetryState::Disabled);

        logger.info(&child, "still logs", &[]);
        assert_eq!(sink.records().len(), 1);
    }

    #[test]
    fn test_error_embeds_description() {
        let sink = MemorySink::new();
        let logger = LoggerBuilder::new(config()).sink(sink.clone()).build_disabled();
        let err = std::io::Error::new(std::io::ErrorKind::Other, "connection reset");

        logger.error(&Context::new(), "upstream failed", &err, &[fields! { "attempt" => 2 }]);

        let record = &sink.records()[0];
        assert_eq!(record["level"], "ERROR");
        assert_eq!(record["error"], "connection reset");
        assert_eq!(record["attempt"], 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_span_attribute_and_event() {
        let exporter = InMemorySpanExporter::default();
        let logger = LoggerBuilder::new(config())
            .sink(MemorySink::new())
            .span_exporter(exporter.clone())
            .build()
            .await;
        assert!(logger.is_initialized());

        let (ctx, end) = logger.start_span(&Context::new(), "process_user_request");
        logger.add_span_attribute(&ctx, "user_id", "42");
        logger.add_span_event(&ctx, "validated", &[fields! { "fields" => 3, "ok" => true }]);
        end.end();
        logger.add_span_attribute(&ctx, "late", "ignored");
        logger.add_span_event(&ctx, "late", &[]);
        logger.force_flush().await;

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 1);
        let span = &spans[0];
        let attribute = |key: &str| {
            span.attributes
                .iter()
                .find(|kv| kv.key.as_str() == key)
                .map(|kv| kv.value.clone())
        };
        assert_eq!(attribute("user_id"), Some(Value::from("42")));
        assert_eq!(attribute("version"), Some(Value::from("1.0.0")));
        assert!(attribute("late").is_none());

        assert_eq!(span.events.len(), 1);
        let event = span.events.iter().next().unwrap();
        assert_eq!(event.name, "validated");
        let event_attribute = |key: &str| {
            event
                .attributes
                .iter()
                .find(|kv| kv.key.as_str() == key)
                .map(|kv| kv.value.to_string())
        };
        assert_eq!(event_attribute("event").as_deref(), Some("validated"));
        assert_eq!(event_attribute("fields").as_deref(), Some("3"));
        assert_eq!(event_attribute("ok").as_deref(), Some("true"));

        logger.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_injected_exporter_skips_wiring() {
        // The endpoint is unreachable, but injection counts as wired.
        let logger = LoggerBuilder::new(config().with_collector_endpoint("127.0.0.1:1"))
            .sink(MemorySink::new())
            .span_exporter(InMemorySpanExporter::default())
            .build()
            .await;
        assert_eq!(logger.state(), TelemetryState::Enabled);
        logger.shutdown().await;
        logger.shutdown().await;
    }
}
