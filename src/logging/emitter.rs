//! The always-available logging path.

use std::sync::Arc;

use chrono::Utc;

use crate::config::TelemetryConfig;
use crate::context::Context;
use crate::logging::{Fields, Level, LogRecord, LogSink};

/// Builds records and hands them to the sink.
///
/// Independent of collector wiring, so both the facade and the background
/// export tasks can report through it.
#[derive(Clone)]
pub struct Emitter {
    config: Arc<TelemetryConfig>,
    sink: Arc<dyn LogSink>,
}

impl Emitter {
    pub fn new(config: Arc<TelemetryConfig>, sink: Arc<dyn LogSink>) -> Self {
        Self { config, sink }
    }

    /// Whether records at `level` pass the configured threshold.
    pub fn enabled(&self, level: Level) -> bool {
        level >= self.config.log_level
    }

    /// Assemble, correlate, merge and write one record.
    pub fn emit(&self, level: Level, ctx: &Context, message: &str, fields: &[Fields]) {
        if !self.enabled(level) {
            return;
        }

        let mut record = LogRecord::new(&self.config, Utc::now(), level, message);
        if let Some(span) = ctx.active_span_context() {
            record.correlate(&span);
        }
        for f in fields {
            record.merge(f);
        }

        self.sink.write_line(&record.to_line());
    }

    /// WARN record outside of any request context.
    pub(crate) fn warn(&self, message: &str, fields: Fields) {
        self.emit(Level::Warn, &Context::new(), message, &[fields]);
    }
}

impl std::fmt::Debug for Emitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emitter")
            .field("service", &self.config.service_name)
            .field("log_level", &self.config.log_level)
            .finish()
    }
}
