//! Log record assembly and serialization.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::config::TelemetryConfig;
use crate::context::SpanContext;
use crate::logging::{Fields, Level};

/// A single structured log line before serialization.
///
/// Field keys are kept sorted, so the serialized form is stable.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    fields: Map<String, Value>,
}

impl LogRecord {
    /// Assemble the required fields.
    pub(crate) fn new(
        config: &TelemetryConfig,
        timestamp: DateTime<Utc>,
        level: Level,
        message: &str,
    ) -> Self {
        let mut fields = Map::new();
        fields.insert(
            "timestamp".into(),
            Value::String(timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)),
        );
        fields.insert("level".into(), Value::String(level.as_str().into()));
        fields.insert("message".into(), Value::String(message.into()));
        fields.insert("service".into(), Value::String(config.service_name.clone()));
        fields.insert("version".into(), Value::String(config.version.clone()));
        fields.insert("environment".into(), Value::String(config.environment.clone()));
        Self { fields }
    }

    /// Attach the identifiers of the active span.
    pub(crate) fn correlate(&mut self, span: &SpanContext) {
        self.fields
            .insert("trace_id".into(), Value::String(span.trace_id().to_string()));
        self.fields
            .insert("span_id".into(), Value::String(span.span_id().to_string()));
    }

    /// Merge caller fields; later entries overwrite earlier ones.
    pub(crate) fn merge(&mut self, fields: &Fields) {
        fields.merge_into(&mut self.fields);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Serialize to a single JSON line.
    pub fn to_line(&self) -> String {
        serde_json::to_string(&self.fields).unwrap_or_else(|e| {
            // Only reachable through a broken Serialize impl; keep the envelope.
            let mut fallback = Map::new();
            for key in ["timestamp", "level", "message", "service", "version", "environment"] {
                if let Some(v) = self.fields.get(key) {
                    fallback.insert(key.into(), v.clone());
                }
            }
            fallback.insert("serialization_error".into(), Value::String(e.to_string()));
            Value::Object(fallback).to_string()
        })
    }
}
