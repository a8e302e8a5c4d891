//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Require non-empty service identity fields
//! - Validate value ranges (queue sizes, intervals and timeouts > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: TelemetryConfig → Result<(), Vec<ValidationError>>
//! - The collector endpoint is not validated here; a bad endpoint disables export at
//!   construction instead of failing the service

use thiserror::Error;

use crate::config::schema::TelemetryConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required identity field is empty.
    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    /// A numeric setting must be positive.
    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    /// Batches can never fill because the queue is smaller.
    #[error("max_export_batch_size ({batch}) exceeds max_queue_size ({queue})")]
    BatchExceedsQueue { batch: usize, queue: usize },
}

/// Validate a configuration, collecting every error.
pub fn validate_config(config: &TelemetryConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let identity = [
        ("service_name", &config.service_name),
        ("version", &config.version),
        ("environment", &config.environment),
    ];
    for (field, value) in identity {
        if value.trim().is_empty() {
            errors.push(ValidationError::EmptyField(field));
        }
    }

    let export = &config.export;
    let positive = [
        ("max_queue_size", export.max_queue_size as u64),
        ("max_export_batch_size", export.max_export_batch_size as u64),
        ("scheduled_delay_ms", export.scheduled_delay_ms),
        ("metric_interval_ms", export.metric_interval_ms),
        ("export_timeout_ms", export.export_timeout_ms),
        ("connect_timeout_ms", export.connect_timeout_ms),
    ];
    for (field, value) in positive {
        if value == 0 {
            errors.push(ValidationError::Zero(field));
        }
    }

    if export.max_export_batch_size > export.max_queue_size {
        errors.push(ValidationError::BatchExceedsQueue {
            batch: export.max_export_batch_size,
            queue: export.max_queue_size,
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
