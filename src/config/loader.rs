//! Configuration loading from disk and from the process environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::TelemetryConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Environment variable holding the service name.
pub const ENV_SERVICE_NAME: &str = "SERVICE_NAME";
/// Environment variable holding the service version.
pub const ENV_SERVICE_VERSION: &str = "SERVICE_VERSION";
/// Environment variable holding the deployment environment.
pub const ENV_ENVIRONMENT: &str = "ENVIRONMENT";
/// Environment variable holding the collector address set by the deployment manifests.
pub const ENV_COLLECTOR: &str = "ALLOY_URL";
/// Standard OTLP endpoint variable, used when `ALLOY_URL` is unset.
pub const ENV_OTLP_ENDPOINT: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
/// Environment variable holding the minimum log level.
pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid {key}: {message}")]
    Env { key: &'static str, message: String },

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<TelemetryConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: TelemetryConfig = toml::from_str(&content)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Load and validate configuration from the process environment.
pub fn from_env() -> Result<TelemetryConfig, ConfigError> {
    from_lookup(|key| std::env::var(key).ok())
}

/// Build a configuration from an arbitrary key lookup.
///
/// Missing identity variables surface as validation errors.
pub fn from_lookup<F>(lookup: F) -> Result<TelemetryConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).unwrap_or_default();

    let mut config = TelemetryConfig::new(
        get(ENV_SERVICE_NAME),
        get(ENV_SERVICE_VERSION),
        get(ENV_ENVIRONMENT),
    );

    config.collector_endpoint = lookup(ENV_COLLECTOR)
        .filter(|v| !v.trim().is_empty())
        .or_else(|| lookup(ENV_OTLP_ENDPOINT));

    if let Some(level) = lookup(ENV_LOG_LEVEL).filter(|v| !v.trim().is_empty()) {
        config.log_level = level.parse().map_err(|e| ConfigError::Env {
            key: ENV_LOG_LEVEL,
            message: format!("{}", e),
        })?;
    }

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}
