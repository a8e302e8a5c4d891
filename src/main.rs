//! telemetry-probe
//!
//! Emits one of each signal through the telemetry client and reports whether
//! the collector was wired. Used to check a deployment's collector address.
//!
//! ```text
//! env / --config file
//!     → TelemetryConfig
//!     → Logger::new (probe collector)
//!     → INFO record, span + event + attribute, request count + duration
//!     → force_flush, shutdown
//! ```

use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use service_telemetry::config::{self, loader};
use service_telemetry::{fields, Context, Logger, TelemetryConfig};

#[derive(Parser)]
#[command(name = "telemetry-probe")]
#[command(about = "Send a test log, span and metric through the telemetry client", long_about = None)]
struct Cli {
    /// TOML config file; environment variables are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the service name.
    #[arg(long)]
    service_name: Option<String>,

    /// Override the service version.
    #[arg(long)]
    service_version: Option<String>,

    /// Override the deployment environment.
    #[arg(long)]
    environment: Option<String>,

    /// Override the collector endpoint (host:port or URL).
    #[arg(short, long)]
    endpoint: Option<String>,
}

impl Cli {
    fn into_config(self) -> Result<TelemetryConfig, config::ConfigError> {
        let mut config = match &self.config {
            Some(path) => config::load_config(path)?,
            None => loader::from_lookup(|key| {
                std::env::var(key)
                    .ok()
                    .or_else(|| probe_default(key).map(str::to_string))
            })?,
        };

        if let Some(name) = self.service_name {
            config.service_name = name;
        }
        if let Some(version) = self.service_version {
            config.version = version;
        }
        if let Some(environment) = self.environment {
            config.environment = environment;
        }
        if let Some(endpoint) = self.endpoint {
            config.collector_endpoint = Some(endpoint);
        }

        config::validate_config(&config).map_err(config::ConfigError::Validation)?;
        Ok(config)
    }
}

fn probe_default(key: &str) -> Option<&'static str> {
    match key {
        loader::ENV_SERVICE_NAME => Some("telemetry-probe"),
        loader::ENV_SERVICE_VERSION => Some(env!("CARGO_PKG_VERSION")),
        loader::ENV_ENVIRONMENT => Some("development"),
        _ => None,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Internal diagnostics go to stderr; stdout carries the JSON records.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "service_telemetry=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Cli::parse().into_config()?;
    tracing::info!(
        service = %config.service_name,
        endpoint = ?config.collector_endpoint(),
        "Configuration loaded"
    );

    let logger = Logger::new(config).await;
    let start = Instant::now();

    let (ctx, end) = logger.start_span(&Context::new(), "telemetry_probe");
    logger.add_span_attribute(&ctx, "probe.pid", &std::process::id().to_string());
    logger.info(
        &ctx,
        "Telemetry probe started",
        &[fields! { "state" => logger.state().to_string() }],
    );
    logger.add_span_event(&ctx, "probe_emitted", &[fields! { "signals" => 3 }]);
    logger.count_request(&ctx, "/probe", 200);
    logger.record_duration(&ctx, "/probe", start.elapsed());
    end.end();

    tokio::time::timeout(Duration::from_secs(15), logger.shutdown())
        .await
        .unwrap_or_else(|_| tracing::warn!("Timed out flushing telemetry"));

    let stats = logger.stats();
    tracing::info!(
        state = %logger.state(),
        spans_exported = stats.spans_exported,
        export_failures = stats.export_failures,
        "Probe complete"
    );

    eprintln!("collector: {}", logger.state());
    Ok(())
}
