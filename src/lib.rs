//! Service telemetry client.
//!
//! One facade for structured logs, request metrics and distributed traces.
//! Logs go to stdout as JSON lines; metrics and spans are exported over
//! OTLP/HTTP when a collector is reachable at startup and silently become
//! no-ops when it is not.
//!
//! ```no_run
//! use service_telemetry::{fields, Context, Logger, TelemetryConfig};
//!
//! # async fn run() {
//! let config = TelemetryConfig::new("gateway", "1.0.0", "dev")
//!     .with_collector_endpoint("alloy.monitoring:4318");
//! let logger = Logger::new(config).await;
//!
//! let (ctx, end) = logger.start_span(&Context::new(), "process_user_request");
//! logger.info(&ctx, "Processing user request", &[fields! { "user_id" => 42 }]);
//! logger.count_request(&ctx, "/process-user", 200);
//! end.end();
//! # }
//! ```

pub mod config;
pub mod context;
pub mod degrade;
pub mod export;
pub mod logger;
pub mod logging;
pub mod metrics;
pub mod trace;

pub use config::{ExportConfig, TelemetryConfig};
pub use context::{Context, SpanContext, SpanId, TraceId};
pub use degrade::TelemetryState;
pub use export::TelemetryStats;
pub use logger::{Logger, LoggerBuilder};
pub use logging::{Fields, Level};
pub use trace::SpanEnd;
