//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! environment variables / config file (TOML)
//!     → loader.rs (read & deserialize)
//!     → validation.rs (semantic checks)
//!     → TelemetryConfig (validated, immutable)
//!     → shared via Arc with the logger and its background tasks
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no reload
//! - Export tuning has defaults so only the identity fields are required
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{from_env, load_config, ConfigError};
pub use schema::{ExportConfig, TelemetryConfig};
pub use validation::{validate_config, ValidationError};
