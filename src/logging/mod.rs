//! Structured logging.
//!
//! # Responsibilities
//! - Assemble leveled, field-annotated records from the service identity
//! - Correlate records with the span active in the caller's [`Context`](crate::context::Context)
//! - Serialize each record as one JSON line and write it to the sink
//!
//! # Design Decisions
//! - stdout is the only transport; log shipping tails process output
//! - Caller fields are merged last, last write wins
//! - Never panics: unserializable values become a placeholder string

pub mod emitter;
pub mod fields;
pub mod level;
pub mod record;
pub mod sink;

pub use emitter::Emitter;
pub use fields::{Fields, UNSERIALIZABLE};
pub use level::{Level, ParseLevelError};
pub use record::LogRecord;
pub use sink::{LogSink, MemorySink, StdoutSink};
