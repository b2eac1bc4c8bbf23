//! Structured logging and ndjson audit lines.

mod format;

pub use format::{StructuredLogger, ThreatLogLine};
