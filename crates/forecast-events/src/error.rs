//! Error types for event validation and history exchange.
//!
//! [`SchemaViolation`] is the only error the pure validation layer raises.
//! [`EventsError`] adds the I/O and line-numbered failures of reading and
//! writing JSON-Lines history files.

use std::path::PathBuf;

/// A payload failed structural validation.
///
/// `path` locates the offending field in `JSONPath`-like notation rooted at
/// `$`, e.g. `$[2].patch` for the patch of the third record in a batch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("schema violation at {path}: {reason}")]
pub struct SchemaViolation {
    /// Location of the offending field.
    pub path: String,
    /// What is wrong with it.
    pub reason: String,
}

impl SchemaViolation {
    /// Create a violation at `path`.
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised while reading or writing event histories.
#[derive(Debug, thiserror::Error)]
pub enum EventsError {
    /// A history line is not valid JSON.
    #[error("history line {line}: invalid JSON: {source}")]
    InvalidJson {
        /// 1-based line number.
        line: usize,
        /// The underlying parse error.
        source: serde_json::Error,
    },

    /// A history line is JSON but not a valid event.
    #[error("history line {line}: {violation}")]
    Schema {
        /// 1-based line number.
        line: usize,
        /// The validation failure.
        violation: SchemaViolation,
    },

    /// Reading or writing a history file failed.
    #[error("history file {}: {source}", path.display())]
    Io {
        /// The file involved.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// An event could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
