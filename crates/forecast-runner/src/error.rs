//! Error types for the forecast runner.
//!
//! Uses `thiserror` for typed errors that surface through the whole turn
//! pipeline: configuration, prompt rendering, provider calls, chunk
//! ingestion, and the replay/record harness. Nothing here is retried by the
//! runner; callers decide what to do with a failure.

use std::path::PathBuf;

use forecast_events::{EventsError, SchemaViolation};

/// A single provider fragment could not be turned into events.
///
/// `record` is the 0-based position of the offending record within the
/// fragment (array element in batch mode, non-blank line in JSON-Lines mode).
#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    /// The record is not valid JSON.
    #[error("record {record}: invalid JSON: {source}")]
    InvalidJson {
        /// Position of the record in the fragment.
        record: usize,
        /// The underlying parse error.
        source: serde_json::Error,
    },

    /// The record is JSON but not a valid command.
    #[error("record {record}: {violation}")]
    Schema {
        /// Position of the record in the fragment.
        record: usize,
        /// The validation failure.
        violation: SchemaViolation,
    },
}

/// Errors that can occur during runner operation.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// Configuration is invalid or missing.
    #[error("config error: {0}")]
    Config(String),

    /// Failed to load or render a prompt template.
    #[error("template render error: {0}")]
    Template(String),

    /// The provider returned an error or was unreachable.
    #[error("LLM backend error: {0}")]
    LlmBackend(String),

    /// A provider fragment failed to parse or validate.
    #[error("fragment {fragment}: {source}")]
    Chunk {
        /// 0-based index of the fragment in the stream.
        fragment: usize,
        /// What went wrong inside it.
        source: ChunkError,
    },

    /// The request rebuilt for a replay differs from the recorded one.
    #[error("replay mismatch at {path}: recorded {recorded}, rebuilt {rebuilt}")]
    ReplayMismatch {
        /// `JSONPath`-like location of the first difference.
        path: String,
        /// The recorded value at that location.
        recorded: String,
        /// The rebuilt value at that location.
        rebuilt: String,
    },

    /// A tape file is malformed.
    #[error("tape {}: {violation}", path.display())]
    Tape {
        /// The tape file.
        path: PathBuf,
        /// The field that broke.
        violation: SchemaViolation,
    },

    /// The fragment stream failed or ended without producing anything.
    #[error("stream failure: {0}")]
    StreamFailure(String),

    /// History exchange failed.
    #[error("history error: {0}")]
    History(#[from] EventsError),

    /// Filesystem I/O failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// The file involved.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Serialization or deserialization failure.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}
