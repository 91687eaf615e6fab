//! Streaming ingestion: provider fragments in, events folded into history.
//!
//! Each fragment is parsed, validated, and normalized on its own, and its
//! events are appended to the history before the next fragment is pulled.
//! Nothing is re-sorted here; [`forecast_events::sort_and_dedupe`] runs once
//! the whole response has been consumed.
//!
//! Fragment shapes:
//!
//! - a JSON array of command records (batch mode), possibly pretty-printed;
//! - a single command object, possibly pretty-printed, taken as a one-record
//!   batch;
//! - otherwise several newline-separated records, one per line (JSON-Lines
//!   mode).
//!
//! A bad record fails its whole fragment. Events from earlier fragments stay.

use forecast_events::{normalize, validate_command_at};
use forecast_types::{Command, Event};
use futures::StreamExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{ChunkError, RunnerError};
use crate::llm::FragmentStream;

/// Result of parsing one fragment against a history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkOutcome {
    /// Events produced by this fragment, in record order.
    pub events: Vec<Event>,
    /// The prior history with `events` appended.
    pub next_history: Vec<Event>,
}

/// Parse one fragment and append its events to a copy of `prior_history`.
///
/// # Errors
///
/// Returns [`ChunkError`] naming the first record that is not valid JSON or
/// not a valid command. `prior_history` is left as it was.
pub fn parse_chunk(raw: &str, prior_history: &[Event]) -> Result<ChunkOutcome, ChunkError> {
    let events = parse_fragment(raw)?;
    let mut next_history = Vec::with_capacity(prior_history.len().saturating_add(events.len()));
    next_history.extend_from_slice(prior_history);
    next_history.extend(events.iter().cloned());
    Ok(ChunkOutcome {
        events,
        next_history,
    })
}

/// Parse one fragment into normalized events.
///
/// A blank fragment yields no events.
///
/// # Errors
///
/// Returns [`ChunkError`] naming the first offending record.
pub fn parse_fragment(raw: &str) -> Result<Vec<Event>, ChunkError> {
    Ok(parse_commands(raw)?.into_iter().map(normalize).collect())
}

/// Commands parsed from a fragment, before normalization.
///
/// # Errors
///
/// Returns [`ChunkError`] naming the first offending record.
pub fn parse_commands(raw: &str) -> Result<Vec<Command>, ChunkError> {
    let text = raw.trim();
    if text.is_empty() {
        return Ok(Vec::new());
    }

    let records = if text.starts_with('[') {
        batch(text)?
    } else {
        match serde_json::from_str::<Value>(text) {
            Ok(single) => vec![single],
            Err(_) if has_several_lines(text) => json_lines(text)?,
            Err(source) => return Err(ChunkError::InvalidJson { record: 0, source }),
        }
    };

    records
        .iter()
        .enumerate()
        .map(|(index, value)| {
            validate_command_at(value, &format!("$[{index}]")).map_err(|violation| {
                ChunkError::Schema {
                    record: index,
                    violation,
                }
            })
        })
        .collect()
}

fn has_several_lines(text: &str) -> bool {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .nth(1)
        .is_some()
}

fn json_lines(text: &str) -> Result<Vec<Value>, ChunkError> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(record, line)| {
            serde_json::from_str(line).map_err(|source| ChunkError::InvalidJson { record, source })
        })
        .collect()
}

fn batch(text: &str) -> Result<Vec<Value>, ChunkError> {
    match serde_json::from_str(text) {
        Ok(Value::Array(records)) => Ok(records),
        Ok(single) => Ok(vec![single]),
        Err(source) => Err(ChunkError::InvalidJson { record: 0, source }),
    }
}

/// How a fragment stream ended.
#[derive(Debug)]
pub enum StreamEnd {
    /// The stream finished after at least one parsable record.
    Completed,
    /// The cancellation token fired; the stream was dropped.
    Cancelled,
    /// The stream or one of its fragments failed.
    Failed(RunnerError),
}

/// Everything an ingestion pass produced, including partial work.
#[derive(Debug)]
pub struct IngestOutcome {
    /// History with every successfully folded fragment appended.
    pub history: Vec<Event>,
    /// Number of events appended.
    pub appended: usize,
    /// Number of fragments pulled from the stream.
    pub fragments: usize,
    /// How the stream ended.
    pub end: StreamEnd,
}

impl IngestOutcome {
    /// Whether the stream ran to completion.
    pub const fn is_completed(&self) -> bool {
        matches!(self.end, StreamEnd::Completed)
    }
}

/// Pull fragments one at a time and fold their events into `history`.
///
/// A fragment is fully parsed and appended before the next one is requested.
/// On cancellation or failure the stream is dropped, which stops upstream
/// reads and cancels pending replay waits. A stream that ends without a
/// single parsable record is reported as [`RunnerError::StreamFailure`]; an
/// empty batch (`[]`) counts as a record.
pub async fn ingest(
    mut stream: FragmentStream,
    mut history: Vec<Event>,
    cancel: &CancellationToken,
) -> IngestOutcome {
    let mut appended: usize = 0;
    let mut fragments: usize = 0;
    let mut parsed: usize = 0;

    let end = loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => break StreamEnd::Cancelled,
            next = stream.next() => next,
        };

        let Some(next) = next else {
            break if parsed == 0 {
                StreamEnd::Failed(RunnerError::StreamFailure(
                    "provider stream ended without a parsable record".to_owned(),
                ))
            } else {
                StreamEnd::Completed
            };
        };

        let fragment = fragments;
        fragments = fragments.saturating_add(1);

        let raw = match next {
            Ok(raw) => raw,
            Err(e) => break StreamEnd::Failed(e),
        };

        match parse_fragment(&raw) {
            Ok(events) => {
                debug!(fragment, events = events.len(), bytes = raw.len(), "folded fragment");
                if !raw.trim().is_empty() {
                    parsed = parsed.saturating_add(1);
                }
                appended = appended.saturating_add(events.len());
                history.extend(events);
            }
            Err(source) => break StreamEnd::Failed(RunnerError::Chunk { fragment, source }),
        }
    };
    drop(stream);

    info!(fragments, appended, ?end, "ingestion finished");
    IngestOutcome {
        history,
        appended,
        fragments,
        end,
    }
}
