//! JSON-Lines history exchange: one event per line.
//!
//! Surrounding tooling stores game histories as `.jsonl` files. Reading
//! validates every line through [`validate_event_at`]; blank lines are
//! skipped. Writing emits each event as compact JSON followed by `\n`.

use std::path::Path;

use forecast_types::Event;
use serde_json::Value;

use crate::error::EventsError;
use crate::schema::validate_event_at;

/// Parse a JSON-Lines document into events, in file order.
///
/// # Errors
///
/// Returns [`EventsError::InvalidJson`] or [`EventsError::Schema`] with the
/// 1-based number of the first bad line.
pub fn parse_history(text: &str) -> Result<Vec<Event>, EventsError> {
    let mut events = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let line_no = index.saturating_add(1);
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(trimmed).map_err(|source| {
            EventsError::InvalidJson {
                line: line_no,
                source,
            }
        })?;
        let event = validate_event_at(&value, "$").map_err(|violation| EventsError::Schema {
            line: line_no,
            violation,
        })?;
        events.push(event);
    }
    Ok(events)
}

/// Render events as a JSON-Lines document.
///
/// # Errors
///
/// Returns [`EventsError::Serialization`] if an event cannot be serialized.
pub fn render_history(events: &[Event]) -> Result<String, EventsError> {
    let mut out = String::new();
    for event in events {
        out.push_str(&serde_json::to_string(event)?);
        out.push('\n');
    }
    Ok(out)
}

/// Read and validate a history file.
///
/// # Errors
///
/// Returns [`EventsError::Io`] if the file cannot be read, or any error from
/// [`parse_history`].
pub fn read_history(path: &Path) -> Result<Vec<Event>, EventsError> {
    let text = std::fs::read_to_string(path).map_err(|source| EventsError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let events = parse_history(&text)?;
    tracing::debug!(path = %path.display(), count = events.len(), "history loaded");
    Ok(events)
}

/// Write a history file, replacing any existing content.
///
/// # Errors
///
/// Returns [`EventsError::Io`] if the file cannot be written.
pub fn write_history(path: &Path, events: &[Event]) -> Result<(), EventsError> {
    let text = render_history(events)?;
    std::fs::write(path, text).map_err(|source| EventsError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!(path = %path.display(), count = events.len(), "history written");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const HISTORY: &str = r#"{"type":"news-published","id":"news-2025-01-02-t","date":"2025-01-02","icon":"Landmark","title":"T","description":"D"}

{"type":"scenario-head-completed","date":"2025-01-03"}
"#;

    #[test]
    fn parses_lines_and_skips_blanks() {
        let events = parse_history(HISTORY).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events.last().map(Event::kind), Some("scenario-head-completed"));
    }

    #[test]
    fn render_then_parse_is_identity_on_text() {
        let events = parse_history(HISTORY).unwrap();
        let rendered = render_history(&events).unwrap();
        assert_eq!(rendered, HISTORY.replace("\n\n", "\n"));
    }

    #[test]
    fn bad_json_reports_line_number() {
        let err = parse_history("{\"type\":\"game-over\",\"date\":\"2025-01-01\",\"summary\":\"s\"}\n{oops\n")
            .unwrap_err();
        assert!(matches!(err, EventsError::InvalidJson { line: 2, .. }));
    }

    #[test]
    fn schema_error_reports_line_and_path() {
        let err = parse_history("\n{\"type\":\"game-over\",\"date\":\"2025-01-01\"}\n").unwrap_err();
        assert!(matches!(
            err,
            EventsError::Schema { line: 2, ref violation } if violation.path == "$.summary"
        ));
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.jsonl");
        let events = parse_history(HISTORY).unwrap();
        write_history(&path, &events).unwrap();
        assert_eq!(read_history(&path).unwrap(), events);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_history(&dir.path().join("absent.jsonl")).unwrap_err();
        assert!(matches!(err, EventsError::Io { .. }));
    }
}
