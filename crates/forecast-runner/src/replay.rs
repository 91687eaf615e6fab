//! Record and replay of provider sessions.
//!
//! A tape holds the exact request sent to the provider and every fragment it
//! returned, each with the delay since the previous one:
//!
//! ```json
//! {
//!   "meta": {"model": "...", "recordedAt": "...", "label": "..."},
//!   "request": {"model": "...", "contents": "...", "config": {...}},
//!   "stream": [{"delayNs": 812000000, "text": "..."}]
//! }
//! ```
//!
//! [`Recorder`] wraps a live source as a transparent tee and writes the tape
//! once the stream completes. [`Replayer`] serves a tape back. In strict mode
//! it first compares the request it is opened with against the recorded one
//! and refuses to yield anything on a mismatch.
//!
//! Delays are measured and honoured with `tokio::time`, so tests running on
//! a paused clock replay tapes without real waiting.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use forecast_events::SchemaViolation;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::RunnerError;
use crate::llm::{FragmentSource, FragmentStream};
use crate::prompt::GenerateRequest;

/// Metadata keys with a typed field in [`TapeMeta`].
const META_KEYS: [&str; 5] = ["model", "recordedAt", "label", "sdk", "comment"];

/// Longest value excerpt quoted in a mismatch error.
const EXCERPT_CHARS: usize = 120;

/// Marker used in mismatch errors for a missing value.
const ABSENT: &str = "<absent>";

/// Descriptive metadata of a tape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TapeMeta {
    /// Model the session was recorded against.
    pub model: String,
    /// When recording started, as the RFC 3339 text stored in the tape.
    pub recorded_at: String,
    /// Free-form label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Recording client identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdk: Option<String>,
    /// Free-form comment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Metadata keys written by other tools, kept as found.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One recorded fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TapeEntry {
    /// Nanoseconds since the previous fragment (or since dispatch).
    pub delay_ns: u64,
    /// The fragment text, verbatim.
    pub text: String,
}

/// A recorded provider session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tape {
    /// Descriptive metadata.
    pub meta: TapeMeta,
    /// The request exactly as it was sent.
    pub request: Value,
    /// Fragments in arrival order.
    pub stream: Vec<TapeEntry>,
}

impl Tape {
    /// Concatenated text of every fragment.
    pub fn text(&self) -> String {
        self.stream.iter().map(|entry| entry.text.as_str()).collect()
    }
}

// ---------------------------------------------------------------------------
// Tape files
// ---------------------------------------------------------------------------

/// Read and validate a tape file.
///
/// # Errors
///
/// Returns [`RunnerError::Io`] if the file cannot be read and
/// [`RunnerError::Tape`] naming the offending field if it is malformed.
pub async fn load_tape(path: &Path) -> Result<Tape, RunnerError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| RunnerError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    let value: Value = serde_json::from_str(&text).map_err(|e| RunnerError::Tape {
        path: path.to_path_buf(),
        violation: SchemaViolation::new("$", format!("invalid JSON: {e}")),
    })?;
    let tape = validate_tape(&value).map_err(|violation| RunnerError::Tape {
        path: path.to_path_buf(),
        violation,
    })?;
    debug!(path = %path.display(), fragments = tape.stream.len(), "loaded tape");
    Ok(tape)
}

/// Write a tape as pretty-printed JSON, creating parent directories.
///
/// # Errors
///
/// Returns [`RunnerError::Io`] or [`RunnerError::Serde`] on failure.
pub async fn save_tape(path: &Path, tape: &Tape) -> Result<(), RunnerError> {
    let io_err = |source| RunnerError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }
    let mut text = serde_json::to_string_pretty(tape)?;
    text.push('\n');
    tokio::fs::write(path, text).await.map_err(io_err)?;
    info!(
        path = %path.display(),
        fragments = tape.stream.len(),
        "tape written"
    );
    Ok(())
}

/// Structural validation of a parsed tape document.
///
/// # Errors
///
/// Returns [`SchemaViolation`] naming the first offending field.
pub fn validate_tape(value: &Value) -> Result<Tape, SchemaViolation> {
    let root = object(value, "$")?;

    let meta_value = root
        .get("meta")
        .ok_or_else(|| SchemaViolation::new("$.meta", "missing required field"))?;
    let meta_fields = object(meta_value, "$.meta")?;
    let recorded_at = required_str(meta_fields, "$.meta", "recordedAt")?;
    DateTime::parse_from_rfc3339(recorded_at).map_err(|e| {
        SchemaViolation::new("$.meta.recordedAt", format!("expected an RFC 3339 timestamp: {e}"))
    })?;
    let meta = TapeMeta {
        model: required_str(meta_fields, "$.meta", "model")?.to_owned(),
        recorded_at: recorded_at.to_owned(),
        label: optional_str(meta_fields, "$.meta", "label")?,
        sdk: optional_str(meta_fields, "$.meta", "sdk")?,
        comment: optional_str(meta_fields, "$.meta", "comment")?,
        extra: meta_fields
            .iter()
            .filter(|(key, _)| !META_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
    };

    let request = root
        .get("request")
        .ok_or_else(|| SchemaViolation::new("$.request", "missing required field"))?;
    let request_fields = object(request, "$.request")?;
    required_str(request_fields, "$.request", "model")?;
    required_str(request_fields, "$.request", "contents")?;
    object(
        request_fields
            .get("config")
            .ok_or_else(|| SchemaViolation::new("$.request.config", "missing required field"))?,
        "$.request.config",
    )?;

    let entries = match root.get("stream") {
        Some(Value::Array(entries)) => entries,
        Some(_) => return Err(SchemaViolation::new("$.stream", "expected an array")),
        None => return Err(SchemaViolation::new("$.stream", "missing required field")),
    };
    let stream = entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let path = format!("$.stream[{index}]");
            let fields = object(entry, &path)?;
            let delay_ns = fields
                .get("delayNs")
                .ok_or_else(|| SchemaViolation::new(format!("{path}.delayNs"), "missing required field"))?
                .as_u64()
                .ok_or_else(|| {
                    SchemaViolation::new(format!("{path}.delayNs"), "expected a non-negative integer")
                })?;
            Ok(TapeEntry {
                delay_ns,
                text: required_str(fields, &path, "text")?.to_owned(),
            })
        })
        .collect::<Result<Vec<_>, SchemaViolation>>()?;

    Ok(Tape {
        meta,
        request: request.clone(),
        stream,
    })
}

fn object<'a>(value: &'a Value, path: &str) -> Result<&'a Map<String, Value>, SchemaViolation> {
    value
        .as_object()
        .ok_or_else(|| SchemaViolation::new(path, "expected an object"))
}

fn required_str<'a>(
    fields: &'a Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<&'a str, SchemaViolation> {
    match fields.get(key) {
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(SchemaViolation::new(format!("{path}.{key}"), "expected a string")),
        None => Err(SchemaViolation::new(format!("{path}.{key}"), "missing required field")),
    }
}

fn optional_str(
    fields: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<Option<String>, SchemaViolation> {
    match fields.get(key) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(SchemaViolation::new(format!("{path}.{key}"), "expected a string")),
    }
}

// ---------------------------------------------------------------------------
// Recorder
// ---------------------------------------------------------------------------

/// A tee around a live source that writes every session to a tape.
///
/// The caller sees exactly the fragments the inner source yields. The tape
/// is written when the inner stream ends; a failed or abandoned session
/// leaves no tape behind.
pub struct Recorder<S> {
    inner: S,
    path: PathBuf,
    label: Option<String>,
}

impl<S: FragmentSource> Recorder<S> {
    /// Record sessions of `inner` to `path`.
    pub fn new(inner: S, path: impl Into<PathBuf>) -> Self {
        Self {
            inner,
            path: path.into(),
            label: None,
        }
    }

    /// Set the label stored in the tape metadata.
    #[must_use]
    pub fn with_label(mut self, label: Option<String>) -> Self {
        self.label = label;
        self
    }
}

impl<S: FragmentSource> FragmentSource for Recorder<S> {
    fn open(&self, request: &GenerateRequest) -> Result<FragmentStream, RunnerError> {
        let recorded_request = serde_json::to_value(request)?;
        let meta = TapeMeta {
            model: request.model.clone(),
            recorded_at: Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true),
            label: self.label.clone(),
            sdk: Some(format!("forecast-runner/{}", env!("CARGO_PKG_VERSION"))),
            comment: None,
            extra: Map::new(),
        };
        let path = self.path.clone();
        let dispatched = Instant::now();
        let mut upstream = self.inner.open(request)?;

        Ok(Box::pin(async_stream::stream! {
            let mut entries: Vec<TapeEntry> = Vec::new();
            let mut last = dispatched;

            while let Some(item) = upstream.next().await {
                match item {
                    Ok(text) => {
                        let now = Instant::now();
                        let delay_ns = u64::try_from(now.duration_since(last).as_nanos())
                            .unwrap_or(u64::MAX);
                        last = now;
                        entries.push(TapeEntry {
                            delay_ns,
                            text: text.clone(),
                        });
                        yield Ok(text);
                    }
                    Err(e) => {
                        warn!(
                            path = %path.display(),
                            fragments = entries.len(),
                            "provider failed while recording, tape not written"
                        );
                        yield Err(e);
                        return;
                    }
                }
            }

            let tape = Tape {
                meta,
                request: recorded_request,
                stream: entries,
            };
            if let Err(e) = save_tape(&path, &tape).await {
                yield Err(e);
            }
        }))
    }

    fn name(&self) -> &'static str {
        "recorder"
    }
}

// ---------------------------------------------------------------------------
// Replayer
// ---------------------------------------------------------------------------

/// Serves a recorded tape as a fragment source.
#[derive(Debug, Clone)]
pub struct Replayer {
    tape: Tape,
    strict: bool,
}

impl Replayer {
    /// Load a tape file. Strict mode is on.
    ///
    /// # Errors
    ///
    /// See [`load_tape`].
    pub async fn load(path: &Path) -> Result<Self, RunnerError> {
        Ok(Self::from_tape(load_tape(path).await?))
    }

    /// Serve an in-memory tape. Strict mode is on.
    pub const fn from_tape(tape: Tape) -> Self {
        Self { tape, strict: true }
    }

    /// Turn request comparison on or off.
    #[must_use]
    pub const fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// The tape being served.
    pub const fn tape(&self) -> &Tape {
        &self.tape
    }

    /// Compare `request` against the recorded one.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::ReplayMismatch`] locating the first difference.
    pub fn verify(&self, request: &GenerateRequest) -> Result<(), RunnerError> {
        let rebuilt = serde_json::to_value(request)?;
        match first_difference(&self.tape.request, &rebuilt, "$") {
            None => Ok(()),
            Some(diff) => Err(RunnerError::ReplayMismatch {
                path: diff.path,
                recorded: diff.recorded,
                rebuilt: diff.rebuilt,
            }),
        }
    }
}

impl FragmentSource for Replayer {
    fn open(&self, request: &GenerateRequest) -> Result<FragmentStream, RunnerError> {
        if self.strict {
            self.verify(request)?;
        }
        let entries = self.tape.stream.clone();
        debug!(fragments = entries.len(), strict = self.strict, "replaying tape");

        Ok(Box::pin(async_stream::stream! {
            for entry in entries {
                if entry.delay_ns > 0 {
                    tokio::time::sleep(Duration::from_nanos(entry.delay_ns)).await;
                }
                yield Ok(entry.text);
            }
        }))
    }

    fn name(&self) -> &'static str {
        "replayer"
    }
}

// ---------------------------------------------------------------------------
// Request comparison
// ---------------------------------------------------------------------------

/// The first place two JSON documents disagree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Difference {
    /// `JSONPath`-like location.
    pub path: String,
    /// Excerpt of the recorded value.
    pub recorded: String,
    /// Excerpt of the rebuilt value.
    pub rebuilt: String,
}

/// Walk both documents in key order and report the first difference.
pub fn first_difference(recorded: &Value, rebuilt: &Value, path: &str) -> Option<Difference> {
    match (recorded, rebuilt) {
        (Value::Object(left), Value::Object(right)) => {
            let keys: BTreeSet<&String> = left.keys().chain(right.keys()).collect();
            keys.into_iter().find_map(|key| {
                let child = format!("{path}.{key}");
                match (left.get(key), right.get(key)) {
                    (Some(l), Some(r)) => first_difference(l, r, &child),
                    (l, r) => Some(difference(child, l, r)),
                }
            })
        }
        (Value::Array(left), Value::Array(right)) => {
            let len = left.len().max(right.len());
            (0..len).find_map(|index| {
                let child = format!("{path}[{index}]");
                match (left.get(index), right.get(index)) {
                    (Some(l), Some(r)) => first_difference(l, r, &child),
                    (l, r) => Some(difference(child, l, r)),
                }
            })
        }
        (Value::String(left), Value::String(right)) if left != right => {
            let at = diverge_at(left, right);
            Some(Difference {
                path: path.to_owned(),
                recorded: string_excerpt(left, at),
                rebuilt: string_excerpt(right, at),
            })
        }
        (left, right) if left != right => {
            Some(difference(path.to_owned(), Some(left), Some(right)))
        }
        _ => None,
    }
}

fn difference(path: String, recorded: Option<&Value>, rebuilt: Option<&Value>) -> Difference {
    Difference {
        path,
        recorded: recorded.map_or_else(|| ABSENT.to_owned(), excerpt),
        rebuilt: rebuilt.map_or_else(|| ABSENT.to_owned(), excerpt),
    }
}

/// Byte offset of the first differing character of two strings.
fn diverge_at(left: &str, right: &str) -> usize {
    left.char_indices()
        .zip(right.chars())
        .find(|((_, l), r)| l != r)
        .map_or_else(|| left.len().min(right.len()), |((index, _), _)| index)
}

/// Quote `text` from byte offset `at`, marking a skipped common prefix.
fn string_excerpt(text: &str, at: usize) -> String {
    let tail = excerpt(&Value::String(text.get(at..).unwrap_or(text).to_owned()));
    if at == 0 {
        tail
    } else {
        format!("...{tail}")
    }
}

fn excerpt(value: &Value) -> String {
    let text = value.to_string();
    if text.chars().count() <= EXCERPT_CHARS {
        return text;
    }
    let mut cut: String = text.chars().take(EXCERPT_CHARS).collect();
    cut.push_str("...");
    cut
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::llm::ScriptedSource;
    use crate::prompt::{RequestOptions, build_request};

    fn request(system: &str) -> GenerateRequest {
        build_request("gemini-2.5-flash", &[], system, &RequestOptions::default()).unwrap()
    }

    fn tape(entries: &[(u64, &str)]) -> Tape {
        Tape {
            meta: TapeMeta {
                model: "gemini-2.5-flash".to_owned(),
                recorded_at: "2025-01-01T12:00:00.123456789Z".to_owned(),
                label: Some("opening turn".to_owned()),
                sdk: None,
                comment: None,
                extra: Map::new(),
            },
            request: serde_json::to_value(request("Be the game master.")).unwrap(),
            stream: entries
                .iter()
                .map(|(delay_ns, text)| TapeEntry {
                    delay_ns: *delay_ns,
                    text: (*text).to_owned(),
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn tape_file_round_trips_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixtures").join("turn.json");
        let original = tape(&[(5_000_000, "[{\"a\":1}]"), (0, "{\"b\":2}")]);
        save_tape(&path, &original).await.unwrap();
        let first = tokio::fs::read_to_string(&path).await.unwrap();

        let loaded = load_tape(&path).await.unwrap();
        assert_eq!(loaded, original);

        save_tape(&path, &loaded).await.unwrap();
        let second = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn foreign_tape_metadata_survives_a_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("foreign.json");
        let mut value = serde_json::to_value(tape(&[(1, "{}")])).unwrap();
        value["meta"]["recordedAt"] = json!("2025-01-01T14:00:00+02:00");
        value["meta"]["host"] = json!({"os": "linux"});
        tokio::fs::write(&path, serde_json::to_string(&value).unwrap())
            .await
            .unwrap();

        let loaded = load_tape(&path).await.unwrap();
        assert_eq!(loaded.meta.recorded_at, "2025-01-01T14:00:00+02:00");
        save_tape(&path, &loaded).await.unwrap();

        let rewritten: Value =
            serde_json::from_str(&tokio::fs::read_to_string(&path).await.unwrap()).unwrap();
        assert_eq!(rewritten, value);
    }

    #[test]
    fn malformed_tape_names_the_field() {
        let mut value = serde_json::to_value(tape(&[(1, "x"), (2, "y")])).unwrap();
        value["stream"][1]["delayNs"] = json!(-4);
        let err = validate_tape(&value).unwrap_err();
        assert_eq!(err.path, "$.stream[1].delayNs");

        let mut value = serde_json::to_value(tape(&[])).unwrap();
        value["meta"]["recordedAt"] = json!("yesterday");
        assert_eq!(validate_tape(&value).unwrap_err().path, "$.meta.recordedAt");

        let mut value = serde_json::to_value(tape(&[])).unwrap();
        value.as_object_mut().unwrap().remove("request");
        assert_eq!(validate_tape(&value).unwrap_err().path, "$.request");
    }

    #[tokio::test]
    async fn unreadable_tape_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = Replayer::load(&dir.path().join("missing.json")).await;
        assert!(matches!(result, Err(RunnerError::Io { .. })));
    }

    #[test]
    fn strict_replay_rejects_a_changed_system_prompt() {
        let replayer = Replayer::from_tape(tape(&[(0, "x")]));
        let result = replayer.open(&request("Be a different game master."));
        assert!(matches!(
            result,
            Err(RunnerError::ReplayMismatch { ref path, ref recorded, ref rebuilt })
                if path == "$.config.systemInstruction"
                    && recorded == "...\"the game master.\""
                    && rebuilt == "...\"a different game master.\""
        ));
    }

    #[tokio::test]
    async fn lenient_replay_ignores_the_request() {
        let replayer = Replayer::from_tape(tape(&[(0, "x")])).with_strict(false);
        let items: Vec<_> = replayer
            .open(&request("anything"))
            .unwrap()
            .collect()
            .await;
        assert_eq!(items.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn replay_honours_recorded_delays() {
        let replayer = Replayer::from_tape(tape(&[(2_000_000_000, "a"), (500_000_000, "b")]));
        let started = Instant::now();
        let mut stream = replayer.open(&request("Be the game master.")).unwrap();

        assert_eq!(stream.next().await.unwrap().unwrap(), "a");
        assert!(started.elapsed() >= Duration::from_millis(2000));
        assert_eq!(stream.next().await.unwrap().unwrap(), "b");
        assert!(started.elapsed() >= Duration::from_millis(2500));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_stream_cancels_the_pending_wait() {
        let replayer = Replayer::from_tape(tape(&[(3_600_000_000_000, "late")]));
        let mut stream = replayer.open(&request("Be the game master.")).unwrap();
        let pending = tokio::time::timeout(Duration::from_secs(1), stream.next()).await;
        assert!(pending.is_err());
        drop(stream);
    }

    #[tokio::test(start_paused = true)]
    async fn recorder_is_a_transparent_tee() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tape.json");
        let recorder = Recorder::new(ScriptedSource::new(["one", "two"]), &path)
            .with_label(Some("smoke".to_owned()));
        let req = request("Be the game master.");

        let seen: Vec<String> = recorder
            .open(&req)
            .unwrap()
            .map(Result::unwrap)
            .collect()
            .await;
        assert_eq!(seen, vec!["one", "two"]);

        let recorded = load_tape(&path).await.unwrap();
        assert_eq!(recorded.request, serde_json::to_value(&req).unwrap());
        assert_eq!(recorded.meta.label.as_deref(), Some("smoke"));
        assert_eq!(recorded.text(), "onetwo");
        assert!(Replayer::from_tape(recorded).verify(&req).is_ok());
    }

    #[tokio::test]
    async fn failed_recording_writes_no_tape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tape.json");
        let recorder = Recorder::new(ScriptedSource::new(["one"]).failing_with("boom"), &path);
        let items: Vec<_> = recorder
            .open(&request("s"))
            .unwrap()
            .collect()
            .await;
        assert_eq!(items.len(), 2);
        assert!(!path.exists());
    }

    #[test]
    fn first_difference_reports_missing_keys_and_indices() {
        let recorded = json!({"config": {"seed": 1}, "list": [1, 2]});
        let rebuilt = json!({"config": {}, "list": [1, 2, 3]});
        let diff = first_difference(&recorded, &rebuilt, "$").unwrap();
        assert_eq!(diff.path, "$.config.seed");
        assert_eq!(diff.rebuilt, "<absent>");

        let recorded = json!({"list": [1, 2]});
        let rebuilt = json!({"list": [1, 2, 3]});
        let diff = first_difference(&recorded, &rebuilt, "$").unwrap();
        assert_eq!(diff.path, "$.list[2]");
        assert_eq!(diff.recorded, "<absent>");
        assert_eq!(diff.rebuilt, "3");

        assert!(first_difference(&recorded, &recorded.clone(), "$").is_none());
    }
}
