//! Provider boundary: anything that turns a request into text fragments.
//!
//! The runner depends only on [`FragmentSource`]: given a
//! [`GenerateRequest`], return a finite stream of text fragments. The stream
//! is pull-based; dropping it stops further reads from the provider.
//!
//! [`GeminiBackend`] speaks the `streamGenerateContent?alt=sse` protocol over
//! `reqwest`, framing the body with `eventsource-stream`. Provider deltas can split a record anywhere, so the backend
//! reassembles them with [`RecordSplitter`] and emits one complete command
//! object per fragment. [`ScriptedSource`] replays a fixed fragment list and
//! is what the tests drive the pipeline with.

use std::pin::{Pin, pin};
use std::sync::Mutex;

use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::config::BackendConfig;
use crate::error::RunnerError;
use crate::prompt::GenerateRequest;

/// A stream of raw text fragments from a provider.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, RunnerError>> + Send>>;

/// A provider of text fragments for a request.
pub trait FragmentSource: Send + Sync {
    /// Open a fragment stream for `request`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request is refused before any fragment is
    /// produced (for example a replay tape that does not match).
    fn open(&self, request: &GenerateRequest) -> Result<FragmentStream, RunnerError>;

    /// Human-readable name for logging.
    fn name(&self) -> &'static str;
}

// ---------------------------------------------------------------------------
// Gemini streaming backend
// ---------------------------------------------------------------------------

/// Backend for the Gemini `streamGenerateContent` API.
///
/// Sends requests to `{api_url}/models/{model}:streamGenerateContent?alt=sse`
/// with the key in the `x-goog-api-key` header.
pub struct GeminiBackend {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl GeminiBackend {
    /// Create a new Gemini backend.
    pub fn new(config: &BackendConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: config.api_url.trim_end_matches('/').to_owned(),
            api_key: config.api_key.clone(),
        }
    }
}

impl FragmentSource for GeminiBackend {
    fn open(&self, request: &GenerateRequest) -> Result<FragmentStream, RunnerError> {
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.api_url, request.model
        );
        let body = gemini_body(request);
        let http = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body);

        let stream = async_stream::stream! {
            let response = match http.send().await {
                Ok(response) => response,
                Err(e) => {
                    yield Err(RunnerError::LlmBackend(format!("Gemini request failed: {e}")));
                    return;
                }
            };

            let status = response.status();
            if !status.is_success() {
                let error_body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "unable to read error body".to_owned());
                yield Err(RunnerError::LlmBackend(format!(
                    "Gemini returned {status}: {error_body}"
                )));
                return;
            }

            let mut events = pin!(response.bytes_stream().eventsource());
            let mut splitter = RecordSplitter::default();

            while let Some(event) = events.next().await {
                let event = match event {
                    Ok(event) => event,
                    Err(e) => {
                        yield Err(RunnerError::LlmBackend(format!("Gemini stream broke: {e}")));
                        return;
                    }
                };
                match event_text(&event.data) {
                    Ok(Some(delta)) => {
                        for record in splitter.push(&delta) {
                            yield Ok(record);
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }

            if let Some(rest) = splitter.finish() {
                debug!(len = rest.len(), "provider stream left a trailing fragment");
                yield Ok(rest);
            }
        };

        Ok(Box::pin(stream))
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

/// Translate a [`GenerateRequest`] into the Gemini wire body.
fn gemini_body(request: &GenerateRequest) -> Value {
    let mut generation = Map::new();
    generation.insert(
        "responseMimeType".to_owned(),
        Value::String(request.config.response_mime_type.clone()),
    );
    if let Some(temperature) = request.config.temperature {
        generation.insert("temperature".to_owned(), json!(temperature));
    }
    if let Some(seed) = request.config.seed {
        generation.insert("seed".to_owned(), json!(seed));
    }
    if let Some(tokens) = request.config.max_output_tokens {
        generation.insert("maxOutputTokens".to_owned(), json!(tokens));
    }

    json!({
        "contents": [{"role": "user", "parts": [{"text": request.contents}]}],
        "systemInstruction": {"parts": [{"text": request.config.system_instruction}]},
        "generationConfig": Value::Object(generation),
    })
}

/// Text carried by one SSE event payload, if it has text parts.
fn event_text(data: &str) -> Result<Option<String>, RunnerError> {
    let payload = data.trim();
    if payload.is_empty() {
        return Ok(None);
    }
    let json: Value = serde_json::from_str(payload)
        .map_err(|e| RunnerError::LlmBackend(format!("Gemini event parse failed: {e}")))?;
    if let Some(error) = json.get("error") {
        return Err(RunnerError::LlmBackend(format!("Gemini stream error: {error}")));
    }
    Ok(extract_gemini_text(&json))
}

/// Concatenate `candidates[0].content.parts[*].text`.
fn extract_gemini_text(json: &Value) -> Option<String> {
    let parts = json
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(Value::as_array)?;
    let text: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    (!text.is_empty()).then_some(text)
}

// ---------------------------------------------------------------------------
// Record reassembly
// ---------------------------------------------------------------------------

/// Cuts a stream of text deltas into complete top-level JSON objects.
///
/// Objects are found by brace depth, ignoring braces inside string literals.
/// Anything between objects (array brackets, commas, whitespace, code
/// fences) is discarded, except that an array closed without any object in
/// it is reported by [`finish`](Self::finish) as an empty batch.
#[derive(Debug, Default)]
pub struct RecordSplitter {
    current: String,
    depth: u32,
    in_string: bool,
    escaped: bool,
    emitted: bool,
    opened_array: bool,
    closed_array: bool,
}

impl RecordSplitter {
    /// Feed a delta and return every object it completes.
    pub fn push(&mut self, delta: &str) -> Vec<String> {
        let mut complete = Vec::new();
        for c in delta.chars() {
            if self.depth == 0 {
                match c {
                    '{' => {
                        self.current.push(c);
                        self.depth = 1;
                    }
                    '[' => self.opened_array = true,
                    ']' => self.closed_array = true,
                    _ => {}
                }
                continue;
            }
            self.current.push(c);
            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if c == '\\' {
                    self.escaped = true;
                } else if c == '"' {
                    self.in_string = false;
                }
                continue;
            }
            match c {
                '"' => self.in_string = true,
                '{' => self.depth = self.depth.saturating_add(1),
                '}' => {
                    self.depth = self.depth.saturating_sub(1);
                    if self.depth == 0 {
                        self.emitted = true;
                        complete.push(std::mem::take(&mut self.current));
                    }
                }
                _ => {}
            }
        }
        complete
    }

    /// Return an unterminated trailing object, if any, or `[]` when the
    /// text was an array holding no objects at all.
    pub fn finish(&mut self) -> Option<String> {
        let empty_batch = !self.emitted && self.opened_array && self.closed_array;
        let rest = std::mem::take(&mut self.current);
        *self = Self::default();
        if !rest.trim().is_empty() {
            Some(rest)
        } else if empty_batch {
            Some("[]".to_owned())
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Scripted source
// ---------------------------------------------------------------------------

/// A source that yields a fixed list of fragments, optionally followed by a
/// failure. Every request it is opened with is kept for inspection.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    fragments: Vec<String>,
    failure: Option<String>,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl ScriptedSource {
    /// Create a source yielding `fragments` in order.
    pub fn new<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fragments: fragments.into_iter().map(Into::into).collect(),
            failure: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Fail with a [`RunnerError::StreamFailure`] after the last fragment.
    #[must_use]
    pub fn failing_with(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Requests this source has been opened with, oldest first.
    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests
            .lock()
            .map(|seen| seen.to_vec())
            .unwrap_or_default()
    }
}

impl FragmentSource for ScriptedSource {
    fn open(&self, request: &GenerateRequest) -> Result<FragmentStream, RunnerError> {
        if let Ok(mut seen) = self.requests.lock() {
            seen.push(request.clone());
        }
        let fragments = self.fragments.clone();
        let failure = self.failure.clone();
        Ok(Box::pin(async_stream::stream! {
            for fragment in fragments {
                yield Ok(fragment);
            }
            if let Some(message) = failure {
                yield Err(RunnerError::StreamFailure(message));
            }
        }))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
