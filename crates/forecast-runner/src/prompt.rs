//! System prompt rendering and provider request construction.
//!
//! The system instruction is loaded from `system.j2` via `minijinja` so the
//! game master's voice can be tuned without recompiling. The user content is
//! the deterministic history projection from [`crate::projector`].
//!
//! [`GenerateRequest`] is exactly what a replay tape stores and compares.
//! Every mapping in here (field names, the `maxEvents` budget, the response
//! MIME type) is part of the tape contract and must stay stable.

use forecast_types::{Event, EventDate};
use minijinja::{Environment, context};
use serde::{Deserialize, Serialize};

use crate::error::RunnerError;
use crate::projector::project;

/// MIME type requested from the provider.
pub const RESPONSE_MIME_TYPE: &str = "application/json";

/// Floor of the output token budget.
const MIN_OUTPUT_TOKENS: u32 = 256;

/// Output tokens granted per requested event.
const TOKENS_PER_EVENT: u32 = 128;

/// Caller-tunable request shaping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOptions {
    /// Sampling temperature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Sampling seed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    /// Upper bound on events per response, translated into a token budget.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_events: Option<u32>,
}

/// Provider configuration carried inside a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateConfig {
    /// The rendered system instruction.
    pub system_instruction: String,
    /// Requested response MIME type.
    pub response_mime_type: String,
    /// Sampling temperature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Sampling seed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    /// Output token budget derived from `maxEvents`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

/// The complete request sent to a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Model identifier.
    pub model: String,
    /// The projected history.
    pub contents: String,
    /// System instruction and response shaping.
    pub config: GenerateConfig,
}

/// Token budget for a response of at most `max_events` events.
pub fn max_output_tokens(max_events: u32) -> u32 {
    max_events
        .saturating_mul(TOKENS_PER_EVENT)
        .max(MIN_OUTPUT_TOKENS)
}

/// Build the provider request for a history.
///
/// # Errors
///
/// Returns [`RunnerError::Serde`] if the history cannot be projected.
pub fn build_request(
    model: &str,
    history: &[Event],
    system_instruction: &str,
    options: &RequestOptions,
) -> Result<GenerateRequest, RunnerError> {
    Ok(GenerateRequest {
        model: model.to_owned(),
        contents: project(history)?,
        config: GenerateConfig {
            system_instruction: system_instruction.to_owned(),
            response_mime_type: RESPONSE_MIME_TYPE.to_owned(),
            temperature: options.temperature,
            seed: options.seed,
            max_output_tokens: options.max_events.map(max_output_tokens),
        },
    })
}

/// Values in scope when rendering the system template.
#[derive(Debug, Clone)]
pub struct SystemContext {
    /// First day the game master may write about.
    pub next_date: EventDate,
    /// Last day of the game master's turn.
    pub turn_until: EventDate,
    /// Latest date already in the history.
    pub latest_date: Option<EventDate>,
    /// Event budget, if any.
    pub max_events: Option<u32>,
}

/// Loads and renders the system instruction template.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    /// Create a prompt engine loading `system.j2` from the given directory.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Template`] if the file is missing or invalid.
    pub fn new(templates_dir: &str) -> Result<Self, RunnerError> {
        let path = format!("{templates_dir}/system.j2");
        let source = std::fs::read_to_string(&path)
            .map_err(|e| RunnerError::Template(format!("failed to read {path}: {e}")))?;
        Self::from_source(source)
    }

    /// Create a prompt engine from template source text.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Template`] if the template does not compile.
    pub fn from_source(source: String) -> Result<Self, RunnerError> {
        let mut env = Environment::new();
        env.add_template_owned("system", source)
            .map_err(|e| RunnerError::Template(format!("failed to add system template: {e}")))?;
        Ok(Self { env })
    }

    /// Render the system instruction.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Template`] if rendering fails.
    pub fn render_system(&self, ctx: &SystemContext) -> Result<String, RunnerError> {
        self.env
            .get_template("system")
            .map_err(|e| RunnerError::Template(format!("missing system template: {e}")))?
            .render(context! {
                next_date => ctx.next_date.to_string(),
                turn_until => ctx.turn_until.to_string(),
                latest_date => ctx.latest_date.map(|d| d.to_string()),
                max_events => ctx.max_events,
            })
            .map_err(|e| RunnerError::Template(format!("system render failed: {e}")))
    }
}
