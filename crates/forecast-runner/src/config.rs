//! Configuration types for the forecast runner.
//!
//! All configuration is loaded from environment variables. The runner needs
//! to know where the game history lives, how to reach the provider, which
//! tape to record to or replay from, and how to shape the request.

use std::path::PathBuf;

use forecast_types::EventDate;

use crate::error::RunnerError;
use crate::prompt::RequestOptions;

/// Default provider base URL.
const DEFAULT_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default length of a game-master turn in days.
const DEFAULT_TURN_DAYS: u64 = 7;

/// Complete runner configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Where fragments come from.
    pub mode: RunMode,
    /// JSON-Lines history file, read before the turn and rewritten after.
    pub history_path: PathBuf,
    /// Directory holding `system.j2`.
    pub templates_dir: String,
    /// Provider connection settings.
    pub backend: BackendConfig,
    /// Tape file for record and replay modes.
    pub tape_path: Option<PathBuf>,
    /// Label stored in recorded tape metadata.
    pub tape_label: Option<String>,
    /// Whether replay compares the rebuilt request against the tape.
    pub replay_strict: bool,
    /// Request shaping options.
    pub options: RequestOptions,
    /// Length of a game-master turn window in days.
    pub turn_days: u64,
    /// Date used as "next date" when the history is empty.
    ///
    /// Pinning this keeps replays of a fresh game reproducible.
    pub today: Option<EventDate>,
}

/// Provider connection settings.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Base API URL (e.g. `https://generativelanguage.googleapis.com/v1beta`).
    pub api_url: String,
    /// API key; empty in replay mode.
    pub api_key: String,
    /// Model identifier, also recorded in every request.
    pub model: String,
}

/// Where the runner gets provider fragments from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Call the provider.
    Live,
    /// Call the provider and record a tape.
    Record,
    /// Replay a recorded tape.
    Replay,
}

impl RunMode {
    /// Parse a mode name (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Config`] for an unknown mode.
    pub fn parse(raw: &str) -> Result<Self, RunnerError> {
        match raw.to_lowercase().as_str() {
            "live" => Ok(Self::Live),
            "record" => Ok(Self::Record),
            "replay" => Ok(Self::Replay),
            other => Err(RunnerError::Config(format!("unknown FORECAST_MODE: {other}"))),
        }
    }

    /// Whether the mode talks to the real provider.
    pub const fn needs_provider(self) -> bool {
        matches!(self, Self::Live | Self::Record)
    }
}

impl RunnerConfig {
    /// Load configuration from environment variables.
    ///
    /// Required variables:
    /// - `FORECAST_HISTORY` -- JSON-Lines history path
    /// - `LLM_MODEL` -- model identifier
    /// - `LLM_API_KEY` -- provider key (live and record modes)
    /// - `FORECAST_TAPE` -- tape path (record and replay modes)
    ///
    /// Optional variables:
    /// - `FORECAST_MODE` -- `live`, `record`, or `replay` (default `live`)
    /// - `LLM_API_URL` -- provider base URL
    /// - `FORECAST_TEMPLATES_DIR` -- prompt templates (default `templates`)
    /// - `FORECAST_TAPE_LABEL` -- label for recorded tapes
    /// - `REPLAY_STRICT` -- compare requests on replay (default `true`)
    /// - `LLM_TEMPERATURE`, `LLM_SEED`, `FORECAST_MAX_EVENTS` -- request options
    /// - `FORECAST_TURN_DAYS` -- game-master turn length (default 7)
    /// - `FORECAST_TODAY` -- fallback "next date" for empty histories
    pub fn from_env() -> Result<Self, RunnerError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// [`RunnerConfig::from_env`] delegates here; tests pass a map instead of
    /// mutating the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, RunnerError> {
        let required = |name: &str| {
            lookup(name)
                .filter(|value| !value.is_empty())
                .ok_or_else(|| RunnerError::Config(format!("missing required env var {name}")))
        };

        let mode = lookup("FORECAST_MODE")
            .map_or(Ok(RunMode::Live), |raw| RunMode::parse(&raw))?;

        let history_path = PathBuf::from(required("FORECAST_HISTORY")?);
        let model = required("LLM_MODEL")?;
        let api_key = if mode.needs_provider() {
            required("LLM_API_KEY")?
        } else {
            String::new()
        };
        let api_url = lookup("LLM_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_owned());

        let tape_path = match mode {
            RunMode::Live => lookup("FORECAST_TAPE").map(PathBuf::from),
            RunMode::Record | RunMode::Replay => Some(PathBuf::from(required("FORECAST_TAPE")?)),
        };

        let replay_strict = parse_var(&lookup, "REPLAY_STRICT")?.unwrap_or(true);
        let turn_days = parse_var(&lookup, "FORECAST_TURN_DAYS")?.unwrap_or(DEFAULT_TURN_DAYS);
        if turn_days == 0 {
            return Err(RunnerError::Config(
                "FORECAST_TURN_DAYS must be at least 1".to_owned(),
            ));
        }

        let options = RequestOptions {
            temperature: parse_var(&lookup, "LLM_TEMPERATURE")?,
            seed: parse_var(&lookup, "LLM_SEED")?,
            max_events: parse_var(&lookup, "FORECAST_MAX_EVENTS")?,
        };

        let today = lookup("FORECAST_TODAY")
            .map(|raw| {
                EventDate::parse(&raw)
                    .map_err(|e| RunnerError::Config(format!("invalid FORECAST_TODAY: {e}")))
            })
            .transpose()?;

        Ok(Self {
            mode,
            history_path,
            templates_dir: lookup("FORECAST_TEMPLATES_DIR")
                .unwrap_or_else(|| "templates".to_owned()),
            backend: BackendConfig {
                api_url,
                api_key,
                model,
            },
            tape_path,
            tape_label: lookup("FORECAST_TAPE_LABEL"),
            replay_strict,
            options,
            turn_days,
            today,
        })
    }
}

/// Parse an optional variable, failing loudly on malformed values.
fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>, RunnerError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    lookup(name)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| RunnerError::Config(format!("invalid {name}: {e}")))
        })
        .transpose()
}
