//! Game-master turn orchestration.
//!
//! One call to [`TurnRunner::run_turn`] plays a full game-master turn:
//! 1. Derive the turn window `[next_date, next_date + turn_days - 1]`
//! 2. Append `turn-started` for the game master
//! 3. Render the system prompt and project the history into a request
//! 4. Open the fragment source (live, recording, or replaying)
//! 5. Ingest fragments one at a time
//! 6. Append `turn-finished` if the stream completed
//! 7. Sort and de-duplicate the history
//!
//! Failures before the stream opens (template, mismatch) leave the caller's
//! history untouched. Failures during the stream keep every event folded so
//! far; the outcome carries both the history and the reason it stopped.

use forecast_events::{
    OrderingInconsistency, latest_date, next_date_after, next_date_after_or, project_visible,
    sort_and_dedupe,
};
use forecast_types::{Event, EventDate, TurnActor, TurnWindow};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::RunnerConfig;
use crate::error::RunnerError;
use crate::ingest::{StreamEnd, ingest};
use crate::llm::FragmentSource;
use crate::prompt::{GenerateRequest, PromptEngine, RequestOptions, SystemContext, build_request};

/// Settings that shape every turn.
#[derive(Debug, Clone)]
pub struct TurnSettings {
    /// Model identifier placed in each request.
    pub model: String,
    /// Request shaping options.
    pub options: RequestOptions,
    /// Length of the game-master window in days (at least 1).
    pub turn_days: u64,
    /// Next date used when the history is empty; today (UTC) if unset.
    pub today: Option<EventDate>,
}

impl TurnSettings {
    /// Turn settings taken from the runner configuration.
    pub fn from_config(config: &RunnerConfig) -> Self {
        Self {
            model: config.backend.model.clone(),
            options: config.options.clone(),
            turn_days: config.turn_days,
            today: config.today,
        }
    }
}

/// A prepared turn: its window and the exact provider request.
#[derive(Debug, Clone)]
pub struct TurnPlan {
    /// The game master's window.
    pub window: TurnWindow,
    /// History with `turn-started` appended.
    pub history: Vec<Event>,
    /// The request to send.
    pub request: GenerateRequest,
}

/// Result of a turn that got as far as opening the stream.
#[derive(Debug)]
pub struct TurnOutcome {
    /// The game master's window.
    pub window: TurnWindow,
    /// Sorted and de-duplicated history, including partial work.
    pub history: Vec<Event>,
    /// Events ingested from the provider.
    pub appended: usize,
    /// How the provider stream ended.
    pub end: StreamEnd,
    /// Patches that target unknown stories after this turn.
    pub inconsistencies: Vec<OrderingInconsistency>,
}

/// Plays game-master turns against a fragment source.
pub struct TurnRunner {
    prompt_engine: PromptEngine,
    settings: TurnSettings,
}

impl TurnRunner {
    /// Create a turn runner.
    pub const fn new(prompt_engine: PromptEngine, settings: TurnSettings) -> Self {
        Self {
            prompt_engine,
            settings,
        }
    }

    /// The settings in use.
    pub const fn settings(&self) -> &TurnSettings {
        &self.settings
    }

    /// Compute the window and request for the next turn without running it.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Config`] if the window runs past the calendar,
    /// [`RunnerError::Template`] if the system prompt fails to render.
    pub fn plan(&self, history: &[Event]) -> Result<TurnPlan, RunnerError> {
        let from = match self.settings.today {
            Some(today) => next_date_after_or(history, today),
            None => next_date_after(history),
        };
        let until = self
            .settings
            .turn_days
            .checked_sub(1)
            .and_then(|extra| from.plus_days(extra))
            .ok_or_else(|| {
                RunnerError::Config(format!(
                    "turn of {} days starting {from} is out of range",
                    self.settings.turn_days
                ))
            })?;
        let window = TurnWindow {
            actor: TurnActor::GameMaster,
            from,
            until,
        };

        let system = self.prompt_engine.render_system(&SystemContext {
            next_date: from,
            turn_until: until,
            latest_date: latest_date(history),
            max_events: self.settings.options.max_events,
        })?;

        let mut working = Vec::with_capacity(history.len().saturating_add(1));
        working.extend_from_slice(history);
        working.push(Event::TurnStarted(window.clone()));

        let request = build_request(
            &self.settings.model,
            &working,
            &system,
            &self.settings.options,
        )?;

        Ok(TurnPlan {
            window,
            history: working,
            request,
        })
    }

    /// Play one game-master turn.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError`] if the turn cannot be planned or the source
    /// refuses the request (e.g. [`RunnerError::ReplayMismatch`]). Stream
    /// failures are reported in [`TurnOutcome::end`] instead.
    pub async fn run_turn(
        &self,
        history: &[Event],
        source: &dyn FragmentSource,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, RunnerError> {
        let plan = self.plan(history)?;
        info!(
            source = source.name(),
            from = %plan.window.from,
            until = %plan.window.until,
            prior_events = history.len(),
            "game master turn started"
        );

        let stream = source.open(&plan.request)?;
        let ingested = ingest(stream, plan.history, cancel).await;

        // Index `history.len()` holds the turn-started marker.
        let provider_events = ingested
            .history
            .iter()
            .skip(history.len().saturating_add(1));
        for event in provider_events {
            let date = event.date();
            if date < plan.window.from || date > plan.window.until {
                warn!(
                    kind = event.kind(),
                    %date,
                    from = %plan.window.from,
                    until = %plan.window.until,
                    "provider event dated outside the turn window"
                );
            }
        }

        let completed = ingested.is_completed();
        let mut folded = ingested.history;
        if completed {
            folded.push(Event::TurnFinished(plan.window.clone()));
        } else {
            warn!(end = ?ingested.end, appended = ingested.appended, "turn ended early");
        }
        let history = sort_and_dedupe(folded);
        let inconsistencies = project_visible(&history).inconsistencies;

        info!(
            appended = ingested.appended,
            total_events = history.len(),
            inconsistencies = inconsistencies.len(),
            "game master turn finished"
        );

        Ok(TurnOutcome {
            window: plan.window,
            history,
            appended: ingested.appended,
            end: ingested.end,
            inconsistencies,
        })
    }
}
