//! Projection of a game history into the provider's textual context.
//!
//! The projected document has two sections:
//!
//! ```text
//! # Journal
//! {"type":"news-published",...}
//! {"type":"news-opened","date":"2025-01-04","ids":["news-...","news-..."]}
//! ...
//!
//! # State
//! {"latestDate":"2025-01-04","currentTurn":null}
//! ```
//!
//! The journal holds one compact JSON record per event, in history order.
//! Each run of consecutive `news-opened` markers collapses into a single
//! summary line. The state block carries the latest date and the turn that
//! is currently open, if any.
//!
//! Output is byte-for-byte deterministic for a given history. Replay tapes
//! compare requests exactly, so any change here invalidates recorded tapes.

use forecast_events::latest_date;
use forecast_types::{Event, EventDate, TurnWindow};
use serde::Serialize;

use crate::error::RunnerError;

/// Header of the journal section.
const JOURNAL_HEADER: &str = "# Journal";

/// Header of the state section.
const STATE_HEADER: &str = "# State";

/// One collapsed run of `news-opened` markers.
#[derive(Serialize)]
struct OpenedSummary<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    date: EventDate,
    ids: &'a [String],
}

/// The trailing state block.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StateBlock<'a> {
    latest_date: Option<EventDate>,
    current_turn: Option<&'a TurnWindow>,
}

/// Accumulates a run of `news-opened` markers.
#[derive(Default)]
struct OpenedRun {
    date: Option<EventDate>,
    ids: Vec<String>,
}

impl OpenedRun {
    fn push(&mut self, id: &str, date: EventDate) {
        self.date = Some(date);
        if !self.ids.iter().any(|seen| seen == id) {
            self.ids.push(id.to_owned());
        }
    }

    fn flush(&mut self, out: &mut String) -> Result<(), RunnerError> {
        if let Some(date) = self.date.take() {
            let summary = OpenedSummary {
                kind: "news-opened",
                date,
                ids: &self.ids,
            };
            out.push_str(&serde_json::to_string(&summary)?);
            out.push('\n');
            self.ids.clear();
        }
        Ok(())
    }
}

/// Render a history as the provider context document.
///
/// # Errors
///
/// Returns [`RunnerError::Serde`] if an event fails to serialize.
pub fn project(history: &[Event]) -> Result<String, RunnerError> {
    let mut out = String::new();
    out.push_str(JOURNAL_HEADER);
    out.push('\n');

    let mut run = OpenedRun::default();
    for event in history {
        if let Event::NewsOpened(opened) = event {
            run.push(&opened.id, opened.date);
            continue;
        }
        run.flush(&mut out)?;
        out.push_str(&serde_json::to_string(event)?);
        out.push('\n');
    }
    run.flush(&mut out)?;

    let state = StateBlock {
        latest_date: latest_date(history),
        current_turn: current_turn(history),
    };
    out.push('\n');
    out.push_str(STATE_HEADER);
    out.push('\n');
    out.push_str(&serde_json::to_string(&state)?);
    out.push('\n');
    Ok(out)
}

/// The turn opened by a `turn-started` that no later `turn-finished` of the
/// same actor has closed.
pub fn current_turn(history: &[Event]) -> Option<&TurnWindow> {
    let mut open: Option<&TurnWindow> = None;
    for event in history {
        match event {
            Event::TurnStarted(window) => open = Some(window),
            Event::TurnFinished(window) => {
                if open.is_some_and(|started| started.actor == window.actor) {
                    open = None;
                }
            }
            _ => {}
        }
    }
    open
}
