//! Derived dates: where the timeline currently ends and what day comes next.

use forecast_types::{Event, EventDate};

/// The latest date across all events, or `None` for an empty history.
///
/// Turn markers contribute the last day of their window.
pub fn latest_date(events: &[Event]) -> Option<EventDate> {
    events.iter().map(horizon).max()
}

const fn horizon(event: &Event) -> EventDate {
    match event {
        Event::TurnStarted(window) | Event::TurnFinished(window) => window.until,
        _ => event.date(),
    }
}

/// The day after the latest event, or today (UTC) when the history is empty.
///
/// This is the only place generators should ask "what day is it next".
pub fn next_date_after(events: &[Event]) -> EventDate {
    next_date_after_or(events, EventDate::today_utc())
}

/// Like [`next_date_after`], with an explicit fallback for empty histories.
pub fn next_date_after_or(events: &[Event], fallback: EventDate) -> EventDate {
    latest_date(events).map_or(fallback, |latest| latest.next_day().unwrap_or(latest))
}
