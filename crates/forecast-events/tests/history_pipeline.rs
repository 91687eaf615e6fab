//! Integration tests: commands -> events -> ordered history -> projections.
//!
//! Exercises the crate the way the runner does: validate provider commands,
//! normalize them, append to an existing history, close with
//! `sort_and_dedupe`, and read the result back through the projections.

#![allow(clippy::unwrap_used)]

use forecast_events::{
    latest_date, next_date_after, normalize_all, parse_history, project_visible, render_history,
    sort_and_dedupe, validate_command_array, visible_timeline,
};
use forecast_types::{Event, EventDate};
use serde_json::json;

fn date(s: &str) -> EventDate {
    EventDate::parse(s).unwrap()
}

fn seed_history() -> Vec<Event> {
    parse_history(concat!(
        r#"{"type":"news-published","date":"2025-01-01","icon":"Landmark","title":"Budget passes","description":"Parliament approves."}"#,
        "\n",
        r#"{"type":"hidden-news-published","date":"2025-01-01","icon":"Eye","title":"Minister resigns","description":"Not yet public."}"#,
        "\n",
        r#"{"type":"scenario-head-completed","date":"2025-01-01"}"#,
        "\n",
    ))
    .unwrap()
}

#[test]
fn provider_batch_folds_into_history() {
    let commands = validate_command_array(&json!([
        {"type": "publish-news", "date": "2025-01-03", "icon": "Flame", "title": "Protests", "description": "Crowds gather."},
        {"type": "patch-news", "targetId": "news-2025-01-01-budget-passes", "date": "2025-01-02",
         "patch": {"title": "Budget passes narrowly"}},
        {"type": "publish-news", "date": "2025-01-02", "icon": "Coins", "title": "Bond yields rise", "description": "Markets react."}
    ]))
    .unwrap();

    let mut history = seed_history();
    history.extend(normalize_all(commands));
    let history = sort_and_dedupe(history);

    let days: Vec<String> = history.iter().map(|e| e.date().to_string()).collect();
    let mut sorted_days = days.clone();
    sorted_days.sort();
    assert_eq!(days, sorted_days);

    assert_eq!(latest_date(&history), Some(date("2025-01-03")));
    assert_eq!(next_date_after(&history), date("2025-01-04"));

    let timeline = visible_timeline(&history);
    let titles: Vec<&str> = timeline.iter().map(|n| n.title.as_str()).collect();
    assert_eq!(
        titles,
        vec!["Budget passes narrowly", "Bond yields rise", "Protests"]
    );
}

#[test]
fn resubmitted_story_supersedes_the_original() {
    let commands = validate_command_array(&json!([
        {"type": "publish-news", "date": "2025-01-01", "icon": "Landmark", "title": "BUDGET PASSES",
         "description": "Corrected wording."}
    ]))
    .unwrap();
    let mut history = seed_history();
    history.extend(normalize_all(commands));
    let history = sort_and_dedupe(history);

    let projection = project_visible(&history);
    let budget: Vec<_> = projection
        .items
        .iter()
        .filter(|n| n.title.eq_ignore_ascii_case("budget passes"))
        .collect();
    assert_eq!(budget.len(), 1);
    assert_eq!(budget.first().unwrap().description, "Corrected wording.");
}

#[test]
fn history_survives_jsonl_round_trip_after_folding() {
    let commands = validate_command_array(&json!([
        {"type": "game-over", "date": "2025-02-01", "summary": "The government falls."}
    ]))
    .unwrap();
    let mut history = seed_history();
    history.extend(normalize_all(commands));
    let history = sort_and_dedupe(history);

    let text = render_history(&history).unwrap();
    assert_eq!(parse_history(&text).unwrap(), history);
}
