//! Ordering and identity-based deduplication of histories.
//!
//! Two publish events (visible or hidden) are the same story when they share
//! a date and a case-insensitive title. On collision the later event in input
//! order wins and keeps its own position, so a resubmitted story supersedes
//! the earlier submission. Histories are then ordered by date, ties keeping
//! input order.

use std::collections::HashMap;

use forecast_types::{Event, EventDate};

/// Identity of a published story: its date and lowercased title.
pub type NewsIdentity = (EventDate, String);

/// The identity key of a publish event, or `None` for any other event.
pub fn news_identity(event: &Event) -> Option<NewsIdentity> {
    event
        .news_item()
        .map(|item| (item.date, item.title.to_lowercase()))
}

/// Deduplicate by story identity (last write wins) and sort by date.
///
/// Idempotent: applying it to its own output returns the same sequence.
pub fn sort_and_dedupe(events: Vec<Event>) -> Vec<Event> {
    let mut last_seen: HashMap<NewsIdentity, usize> = HashMap::new();
    for (index, event) in events.iter().enumerate() {
        if let Some(identity) = news_identity(event) {
            last_seen.insert(identity, index);
        }
    }

    let mut kept: Vec<Event> = events
        .into_iter()
        .enumerate()
        .filter(|(index, event)| {
            news_identity(event)
                .and_then(|identity| last_seen.get(&identity))
                .is_none_or(|winner| winner == index)
        })
        .map(|(_, event)| event)
        .collect();

    // `sort_by_key` is stable, which keeps insertion order within a day.
    kept.sort_by_key(Event::date);
    kept
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use forecast_types::{GameOver, NewsItem, ScenarioHeadCompleted};

    use super::*;

    fn date(s: &str) -> EventDate {
        EventDate::parse(s).unwrap()
    }

    fn news(day: &str, title: &str, description: &str) -> Event {
        Event::NewsPublished(NewsItem {
            id: None,
            date: date(day),
            icon: "Newspaper".to_owned(),
            title: title.to_owned(),
            description: description.to_owned(),
            post_mortem: None,
        })
    }

    #[test]
    fn sorts_by_date_keeping_input_order_within_a_day() {
        let events = vec![
            news("2025-01-03", "C", "c"),
            news("2025-01-01", "A", "a"),
            news("2025-01-03", "B", "b"),
            Event::ScenarioHeadCompleted(ScenarioHeadCompleted {
                date: date("2025-01-02"),
            }),
        ];
        let sorted = sort_and_dedupe(events);
        let titles: Vec<String> = sorted
            .iter()
            .map(|e| e.news_item().map_or_else(|| e.kind().to_owned(), |i| i.title.clone()))
            .collect();
        assert_eq!(titles, vec!["A", "scenario-head-completed", "C", "B"]);
    }

    #[test]
    fn case_only_title_difference_keeps_exactly_one() {
        let events = vec![
            news("2025-01-02", "Rate Cut", "first"),
            news("2025-01-02", "rate cut", "second"),
        ];
        let deduped = sort_and_dedupe(events);
        assert_eq!(deduped.len(), 1);
    }

    #[test]
    fn last_write_wins_on_collision() {
        let events = vec![
            news("2025-01-02", "Rate Cut", "first"),
            news("2025-01-01", "Other", "x"),
            news("2025-01-02", "RATE CUT", "second"),
        ];
        let deduped = sort_and_dedupe(events);
        assert_eq!(deduped.len(), 2);
        let winner = deduped.get(1).and_then(Event::news_item).unwrap();
        assert_eq!(winner.description, "second");
        assert_eq!(winner.title, "RATE CUT");
    }

    #[test]
    fn hidden_and_visible_share_identity() {
        let mut hidden = news("2025-01-02", "Leak", "hidden");
        if let Event::NewsPublished(item) = hidden {
            hidden = Event::HiddenNewsPublished(item);
        }
        let events = vec![hidden, news("2025-01-02", "leak", "visible")];
        let deduped = sort_and_dedupe(events);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped.first().map(Event::kind), Some("news-published"));
    }

    #[test]
    fn same_title_on_different_days_is_not_a_duplicate() {
        let events = vec![news("2025-01-02", "Update", "a"), news("2025-01-03", "Update", "b")];
        assert_eq!(sort_and_dedupe(events).len(), 2);
    }

    #[test]
    fn non_news_events_are_never_deduplicated() {
        let over = Event::GameOver(GameOver {
            date: date("2025-02-01"),
            summary: "s".to_owned(),
        });
        let events = vec![over.clone(), over];
        assert_eq!(sort_and_dedupe(events).len(), 2);
    }

    #[test]
    fn sort_and_dedupe_is_idempotent() {
        let events = vec![
            news("2025-01-05", "E", "e"),
            news("2025-01-02", "Rate Cut", "first"),
            news("2025-01-01", "A", "a"),
            news("2025-01-02", "rate cut", "second"),
            news("2025-01-05", "D", "d"),
        ];
        let once = sort_and_dedupe(events);
        let twice = sort_and_dedupe(once.clone());
        assert_eq!(once, twice);
    }
}
