//! Visible state of each story, folded from the append-only log.
//!
//! Publish events establish a story under its effective id; `news-patched`
//! events override attributes of the story they target. The log itself is
//! never touched: the fold builds a fresh id -> attributes map every time.
//!
//! Patches are applied after every publish has been seen, in date order, so
//! the result does not depend on whether a patch happens to sit before its
//! target in the input. A patch whose target was never published is an
//! ordering inconsistency: it is dropped from the projection, logged at
//! warn level, and handed back to the caller.

use std::collections::HashMap;

use forecast_types::{Event, EventDate, NewsPatch, NewsPatched};
use serde::Serialize;
use tracing::warn;

use crate::normalize::effective_news_id;

/// The current attributes of one story.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibleNews {
    /// Effective id (explicit or derived).
    pub id: String,
    /// Current date.
    pub date: EventDate,
    /// Current icon.
    pub icon: String,
    /// Current headline.
    pub title: String,
    /// Current body text.
    pub description: String,
    /// Retrospective, if published with one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_mortem: Option<String>,
    /// Whether the story was published hidden.
    pub hidden: bool,
    /// Number of patches folded into this story.
    pub revisions: usize,
}

/// A patch that targets an id no publish event carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderingInconsistency {
    /// The id the patch pointed at.
    pub target_id: String,
    /// The date of the orphaned patch.
    pub date: EventDate,
}

/// Result of folding a history into visible state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisibleProjection {
    /// Every story, hidden ones included, ordered by current date.
    pub items: Vec<VisibleNews>,
    /// Patches that could not be applied.
    pub inconsistencies: Vec<OrderingInconsistency>,
}

/// Fold publishes and patches into the current attributes of each story.
pub fn project_visible(events: &[Event]) -> VisibleProjection {
    let mut items: Vec<VisibleNews> = Vec::new();
    let mut by_id: HashMap<String, usize> = HashMap::new();

    for event in events {
        let (Some(item), Some(id)) = (event.news_item(), effective_news_id(event)) else {
            continue;
        };
        let news = VisibleNews {
            id: id.clone(),
            date: item.date,
            icon: item.icon.clone(),
            title: item.title.clone(),
            description: item.description.clone(),
            post_mortem: item.post_mortem.clone(),
            hidden: event.is_hidden(),
            revisions: 0,
        };
        // A republished id replaces the earlier story in place.
        if let Some(slot) = by_id.get(&id).and_then(|&index| items.get_mut(index)) {
            *slot = news;
        } else {
            by_id.insert(id, items.len());
            items.push(news);
        }
    }

    let mut patches: Vec<&NewsPatched> = events
        .iter()
        .filter_map(|event| match event {
            Event::NewsPatched(patched) => Some(patched),
            _ => None,
        })
        .collect();
    patches.sort_by_key(|patched| patched.date);

    let mut inconsistencies = Vec::new();
    for patched in patches {
        match by_id
            .get(&patched.target_id)
            .and_then(|&index| items.get_mut(index))
        {
            Some(news) => apply_patch(news, &patched.patch),
            None => {
                warn!(
                    target_id = %patched.target_id,
                    date = %patched.date,
                    "patch targets unknown story, dropping it from the projection"
                );
                inconsistencies.push(OrderingInconsistency {
                    target_id: patched.target_id.clone(),
                    date: patched.date,
                });
            }
        }
    }

    items.sort_by_key(|news| news.date);
    VisibleProjection {
        items,
        inconsistencies,
    }
}

/// The stories a player can see: the projection without hidden items.
pub fn visible_timeline(events: &[Event]) -> Vec<VisibleNews> {
    project_visible(events)
        .items
        .into_iter()
        .filter(|news| !news.hidden)
        .collect()
}

fn apply_patch(news: &mut VisibleNews, patch: &NewsPatch) {
    if let Some(date) = patch.date {
        news.date = date;
    }
    if let Some(icon) = &patch.icon {
        news.icon.clone_from(icon);
    }
    if let Some(title) = &patch.title {
        news.title.clone_from(title);
    }
    if let Some(description) = &patch.description {
        news.description.clone_from(description);
    }
    news.revisions = news.revisions.saturating_add(1);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use forecast_types::NewsItem;

    use super::*;

    fn date(s: &str) -> EventDate {
        EventDate::parse(s).unwrap()
    }

    fn publish(day: &str, title: &str) -> Event {
        Event::NewsPublished(NewsItem {
            id: None,
            date: date(day),
            icon: "Newspaper".to_owned(),
            title: title.to_owned(),
            description: "original".to_owned(),
            post_mortem: None,
        })
    }

    fn patch(target: &str, day: &str, patch: NewsPatch) -> Event {
        Event::NewsPatched(NewsPatched {
            target_id: target.to_owned(),
            date: date(day),
            patch,
        })
    }

    fn retitle(title: &str) -> NewsPatch {
        NewsPatch {
            title: Some(title.to_owned()),
            ..NewsPatch::default()
        }
    }

    #[test]
    fn patches_fold_into_their_target() {
        let events = vec![
            publish("2025-01-02", "T"),
            patch("news-2025-01-02-t", "2025-01-03", retitle("T2")),
            patch(
                "news-2025-01-02-t",
                "2025-01-04",
                NewsPatch {
                    description: Some("updated".to_owned()),
                    ..NewsPatch::default()
                },
            ),
        ];
        let projection = project_visible(&events);
        assert!(projection.inconsistencies.is_empty());
        let news = projection.items.first().unwrap();
        assert_eq!(news.id, "news-2025-01-02-t");
        assert_eq!(news.title, "T2");
        assert_eq!(news.description, "updated");
        assert_eq!(news.revisions, 2);
    }

    #[test]
    fn source_log_is_untouched() {
        let events = vec![
            publish("2025-01-02", "T"),
            patch("news-2025-01-02-t", "2025-01-03", retitle("T2")),
        ];
        let before = events.clone();
        let _ = project_visible(&events);
        assert_eq!(events, before);
    }

    #[test]
    fn orphan_patch_is_reported_and_dropped() {
        let events = vec![
            publish("2025-01-02", "T"),
            patch("news-1999-01-01-missing", "2025-01-03", retitle("X")),
        ];
        let projection = project_visible(&events);
        assert_eq!(projection.items.len(), 1);
        assert_eq!(projection.items.first().unwrap().title, "T");
        assert_eq!(
            projection.inconsistencies,
            vec![OrderingInconsistency {
                target_id: "news-1999-01-01-missing".to_owned(),
                date: date("2025-01-03"),
            }]
        );
    }

    #[test]
    fn projection_is_invariant_under_patch_then_publish_order() {
        let publish_first = vec![
            publish("2025-01-02", "T"),
            patch("news-2025-01-02-t", "2025-01-03", retitle("T2")),
            patch("news-2025-01-02-t", "2025-01-05", retitle("T3")),
        ];
        let patch_first = vec![
            patch("news-2025-01-02-t", "2025-01-05", retitle("T3")),
            patch("news-2025-01-02-t", "2025-01-03", retitle("T2")),
            publish("2025-01-02", "T"),
        ];
        assert_eq!(project_visible(&publish_first), project_visible(&patch_first));
        assert_eq!(
            project_visible(&patch_first).items.first().map(|n| n.title.as_str()),
            Some("T3")
        );
    }

    #[test]
    fn patched_date_reorders_items() {
        let events = vec![
            publish("2025-01-02", "A"),
            publish("2025-01-03", "B"),
            patch(
                "news-2025-01-02-a",
                "2025-01-04",
                NewsPatch {
                    date: Some(date("2025-01-10")),
                    ..NewsPatch::default()
                },
            ),
        ];
        let titles: Vec<String> = project_visible(&events)
            .items
            .into_iter()
            .map(|n| n.title)
            .collect();
        assert_eq!(titles, vec!["B", "A"]);
    }

    #[test]
    fn visible_timeline_omits_hidden_news() {
        let hidden = Event::HiddenNewsPublished(NewsItem {
            id: None,
            date: date("2025-01-02"),
            icon: "Eye".to_owned(),
            title: "Secret".to_owned(),
            description: "s".to_owned(),
            post_mortem: None,
        });
        let events = vec![publish("2025-01-01", "Public"), hidden];
        assert_eq!(project_visible(&events).items.len(), 2);
        let timeline = visible_timeline(&events);
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline.first().unwrap().title, "Public");
    }

    #[test]
    fn hidden_items_can_be_patched_by_their_hidden_id() {
        let hidden = Event::HiddenNewsPublished(NewsItem {
            id: None,
            date: date("2025-01-02"),
            icon: "Eye".to_owned(),
            title: "Secret".to_owned(),
            description: "s".to_owned(),
            post_mortem: None,
        });
        let events = vec![
            hidden,
            patch("hidden-news-2025-01-02-secret", "2025-01-03", retitle("Revealed")),
        ];
        let projection = project_visible(&events);
        assert!(projection.inconsistencies.is_empty());
        assert_eq!(projection.items.first().unwrap().title, "Revealed");
    }
}
