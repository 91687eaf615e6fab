//! Command normalization and canonical news ids.
//!
//! A news id, when not supplied explicitly, is `kind-date-slug(title)`:
//! `news-2025-01-02-rate-cut` for a visible story and
//! `hidden-news-2025-01-02-rate-cut` for a hidden one. The id depends on
//! nothing but the kind, date, and title, so normalizing the same command
//! twice always produces the same event.

use forecast_types::{Command, Event, EventDate, NewsItem};

/// Id prefix for visible stories.
pub const NEWS_ID_PREFIX: &str = "news";

/// Id prefix for hidden stories.
pub const HIDDEN_NEWS_ID_PREFIX: &str = "hidden-news";

/// Slug used when a title has no alphanumeric characters at all.
const EMPTY_SLUG: &str = "untitled";

/// Convert a command into the event it represents.
///
/// Publish commands without an id receive the canonical derived id.
pub fn normalize(command: Command) -> Event {
    match command {
        Command::PublishNews(item) => Event::NewsPublished(with_id(item, NEWS_ID_PREFIX)),
        Command::PublishHiddenNews(item) => {
            Event::HiddenNewsPublished(with_id(item, HIDDEN_NEWS_ID_PREFIX))
        }
        Command::PatchNews(patched) => Event::NewsPatched(patched),
        Command::GameOver(over) => Event::GameOver(over),
    }
}

/// Normalize a batch of commands, preserving order.
pub fn normalize_all(commands: impl IntoIterator<Item = Command>) -> Vec<Event> {
    commands.into_iter().map(normalize).collect()
}

/// Derive the canonical id for a story of the given kind.
pub fn derive_news_id(prefix: &str, date: EventDate, title: &str) -> String {
    format!("{prefix}-{date}-{}", slugify(title))
}

/// The id a publish event is known by: its explicit id, or the derived one.
pub fn effective_news_id(event: &Event) -> Option<String> {
    match event {
        Event::NewsPublished(item) => Some(item_id(item, NEWS_ID_PREFIX)),
        Event::HiddenNewsPublished(item) => Some(item_id(item, HIDDEN_NEWS_ID_PREFIX)),
        _ => None,
    }
}

/// Lowercase `title`, collapse every run of non-alphanumeric characters to a
/// single `-`, and trim dashes from both ends.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;
    for c in title.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }
    if slug.is_empty() {
        EMPTY_SLUG.to_owned()
    } else {
        slug
    }
}

fn item_id(item: &NewsItem, prefix: &str) -> String {
    item.id
        .clone()
        .unwrap_or_else(|| derive_news_id(prefix, item.date, &item.title))
}

fn with_id(mut item: NewsItem, prefix: &str) -> NewsItem {
    if item.id.is_none() {
        item.id = Some(derive_news_id(prefix, item.date, &item.title));
    }
    item
}
