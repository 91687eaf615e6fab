//! Commands: the narrower set of intents a provider may emit.
//!
//! A command is not yet a fact. Normalization in `forecast-events` turns
//! each command into exactly one [`Event`](crate::Event).

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::events::{GameOver, NewsItem, NewsPatched};

/// A provider-facing intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "kebab-case")]
#[ts(export, export_to = "bindings/")]
pub enum Command {
    /// Publish a visible story.
    PublishNews(NewsItem),
    /// Publish a story withheld from the timeline.
    PublishHiddenNews(NewsItem),
    /// Correct an earlier story.
    PatchNews(NewsPatched),
    /// End the game.
    GameOver(GameOver),
}

impl Command {
    /// Wire tag for the variant.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::PublishNews(_) => "publish-news",
            Self::PublishHiddenNews(_) => "publish-hidden-news",
            Self::PatchNews(_) => "patch-news",
            Self::GameOver(_) => "game-over",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn publish_news_deserializes_without_id() {
        let raw = r#"{"type":"publish-news","date":"2025-01-02","icon":"Landmark","title":"T","description":"D"}"#;
        let command: Command = serde_json::from_str(raw).unwrap();
        assert!(matches!(
            command,
            Command::PublishNews(ref item) if item.id.is_none() && item.title == "T"
        ));
    }

    #[test]
    fn game_over_shares_its_tag_with_the_event() {
        let raw = r#"{"type":"game-over","date":"2025-06-01","summary":"done"}"#;
        let command: Command = serde_json::from_str(raw).unwrap();
        assert_eq!(command.kind(), "game-over");
    }
}
