//! Domain events: the immutable facts that make up a game's history.
//!
//! Every event carries a `type` tag on the wire. The set of variants is
//! closed; adding a new kind of fact means adding a variant here and
//! handling it in every exhaustive match downstream.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::date::EventDate;

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// A published news story, visible or hidden.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct NewsItem {
    /// Stable identifier. Derived from `(date, title)` when not supplied.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub id: Option<String>,
    /// Day the story is dated.
    pub date: EventDate,
    /// Icon name shown next to the story.
    pub icon: String,
    /// Headline.
    pub title: String,
    /// Body text.
    pub description: String,
    /// Retrospective written after the game ends.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub post_mortem: Option<String>,
}

/// Attribute overrides carried by a `news-patched` event.
///
/// At least one field must be set; an empty patch is a schema violation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct NewsPatch {
    /// Replacement date.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub date: Option<EventDate>,
    /// Replacement icon.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub icon: Option<String>,
    /// Replacement headline.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub title: Option<String>,
    /// Replacement body text.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub description: Option<String>,
}

impl NewsPatch {
    /// Whether the patch overrides nothing.
    pub const fn is_empty(&self) -> bool {
        self.date.is_none()
            && self.icon.is_none()
            && self.title.is_none()
            && self.description.is_none()
    }
}

/// A correction applied to an earlier story.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct NewsPatched {
    /// Id of the story being corrected.
    pub target_id: String,
    /// Day the correction was issued.
    pub date: EventDate,
    /// The overrides.
    pub patch: NewsPatch,
}

/// The player opened a story during their turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct NewsOpened {
    /// Id of the opened story.
    pub id: String,
    /// Day the story was opened.
    pub date: EventDate,
}

/// The scripted head of the scenario is exhausted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ScenarioHeadCompleted {
    /// Day the scripted portion ended.
    pub date: EventDate,
}

/// Terminal marker for a game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct GameOver {
    /// Day the game ended.
    pub date: EventDate,
    /// Closing summary.
    pub summary: String,
}

/// Who is acting during a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum TurnActor {
    /// The human player.
    Player,
    /// The generative game master.
    GameMaster,
}

/// The effective date window of a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct TurnWindow {
    /// Who is acting.
    pub actor: TurnActor,
    /// First day of the window.
    pub from: EventDate,
    /// Last day of the window.
    pub until: EventDate,
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A single immutable fact in a game's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "kebab-case")]
#[ts(export, export_to = "bindings/")]
pub enum Event {
    /// A story added to the visible timeline.
    NewsPublished(NewsItem),
    /// A story known to the game master but withheld from the timeline.
    HiddenNewsPublished(NewsItem),
    /// A correction to an earlier story.
    NewsPatched(NewsPatched),
    /// The player opened a story.
    NewsOpened(NewsOpened),
    /// The scripted scenario head is exhausted.
    ScenarioHeadCompleted(ScenarioHeadCompleted),
    /// The game ended.
    GameOver(GameOver),
    /// A turn began.
    TurnStarted(TurnWindow),
    /// A turn ended.
    TurnFinished(TurnWindow),
}

impl Event {
    /// Wire tag for the variant.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NewsPublished(_) => "news-published",
            Self::HiddenNewsPublished(_) => "hidden-news-published",
            Self::NewsPatched(_) => "news-patched",
            Self::NewsOpened(_) => "news-opened",
            Self::ScenarioHeadCompleted(_) => "scenario-head-completed",
            Self::GameOver(_) => "game-over",
            Self::TurnStarted(_) => "turn-started",
            Self::TurnFinished(_) => "turn-finished",
        }
    }

    /// The date the event is filed under.
    ///
    /// A turn opens on the first day of its window and closes on the last, so
    /// a date-ordered history keeps a turn's events between its markers.
    pub const fn date(&self) -> EventDate {
        match self {
            Self::NewsPublished(item) | Self::HiddenNewsPublished(item) => item.date,
            Self::NewsPatched(patched) => patched.date,
            Self::NewsOpened(opened) => opened.date,
            Self::ScenarioHeadCompleted(head) => head.date,
            Self::GameOver(over) => over.date,
            Self::TurnStarted(window) => window.from,
            Self::TurnFinished(window) => window.until,
        }
    }

    /// The story carried by a publish event, if this is one.
    pub const fn news_item(&self) -> Option<&NewsItem> {
        match self {
            Self::NewsPublished(item) | Self::HiddenNewsPublished(item) => Some(item),
            _ => None,
        }
    }

    /// Whether this event publishes a hidden story.
    pub const fn is_hidden(&self) -> bool {
        matches!(self, Self::HiddenNewsPublished(_))
    }
}
