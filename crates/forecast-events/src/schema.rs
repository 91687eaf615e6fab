//! Structural validation of events and commands.
//!
//! Payloads arrive as untyped JSON (from history files or provider output).
//! Validation walks the tagged union by hand rather than leaning on serde's
//! error messages, so every failure names the exact field that broke:
//! an unknown `type`, a missing or mistyped required field, a malformed
//! date, or a patch that overrides nothing.
//!
//! Unknown extra keys are ignored. Optional fields must be absent or of the
//! right type; `null` is not accepted in their place.
//!
//! Everything here is pure and may be called from any task concurrently.

use forecast_types::{
    Command, Event, EventDate, GameOver, NewsItem, NewsOpened, NewsPatch, NewsPatched,
    ScenarioHeadCompleted, TurnActor, TurnWindow,
};
use serde_json::{Map, Value};

use crate::error::SchemaViolation;

/// Root of every violation path.
const ROOT: &str = "$";

/// Validate a single event payload.
///
/// # Errors
///
/// Returns [`SchemaViolation`] naming the offending field.
pub fn validate_event(payload: &Value) -> Result<Event, SchemaViolation> {
    event_at(payload, ROOT)
}

/// Validate a single command payload.
///
/// # Errors
///
/// Returns [`SchemaViolation`] naming the offending field.
pub fn validate_command(payload: &Value) -> Result<Command, SchemaViolation> {
    command_at(payload, ROOT)
}

/// Validate a JSON array of events. The first invalid element fails the batch.
///
/// # Errors
///
/// Returns [`SchemaViolation`] with the element index in its path.
pub fn validate_event_array(payload: &Value) -> Result<Vec<Event>, SchemaViolation> {
    array_at(payload, ROOT, event_at)
}

/// Validate a JSON array of commands. The first invalid element fails the batch.
///
/// # Errors
///
/// Returns [`SchemaViolation`] with the element index in its path.
pub fn validate_command_array(payload: &Value) -> Result<Vec<Command>, SchemaViolation> {
    array_at(payload, ROOT, command_at)
}

/// Validate a command located at `path` inside a larger document.
///
/// Used by callers that number records themselves (e.g. JSON-Lines).
///
/// # Errors
///
/// Returns [`SchemaViolation`] rooted at `path`.
pub fn validate_command_at(payload: &Value, path: &str) -> Result<Command, SchemaViolation> {
    command_at(payload, path)
}

/// Validate an event located at `path` inside a larger document.
///
/// # Errors
///
/// Returns [`SchemaViolation`] rooted at `path`.
pub fn validate_event_at(payload: &Value, path: &str) -> Result<Event, SchemaViolation> {
    event_at(payload, path)
}

// ---------------------------------------------------------------------------
// Tagged unions
// ---------------------------------------------------------------------------

fn event_at(payload: &Value, path: &str) -> Result<Event, SchemaViolation> {
    let record = Record::new(payload, path)?;
    let tag = record.tag()?;
    match tag {
        "news-published" => Ok(Event::NewsPublished(news_item(&record)?)),
        "hidden-news-published" => Ok(Event::HiddenNewsPublished(news_item(&record)?)),
        "news-patched" => Ok(Event::NewsPatched(news_patched(&record)?)),
        "news-opened" => Ok(Event::NewsOpened(NewsOpened {
            id: record.required_str("id")?,
            date: record.required_date("date")?,
        })),
        "scenario-head-completed" => Ok(Event::ScenarioHeadCompleted(ScenarioHeadCompleted {
            date: record.required_date("date")?,
        })),
        "game-over" => Ok(Event::GameOver(game_over(&record)?)),
        "turn-started" => Ok(Event::TurnStarted(turn_window(&record)?)),
        "turn-finished" => Ok(Event::TurnFinished(turn_window(&record)?)),
        other => Err(SchemaViolation::new(
            record.field_path("type"),
            format!("unknown event type {other:?}"),
        )),
    }
}

fn command_at(payload: &Value, path: &str) -> Result<Command, SchemaViolation> {
    let record = Record::new(payload, path)?;
    let tag = record.tag()?;
    match tag {
        "publish-news" => Ok(Command::PublishNews(news_item(&record)?)),
        "publish-hidden-news" => Ok(Command::PublishHiddenNews(news_item(&record)?)),
        "patch-news" => Ok(Command::PatchNews(news_patched(&record)?)),
        "game-over" => Ok(Command::GameOver(game_over(&record)?)),
        other => Err(SchemaViolation::new(
            record.field_path("type"),
            format!("unknown command type {other:?}"),
        )),
    }
}

fn array_at<T>(
    payload: &Value,
    path: &str,
    element: fn(&Value, &str) -> Result<T, SchemaViolation>,
) -> Result<Vec<T>, SchemaViolation> {
    let items = payload
        .as_array()
        .ok_or_else(|| SchemaViolation::new(path, format!("expected array, got {}", type_name(payload))))?;
    items
        .iter()
        .enumerate()
        .map(|(index, item)| element(item, &format!("{path}[{index}]")))
        .collect()
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

fn news_item(record: &Record<'_>) -> Result<NewsItem, SchemaViolation> {
    Ok(NewsItem {
        id: record.optional_str("id")?,
        date: record.required_date("date")?,
        icon: record.required_str("icon")?,
        title: record.required_str("title")?,
        description: record.required_str("description")?,
        post_mortem: record.optional_str("postMortem")?,
    })
}

fn news_patched(record: &Record<'_>) -> Result<NewsPatched, SchemaViolation> {
    let target_id = record.required_str("targetId")?;
    let date = record.required_date("date")?;
    let patch_record = record.nested("patch")?;
    let patch = NewsPatch {
        date: patch_record.optional_date("date")?,
        icon: patch_record.optional_str("icon")?,
        title: patch_record.optional_str("title")?,
        description: patch_record.optional_str("description")?,
    };
    if patch.is_empty() {
        return Err(SchemaViolation::new(
            patch_record.path,
            "patch must override at least one of date, icon, title, description",
        ));
    }
    Ok(NewsPatched {
        target_id,
        date,
        patch,
    })
}

fn game_over(record: &Record<'_>) -> Result<GameOver, SchemaViolation> {
    Ok(GameOver {
        date: record.required_date("date")?,
        summary: record.required_str("summary")?,
    })
}

fn turn_window(record: &Record<'_>) -> Result<TurnWindow, SchemaViolation> {
    let actor = match record.required_str("actor")?.as_str() {
        "player" => TurnActor::Player,
        "game_master" => TurnActor::GameMaster,
        other => {
            return Err(SchemaViolation::new(
                record.field_path("actor"),
                format!("expected \"player\" or \"game_master\", got {other:?}"),
            ));
        }
    };
    let from = record.required_date("from")?;
    let until = record.required_date("until")?;
    if until < from {
        return Err(SchemaViolation::new(
            record.field_path("until"),
            format!("turn ends ({until}) before it starts ({from})"),
        ));
    }
    Ok(TurnWindow { actor, from, until })
}

// ---------------------------------------------------------------------------
// Field access
// ---------------------------------------------------------------------------

/// A JSON object paired with its location in the enclosing document.
struct Record<'a> {
    fields: &'a Map<String, Value>,
    path: String,
}

impl<'a> Record<'a> {
    fn new(payload: &'a Value, path: &str) -> Result<Self, SchemaViolation> {
        let fields = payload.as_object().ok_or_else(|| {
            SchemaViolation::new(path, format!("expected object, got {}", type_name(payload)))
        })?;
        Ok(Self {
            fields,
            path: path.to_owned(),
        })
    }

    fn field_path(&self, key: &str) -> String {
        format!("{}.{key}", self.path)
    }

    fn tag(&self) -> Result<&'a str, SchemaViolation> {
        match self.fields.get("type") {
            Some(Value::String(tag)) => Ok(tag.as_str()),
            Some(other) => Err(SchemaViolation::new(
                self.field_path("type"),
                format!("expected string, got {}", type_name(other)),
            )),
            None => Err(SchemaViolation::new(
                self.field_path("type"),
                "missing required field",
            )),
        }
    }

    fn required_str(&self, key: &str) -> Result<String, SchemaViolation> {
        self.optional_str(key)?.ok_or_else(|| {
            SchemaViolation::new(self.field_path(key), "missing required field")
        })
    }

    fn optional_str(&self, key: &str) -> Result<Option<String>, SchemaViolation> {
        match self.fields.get(key) {
            None => Ok(None),
            Some(Value::String(value)) => Ok(Some(value.clone())),
            Some(other) => Err(SchemaViolation::new(
                self.field_path(key),
                format!("expected string, got {}", type_name(other)),
            )),
        }
    }

    fn required_date(&self, key: &str) -> Result<EventDate, SchemaViolation> {
        self.optional_date(key)?.ok_or_else(|| {
            SchemaViolation::new(self.field_path(key), "missing required field")
        })
    }

    fn optional_date(&self, key: &str) -> Result<Option<EventDate>, SchemaViolation> {
        self.optional_str(key)?
            .map(|raw| {
                EventDate::parse(&raw)
                    .map_err(|e| SchemaViolation::new(self.field_path(key), e.to_string()))
            })
            .transpose()
    }

    fn nested(&self, key: &str) -> Result<Record<'a>, SchemaViolation> {
        let path = self.field_path(key);
        let value = self
            .fields
            .get(key)
            .ok_or_else(|| SchemaViolation::new(path.clone(), "missing required field"))?;
        Record::new(value, &path)
    }
}

const fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
