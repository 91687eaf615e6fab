//! Event validation, normalization, ordering, and projection for the
//! Forecast engine.
//!
//! Every state change in a game is an immutable [`Event`] appended to the
//! history. Events are the source of truth: the visible timeline and the
//! provider prompt are both pure projections of them. This crate owns the
//! pure, I/O-free rules around that log, plus JSON-Lines history exchange.
//!
//! # Modules
//!
//! - [`schema`] -- Structural validation with field-path errors
//! - [`normalize`] -- Command -> event conversion and canonical ids
//! - [`order`] -- Identity deduplication (last write wins) and date ordering
//! - [`projection`] -- Patch folding into visible story state
//! - [`dates`] -- Latest date and next-date derivation
//! - [`jsonl`] -- JSON-Lines history read/write
//! - [`error`] -- [`SchemaViolation`] and [`EventsError`]
//!
//! [`Event`]: forecast_types::Event

pub mod dates;
pub mod error;
pub mod jsonl;
pub mod normalize;
pub mod order;
pub mod projection;
pub mod schema;

pub use dates::{latest_date, next_date_after, next_date_after_or};
pub use error::{EventsError, SchemaViolation};
pub use jsonl::{parse_history, read_history, render_history, write_history};
pub use normalize::{derive_news_id, effective_news_id, normalize, normalize_all, slugify};
pub use order::{news_identity, sort_and_dedupe};
pub use projection::{
    OrderingInconsistency, VisibleNews, VisibleProjection, project_visible, visible_timeline,
};
pub use schema::{
    validate_command, validate_command_array, validate_command_at, validate_event,
    validate_event_array, validate_event_at,
};
