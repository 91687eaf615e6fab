//! Shared type definitions for the Forecast engine.
//!
//! This crate is the single source of truth for the event log's data model.
//! Types defined here flow downstream to `TypeScript` via `ts-rs` for the
//! timeline renderer.
//!
//! # Modules
//!
//! - [`date`] -- Strict `YYYY-MM-DD` calendar dates
//! - [`events`] -- The closed set of domain events
//! - [`commands`] -- Provider-facing commands that normalize into events

pub mod commands;
pub mod date;
pub mod events;

// Re-export all public types at crate root for convenience.
pub use commands::Command;
pub use date::{DateParseError, EventDate};
pub use events::{
    Event, GameOver, NewsItem, NewsOpened, NewsPatch, NewsPatched, ScenarioHeadCompleted,
    TurnActor, TurnWindow,
};
