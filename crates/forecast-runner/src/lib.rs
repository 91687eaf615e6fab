//! Prompt projection, streaming ingestion, and replay harness for Forecast.
//!
//! This crate drives a game-master turn end to end: it projects the event
//! history into a provider request, streams the provider's text fragments
//! through validation into the history, and can record or replay whole
//! sessions as tapes for deterministic tests.
//!
//! # Architecture
//!
//! ```text
//! History --> projector --> GenerateRequest --> FragmentSource --> ingest --> History
//!                                                 (Gemini | Recorder | Replayer)
//! ```
//!
//! # Modules
//!
//! - [`config`] -- Environment-driven runner configuration
//! - [`error`] -- Runner and chunk error types
//! - [`projector`] -- Deterministic history-to-text projection
//! - [`prompt`] -- System template rendering and request building
//! - [`llm`] -- The fragment source boundary and its implementations
//! - [`ingest`] -- Per-fragment parsing and folding
//! - [`replay`] -- Tape recording and replay
//! - [`turn`] -- Game-master turn orchestration

pub mod config;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod projector;
pub mod prompt;
pub mod replay;
pub mod turn;

pub use config::{BackendConfig, RunMode, RunnerConfig};
pub use error::{ChunkError, RunnerError};
pub use ingest::{ChunkOutcome, IngestOutcome, StreamEnd, ingest, parse_chunk, parse_fragment};
pub use llm::{FragmentSource, FragmentStream, GeminiBackend, RecordSplitter, ScriptedSource};
pub use projector::{current_turn, project};
pub use prompt::{
    GenerateConfig, GenerateRequest, PromptEngine, RequestOptions, SystemContext, build_request,
    max_output_tokens,
};
pub use replay::{Recorder, Replayer, Tape, TapeEntry, TapeMeta, load_tape, save_tape};
pub use turn::{TurnOutcome, TurnPlan, TurnRunner, TurnSettings};
