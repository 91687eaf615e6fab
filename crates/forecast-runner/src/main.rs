//! Forecast runner entry point.
//!
//! Plays one game-master turn against the configured history file. In `live`
//! mode the provider is called directly; `record` additionally writes a tape;
//! `replay` serves a recorded tape instead of calling the provider.
//!
//! The history is written back even when the stream fails part way, so
//! nothing the provider already produced is lost.

use forecast_events::{read_history, write_history};
use forecast_runner::llm::{FragmentSource, GeminiBackend};
use forecast_runner::{
    PromptEngine, Recorder, Replayer, RunMode, RunnerConfig, StreamEnd, TurnRunner, TurnSettings,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Application entry point.
///
/// Initializes logging, loads configuration and history, runs a single turn,
/// and persists the resulting history.
///
/// # Errors
///
/// Returns an error if configuration, history, or the turn itself fails.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    info!("forecast-runner starting");

    let config = RunnerConfig::from_env()?;
    info!(
        mode = ?config.mode,
        history = %config.history_path.display(),
        model = config.backend.model,
        turn_days = config.turn_days,
        "configuration loaded"
    );

    let history = if config.history_path.exists() {
        read_history(&config.history_path)?
    } else {
        info!("no history file yet, starting a new game");
        Vec::new()
    };

    let prompt_engine = PromptEngine::new(&config.templates_dir)?;
    let runner = TurnRunner::new(prompt_engine, TurnSettings::from_config(&config));
    let source = build_source(&config).await?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping the turn");
            on_interrupt.cancel();
        }
    });

    let outcome = runner.run_turn(&history, source.as_ref(), &cancel).await?;
    write_history(&config.history_path, &outcome.history)?;
    info!(
        events = outcome.history.len(),
        appended = outcome.appended,
        "history written"
    );

    match outcome.end {
        StreamEnd::Completed => Ok(()),
        StreamEnd::Cancelled => Err(anyhow::anyhow!("turn cancelled")),
        StreamEnd::Failed(e) => Err(e.into()),
    }
}

/// Choose the fragment source for the configured mode.
async fn build_source(config: &RunnerConfig) -> anyhow::Result<Box<dyn FragmentSource>> {
    let tape = || {
        config
            .tape_path
            .clone()
            .ok_or_else(|| anyhow::anyhow!("FORECAST_TAPE is required in {:?} mode", config.mode))
    };
    Ok(match config.mode {
        RunMode::Live => Box::new(GeminiBackend::new(&config.backend)),
        RunMode::Record => Box::new(
            Recorder::new(GeminiBackend::new(&config.backend), tape()?)
                .with_label(config.tape_label.clone()),
        ),
        RunMode::Replay => {
            Box::new(Replayer::load(&tape()?).await?.with_strict(config.replay_strict))
        }
    })
}
