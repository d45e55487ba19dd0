pub mod types;
pub mod error;
pub mod config;
pub mod store;
pub mod round_robin;
pub mod calendar;
pub mod distribution;
pub mod playoffs;
pub mod timeslots;
pub mod match_details;
pub mod bracket;
pub mod competition;

use types::*;
use config::*;
use competition::{CompetitionFormat, CompetitionService};
use error::ScheduleError;
use store::{InMemoryMatchStore, MatchStore};

use serde::Serialize;
use serde_json::Value;
use std::{env, fs, path::Path, sync::Arc};
use tracing::{info, warn, error};
use tracing_subscriber::EnvFilter;

// ── Generation ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutput {
    pub summary: Value,
    pub matches: Vec<MatchRecord>,
}

/// Creates the configured competition in `store` and returns what was written.
///
/// Cup requests build a bracket, requests with a playoff pool size build
/// playoffs, everything else is a regular season.
pub fn generate(config: &AppConfig, store: &InMemoryMatchStore) -> Result<RunOutput, String> {
    let options = config.scheduling_options()?;
    let service = CompetitionService::new(store, &config.teams, &config.season, options);
    let request = &config.competition;

    let summary = match request.format {
        Some(CompetitionFormat::Cup) => service
            .create_cup(request)
            .map_err(|e| log_failure(request.competition_id, e))
            .and_then(|summary| serde_json::to_value(summary).map_err(|e| e.to_string()))?,
        _ if request.playoff_pool_size.is_some() => service
            .create_playoffs(request)
            .map_err(|e| log_failure(request.competition_id, e))
            .and_then(|summary| serde_json::to_value(summary).map_err(|e| e.to_string()))?,
        _ => service
            .create_league(request)
            .map_err(|e| log_failure(request.competition_id, e))
            .and_then(|summary| serde_json::to_value(summary).map_err(|e| e.to_string()))?,
    };

    let matches = store
        .list_matches(request.competition_id)
        .map_err(|e| e.to_string())?;
    Ok(RunOutput { summary, matches })
}

/// Logs a failed generation and turns it into the boundary message.
///
/// Recoverable failures are bad requests; anything else is a defect.
fn log_failure(competition_id: CompetitionId, err: ScheduleError) -> String {
    if err.is_recoverable() {
        warn!(competition_id, "generation rejected: {err}");
    } else {
        error!(competition_id, "generation failed: {err}");
    }
    err.to_string()
}

// ── Entry point ────────────────────────────────────────────────────────

pub fn run() -> Result<(), String> {
    let arg = env::args().nth(1);
    let path = config_path(arg.as_deref());
    load_env_file(path.parent().unwrap_or(Path::new(".")));

    // Initialize tracing with a daily rolling file
    let logs_dir = log_dir();
    fs::create_dir_all(&logs_dir).ok();
    let file_appender = tracing_appender::rolling::daily(&logs_dir, "league.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(non_blocking)
        .with_ansi(false)
        .init();
    info!(config = %path.display(), "League scheduler starting");

    let config = load_config_from(&path)?;
    log_config_warnings(&config);

    let store: SharedMatchStore = Arc::new(InMemoryMatchStore::new());
    let output = generate(&config, &store)?;
    info!(matches = output.matches.len(), "generation finished");

    let payload = serde_json::to_string_pretty(&output).map_err(|e| e.to_string())?;
    println!("{payload}");
    Ok(())
}
