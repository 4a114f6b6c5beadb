//! End-to-end run: games ETL, player snapshots, then derived tables.

use chrono::NaiveDateTime;
use thiserror::Error;
use tracing::{info, warn};

use crate::chess_api::{ApiError, GameSource};
use crate::config::{ConfigError, PipelineConfig, ValidatedConfig};
use crate::eco::{EcoCatalog, EcoError};
use crate::extract::{extract_games, ExtractError};
use crate::features::{games_table_schema, transform_games, EnrichedGame, FeatureError};
use crate::incremental::{resolve_incremental_window, IncrementalBoundary, IncrementalTarget};
use crate::observability::{log_run_failed, log_run_finish, log_run_start, LogCapture};
use crate::players::{players_table_schema, snapshot_player, PlayerError, PlayerSnapshot};
use crate::run_log::{RunLog, RunStatus};
use crate::store::{StoreError, Warehouse};
use crate::templates::SqlTemplates;
use crate::transform_dag::TransformError;
use crate::windows::{generate_monthly_dates, WindowError};

const USERNAME_COLUMN: &str = "username";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Eco(#[from] EcoError),
    #[error(transparent)]
    Window(#[from] WindowError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Feature(#[from] FeatureError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Player(#[from] PlayerError),
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error("failed to serialize config for the run log: {0}")]
    ConfigJson(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub skip_games: bool,
    pub skip_players: bool,
    pub skip_transforms: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub run_id: i64,
    pub games_loaded: usize,
    pub players_loaded: usize,
    pub transforms: Vec<String>,
}

pub fn run_pipeline(
    cfg: &PipelineConfig,
    source: &dyn GameSource,
    options: RunOptions,
    capture: Option<&LogCapture>,
    now: NaiveDateTime,
) -> Result<RunSummary, PipelineError> {
    let validated = cfg.validate()?;
    let mut warehouse = Warehouse::open(&cfg.database_path)?;

    let config_json = serde_json::to_value(cfg)?;
    let run_log = RunLog::begin(warehouse.connection(), &cfg.log_table, &cfg.name, &config_json)?;
    run_log.record(warehouse.connection(), RunStatus::Start, now, None)?;
    log_run_start(&cfg.name, run_log.run_id());

    let result = run_stages(cfg, &validated, &mut warehouse, source, options, now);

    match result {
        Ok(mut summary) => {
            summary.run_id = run_log.run_id();
            log_run_finish(
                &cfg.name,
                summary.run_id,
                summary.games_loaded,
                summary.players_loaded,
            );
            let logs = capture.map(LogCapture::contents).unwrap_or_default();
            run_log.record(
                warehouse.connection(),
                RunStatus::Success,
                now,
                Some(logs.as_str()),
            )?;
            Ok(summary)
        }
        Err(err) => {
            log_run_failed(&cfg.name, run_log.run_id(), &err);
            let logs = format!(
                "{err}\n{}",
                capture.map(LogCapture::contents).unwrap_or_default()
            );
            if let Err(record_err) =
                run_log.record(warehouse.connection(), RunStatus::Fail, now, Some(logs.as_str()))
            {
                warn!(
                    component = "pipeline",
                    event = "run_log.record_failed",
                    run_id = run_log.run_id(),
                    error = %record_err
                );
            }
            Err(err)
        }
    }
}

fn run_stages(
    cfg: &PipelineConfig,
    validated: &ValidatedConfig,
    warehouse: &mut Warehouse,
    source: &dyn GameSource,
    options: RunOptions,
    now: NaiveDateTime,
) -> Result<RunSummary, PipelineError> {
    let mut summary = RunSummary::default();

    if options.skip_games {
        info!(component = "pipeline", event = "pipeline.stage.skipped", stage = "games");
    } else {
        summary.games_loaded = run_games(cfg, validated, warehouse, source, now)?;
    }

    if options.skip_players {
        info!(component = "pipeline", event = "pipeline.stage.skipped", stage = "players");
    } else {
        summary.players_loaded = run_players(cfg, validated, warehouse, source, now)?;
    }

    if options.skip_transforms {
        info!(component = "pipeline", event = "pipeline.stage.skipped", stage = "transforms");
    } else if !validated.dag.is_empty() {
        let templates = SqlTemplates::new(&cfg.transform_template_path);
        let report = validated
            .dag
            .run(&*warehouse, &templates, &validated.template_vars)?;
        summary.transforms = report.materialized;
    }

    Ok(summary)
}

fn run_games(
    cfg: &PipelineConfig,
    validated: &ValidatedConfig,
    warehouse: &mut Warehouse,
    source: &dyn GameSource,
    now: NaiveDateTime,
) -> Result<usize, PipelineError> {
    let eco = EcoCatalog::from_path(&cfg.eco_codes_path)?;
    let target = IncrementalTarget {
        table: &cfg.games.target_table,
        date_column: &cfg.games.target_column,
        username_column: USERNAME_COLUMN,
    };
    let requested = IncrementalBoundary {
        start: cfg.games.start_date,
        end: cfg.games.end_date,
    };
    let today = now.date();

    let mut rows: Vec<EnrichedGame> = Vec::new();
    for username in cfg.games.usernames.iter().filter(|u| !u.trim().is_empty()) {
        let boundary = resolve_incremental_window(&*warehouse, username, target, requested, today)?;
        if boundary.start > boundary.end {
            info!(
                component = "pipeline",
                event = "pipeline.games.up_to_date",
                username = %username,
                start = %boundary.start,
                end = %boundary.end
            );
            continue;
        }

        let window = generate_monthly_dates(boundary.start, boundary.end)?;
        let games = extract_games(source, username, &window)?;
        if games.is_empty() {
            info!(
                component = "pipeline",
                event = "pipeline.games.none",
                username = %username
            );
            continue;
        }
        rows.extend(transform_games(&games, &eco)?);
    }

    if rows.is_empty() {
        return Ok(0);
    }

    // One load for all users so `overwrite` does not discard earlier users.
    let schema = games_table_schema(&cfg.games.target_table);
    let report = warehouse.load(&rows, &schema, validated.games_load_method, cfg.chunk_size)?;
    Ok(report.rows_written)
}

fn run_players(
    cfg: &PipelineConfig,
    validated: &ValidatedConfig,
    warehouse: &mut Warehouse,
    source: &dyn GameSource,
    now: NaiveDateTime,
) -> Result<usize, PipelineError> {
    let mut snapshots: Vec<PlayerSnapshot> = Vec::with_capacity(validated.players.len());
    for username in &validated.players {
        let profile = source.fetch_profile(username)?;
        snapshots.push(snapshot_player(&profile, now)?);
        info!(
            component = "pipeline",
            event = "pipeline.player.fetched",
            username = %username,
            player_id = profile.player_id
        );
    }

    if snapshots.is_empty() {
        return Ok(0);
    }

    let schema = players_table_schema(&cfg.players.target_table);
    let report = warehouse.load(
        &snapshots,
        &schema,
        validated.players_load_method,
        cfg.chunk_size,
    )?;
    Ok(report.rows_written)
}
