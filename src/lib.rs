//! chess.com game-history ETL.
//!
//! Pulls monthly game archives and player profiles from the public API,
//! normalizes and enriches each game from the tracked user's side, loads
//! the rows into SQLite and materializes derived tables from SQL templates.

mod chess_api;
mod config;
mod eco;
mod extract;
mod features;
mod incremental;
mod move_log;
mod normalize;
mod observability;
mod pipeline;
mod players;
mod run_log;
mod store;
mod templates;
mod transform_dag;
mod windows;

pub use chess_api::{
    parse_games_response, ApiError, ChessApiClient, ChessApiConfig, GameSource,
    DEFAULT_API_BASE_URL,
};
pub use config::{
    ApiSettings, ConfigError, GamesConfig, PipelineConfig, PlayersConfig, ValidatedConfig,
    API_BASE_URL_ENV_VAR, CONFIG_ENV_VAR, DATABASE_PATH_ENV_VAR, DEFAULT_CONFIG_FILE,
    USER_AGENT_ENV_VAR,
};
pub use eco::{EcoCatalog, EcoError};
pub use extract::{extract_games, extract_games_with_summary, ExtractError, ExtractSummary};
pub use features::{
    average_move_time, enrich_game, format_duration, games_table_schema, map_match_result,
    move_time_differences, parse_clock_seconds, transform_games, EnrichedGame, FeatureError,
    MatchResult, GAME_COLUMNS, TIMESTAMP_FORMAT,
};
pub use incremental::{
    resolve_incremental_window, IncrementalBoundary, IncrementalTarget, LOOKBACK_DAYS,
};
pub use move_log::{parse_move_log, MoveLogError, MoveLogHeader};
pub use normalize::{
    extract_game_id, normalize_game, resolve_user_color, Color, InvalidColor, NormalizeError,
    NormalizedGame, RawAccuracies, RawGamePayload, RawSide,
};
pub use observability::{
    init_logging, log_app_start, log_run_failed, log_run_finish, log_run_start,
    logging_config_from_env, LogCapture, LogFormat, LoggingConfig, LoggingInitError,
};
pub use pipeline::{run_pipeline, PipelineError, RunOptions, RunSummary};
pub use players::{
    players_table_schema, snapshot_player, PlayerError, PlayerProfile, PlayerSnapshot,
    PLAYER_COLUMNS,
};
pub use run_log::{RunLog, RunLogEntry, RunStatus, DEFAULT_RUN_LOG_TABLE};
pub use store::{
    column, validate_identifier, ColumnDef, ColumnType, LoadMethod, LoadReport, SqlExecutor,
    StoreError, TableRow, TableSchema, UnknownLoadMethod, Warehouse, WarehouseQuery,
    DEFAULT_CHUNK_SIZE,
};
pub use templates::{render_str, SqlTemplates, TemplateError, TemplateVars};
pub use transform_dag::{
    default_transforms, materialize_sql, TransformDag, TransformError, TransformNode,
    TransformReport,
};
pub use windows::{generate_monthly_dates, ExtractionWindow, MonthKey, WindowError};
