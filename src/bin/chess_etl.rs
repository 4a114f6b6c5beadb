use std::path::PathBuf;

use chess_etl::{
    init_logging, log_app_start, logging_config_from_env, run_pipeline, ChessApiClient,
    LogCapture, PipelineConfig, RunOptions, CONFIG_ENV_VAR,
};
use chrono::Utc;
use clap::Parser;

#[derive(Parser)]
#[command(name = "chess-etl")]
#[command(about = "Load chess.com game history and player profiles into SQLite", long_about = None)]
struct Cli {
    /// Pipeline YAML file (defaults to config/pipeline.yaml)
    #[arg(short, long, env = CONFIG_ENV_VAR)]
    config: Option<PathBuf>,

    /// Skip the games extract/transform/load stage
    #[arg(long)]
    skip_games: bool,

    /// Skip player profile snapshots
    #[arg(long)]
    skip_players: bool,

    /// Skip the derived-table SQL transforms
    #[arg(long)]
    skip_transforms: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let logging = logging_config_from_env();
    let capture = LogCapture::new();
    init_logging(&logging, Some(&capture))?;
    log_app_start(&logging);

    let cfg = PipelineConfig::load(cli.config.as_deref())?;
    let client = ChessApiClient::new(cfg.api.client_config())?;
    let options = RunOptions {
        skip_games: cli.skip_games,
        skip_players: cli.skip_players,
        skip_transforms: cli.skip_transforms,
    };

    let summary = run_pipeline(
        &cfg,
        &client,
        options,
        Some(&capture),
        Utc::now().naive_utc(),
    )?;

    println!(
        "run {} complete | games={} players={} transforms={}",
        summary.run_id,
        summary.games_loaded,
        summary.players_loaded,
        summary.transforms.join(",")
    );

    Ok(())
}
