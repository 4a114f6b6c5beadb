//! Normalized games → enriched rows for the games table.

use std::sync::OnceLock;

use chrono::{DateTime, NaiveDateTime};
use regex::Regex;
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::eco::EcoCatalog;
use crate::normalize::{Color, NormalizedGame};
use crate::store::{
    column, opt_integer, opt_real, opt_text, text, ColumnDef, ColumnType, TableRow, TableSchema,
};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const GAME_COLUMNS: [ColumnDef; 21] = [
    column("game_id", ColumnType::Integer),
    column("game_url", ColumnType::Text),
    column("game_mode", ColumnType::Text),
    column("start_date", ColumnType::Text),
    column("username", ColumnType::Text),
    column("user_color", ColumnType::Text),
    column("user_rating", ColumnType::Integer),
    column("user_accuracy", ColumnType::Real),
    column("opponent", ColumnType::Text),
    column("opponent_rating", ColumnType::Integer),
    column("opponent_accuracy", ColumnType::Real),
    column("rating_diff", ColumnType::Integer),
    column("match_result", ColumnType::Text),
    column("result_subcategory", ColumnType::Text),
    column("start_date_time", ColumnType::Text),
    column("end_date_time", ColumnType::Text),
    column("game_duration", ColumnType::Text),
    column("game_duration_sec", ColumnType::Integer),
    column("rounds", ColumnType::Integer),
    column("user_avg_move_time_sec", ColumnType::Real),
    column("opening", ColumnType::Text),
];

pub fn games_table_schema(table: &str) -> TableSchema {
    TableSchema {
        name: table.to_string(),
        columns: GAME_COLUMNS.to_vec(),
        primary_key: vec!["game_id", "username"],
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchResult {
    Win,
    Defeat,
    Draw,
}

impl MatchResult {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Win => "win",
            Self::Defeat => "defeat",
            Self::Draw => "draw",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedGame {
    pub game_id: i64,
    pub game_url: String,
    pub game_mode: Option<String>,
    pub start_date: String,
    pub username: String,
    pub user_color: Color,
    pub user_rating: i64,
    pub user_accuracy: Option<f64>,
    pub opponent: String,
    pub opponent_rating: i64,
    pub opponent_accuracy: Option<f64>,
    pub rating_diff: i64,
    pub match_result: Option<MatchResult>,
    pub result_subcategory: String,
    pub start_date_time: NaiveDateTime,
    pub end_date_time: NaiveDateTime,
    pub game_duration: String,
    pub game_duration_sec: i64,
    pub rounds: Option<usize>,
    pub user_avg_move_time_sec: f64,
    pub opening: Option<String>,
}

impl TableRow for EnrichedGame {
    fn sql_values(&self) -> Vec<Value> {
        vec![
            Value::Integer(self.game_id),
            text(self.game_url.as_str()),
            opt_text(self.game_mode.as_deref()),
            text(self.start_date.as_str()),
            text(self.username.as_str()),
            text(self.user_color.as_str()),
            Value::Integer(self.user_rating),
            opt_real(self.user_accuracy),
            text(self.opponent.as_str()),
            Value::Integer(self.opponent_rating),
            opt_real(self.opponent_accuracy),
            Value::Integer(self.rating_diff),
            opt_text(self.match_result.map(MatchResult::as_str)),
            text(self.result_subcategory.as_str()),
            text(self.start_date_time.format(TIMESTAMP_FORMAT).to_string()),
            text(self.end_date_time.format(TIMESTAMP_FORMAT).to_string()),
            text(self.game_duration.as_str()),
            Value::Integer(self.game_duration_sec),
            opt_integer(self.rounds.map(|r| r as i64)),
            Value::Real(self.user_avg_move_time_sec),
            opt_text(self.opening.as_deref()),
        ]
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FeatureError {
    #[error("game {game_id} has no StartTime header")]
    MissingStartTime { game_id: i64 },
    #[error("game {game_id} has unparseable start timestamp {value:?}")]
    InvalidStartTimestamp { game_id: i64, value: String },
    #[error("game {game_id} has out-of-range end timestamp {end_time}")]
    InvalidEndTimestamp { game_id: i64, end_time: i64 },
}

fn clock_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\[%clk (\d+):(\d+):(\d+(?:\.\d+)?)\]").expect("clock regex is valid")
    })
}

pub fn parse_clock_seconds(move_log: &str) -> Vec<f64> {
    clock_pattern()
        .captures_iter(move_log)
        .filter_map(|caps| {
            let hours: f64 = caps.get(1)?.as_str().parse().ok()?;
            let minutes: f64 = caps.get(2)?.as_str().parse().ok()?;
            let seconds: f64 = caps.get(3)?.as_str().parse().ok()?;
            Some(hours * 3600.0 + minutes * 60.0 + seconds)
        })
        .collect()
}

pub fn move_time_differences(clocks: &[f64]) -> Vec<f64> {
    clocks.windows(2).map(|pair| pair[0] - pair[1]).collect()
}

pub fn average_move_time(move_log: &str, color: Color) -> f64 {
    let clocks = parse_clock_seconds(move_log);
    let offset = match color {
        Color::White => 0,
        Color::Black => 1,
    };
    let side: Vec<f64> = clocks.iter().skip(offset).step_by(2).copied().collect();
    let diffs = move_time_differences(&side);
    if diffs.is_empty() {
        return 0.0;
    }
    round_to_tenth(diffs.iter().sum::<f64>() / diffs.len() as f64)
}

pub fn map_match_result(token: &str) -> Option<MatchResult> {
    match token {
        "1-0" => Some(MatchResult::Win),
        "0-1" => Some(MatchResult::Defeat),
        "1/2-1/2" => Some(MatchResult::Draw),
        _ => None,
    }
}

pub fn format_duration(total_seconds: i64) -> String {
    let sign = if total_seconds < 0 { "-" } else { "" };
    let abs = total_seconds.unsigned_abs();
    let hours = abs / 3600;
    let minutes = (abs % 3600) / 60;
    let seconds = abs % 60;
    format!("{sign}{hours:02}:{minutes:02}:{seconds:02}")
}

pub fn enrich_game(game: &NormalizedGame, eco: &EcoCatalog) -> Result<EnrichedGame, FeatureError> {
    let start_time = game
        .start_time
        .as_deref()
        .ok_or(FeatureError::MissingStartTime {
            game_id: game.game_id,
        })?;
    let start_raw = format!("{} {}", game.start_date, start_time);
    let start_date_time = NaiveDateTime::parse_from_str(&start_raw, TIMESTAMP_FORMAT).map_err(
        |_| FeatureError::InvalidStartTimestamp {
            game_id: game.game_id,
            value: start_raw.clone(),
        },
    )?;
    let end_date_time = DateTime::from_timestamp(game.end_time, 0)
        .ok_or(FeatureError::InvalidEndTimestamp {
            game_id: game.game_id,
            end_time: game.end_time,
        })?
        .naive_utc();

    let game_duration_sec = (end_date_time - start_date_time).num_seconds();

    Ok(EnrichedGame {
        game_id: game.game_id,
        game_url: game.game_url.clone(),
        game_mode: game.time_class.clone(),
        start_date: game.start_date.clone(),
        username: game.username.clone(),
        user_color: game.user_color,
        user_rating: game.user_rating,
        user_accuracy: game.user_accuracy,
        opponent: game.opponent.clone(),
        opponent_rating: game.opponent_rating,
        opponent_accuracy: game.opponent_accuracy,
        rating_diff: game.user_rating - game.opponent_rating,
        match_result: game.pgn_result.as_deref().and_then(map_match_result),
        result_subcategory: game.result.clone(),
        start_date_time,
        end_date_time,
        game_duration: format_duration(game_duration_sec),
        game_duration_sec,
        rounds: game.moves_per_player,
        user_avg_move_time_sec: average_move_time(&game.pgn, game.user_color),
        opening: game
            .eco
            .as_deref()
            .and_then(|code| eco.describe(code))
            .map(str::to_string),
    })
}

pub fn transform_games(
    games: &[NormalizedGame],
    eco: &EcoCatalog,
) -> Result<Vec<EnrichedGame>, FeatureError> {
    info!(
        component = "features",
        event = "features.transform.start",
        input_rows = games.len()
    );

    let enriched = games
        .iter()
        .map(|game| enrich_game(game, eco))
        .collect::<Result<Vec<_>, _>>()?;

    let unmatched_openings = enriched.iter().filter(|g| g.opening.is_none()).count();
    info!(
        component = "features",
        event = "features.transform.finish",
        output_rows = enriched.len(),
        unmatched_openings
    );

    Ok(enriched)
}

fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
