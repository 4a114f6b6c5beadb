//! Raw API game payload → flat per-user game record.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::move_log::{parse_move_log, MoveLogError};

const MEMBER_URL_PREFIX: &str = "https://www.chess.com/member/";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawGamePayload {
    pub url: String,
    #[serde(default)]
    pub pgn: Option<String>,
    #[serde(default)]
    pub time_class: Option<String>,
    pub end_time: i64,
    pub white: RawSide,
    pub black: RawSide,
    #[serde(default)]
    pub accuracies: Option<RawAccuracies>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSide {
    pub username: String,
    pub rating: i64,
    pub result: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawAccuracies {
    #[serde(default)]
    pub white: Option<f64>,
    #[serde(default)]
    pub black: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    White,
    Black,
}

impl Color {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::White => "white",
            Self::Black => "black",
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid user color: {0}")]
pub struct InvalidColor(pub String);

impl FromStr for Color {
    type Err = InvalidColor;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "white" => Ok(Self::White),
            "black" => Ok(Self::Black),
            other => Err(InvalidColor(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedGame {
    pub game_id: i64,
    pub game_url: String,
    pub time_class: Option<String>,
    pub end_time: i64,
    pub username: String,
    pub user_color: Color,
    pub user_rating: i64,
    pub opponent: String,
    pub opponent_rating: i64,
    pub opponent_url: String,
    pub result: String,
    pub pgn_result: Option<String>,
    pub user_accuracy: Option<f64>,
    pub opponent_accuracy: Option<f64>,
    pub eco: Option<String>,
    pub eco_url: Option<String>,
    pub start_date: String,
    pub start_time: Option<String>,
    pub moves_per_player: Option<usize>,
    pub pgn: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("game url has no trailing /live/<id> or /daily/<id> segment: {url}")]
    MissingGameId { url: String },
    #[error("game id in {url} does not fit in i64")]
    GameIdOutOfRange { url: String },
    #[error("move-log for {url} has no {header} header")]
    MissingHeader { url: String, header: &'static str },
    #[error("tracked user {username} played neither side of {url}")]
    UserNotInGame { url: String, username: String },
    #[error("tracked user {username} matches both sides of {url}")]
    AmbiguousSide { url: String, username: String },
    #[error(transparent)]
    MoveLog(#[from] MoveLogError),
}

fn game_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(live|daily)/(\d+)$").expect("game id regex is valid"))
}

pub fn extract_game_id(url: &str) -> Result<i64, NormalizeError> {
    let digits = game_id_pattern()
        .captures(url)
        .and_then(|caps| caps.get(2))
        .ok_or_else(|| NormalizeError::MissingGameId {
            url: url.to_string(),
        })?;

    digits
        .as_str()
        .parse::<i64>()
        .map_err(|_| NormalizeError::GameIdOutOfRange {
            url: url.to_string(),
        })
}

pub fn resolve_user_color(game: &RawGamePayload, username: &str) -> Result<Color, NormalizeError> {
    let is_white = game.white.username.eq_ignore_ascii_case(username);
    let is_black = game.black.username.eq_ignore_ascii_case(username);

    match (is_white, is_black) {
        (true, false) => Ok(Color::White),
        (false, true) => Ok(Color::Black),
        (true, true) => Err(NormalizeError::AmbiguousSide {
            url: game.url.clone(),
            username: username.to_string(),
        }),
        (false, false) => Err(NormalizeError::UserNotInGame {
            url: game.url.clone(),
            username: username.to_string(),
        }),
    }
}

// Returns `Ok(None)` for games without a move-log (aborted games carry none).
pub fn normalize_game(
    game: &RawGamePayload,
    username: &str,
) -> Result<Option<NormalizedGame>, NormalizeError> {
    let Some(pgn) = game.pgn.as_deref() else {
        return Ok(None);
    };

    let game_id = extract_game_id(&game.url)?;
    let user_color = resolve_user_color(game, username)?;
    let (user, opponent) = match user_color {
        Color::White => (&game.white, &game.black),
        Color::Black => (&game.black, &game.white),
    };
    let (user_accuracy, opponent_accuracy) = match (game.accuracies, user_color) {
        (Some(acc), Color::White) => (acc.white, acc.black),
        (Some(acc), Color::Black) => (acc.black, acc.white),
        (None, _) => (None, None),
    };

    let header = parse_move_log(pgn)?;
    let start_date = header
        .get("Date")
        .map(|date| date.replace('.', "-"))
        .ok_or_else(|| NormalizeError::MissingHeader {
            url: game.url.clone(),
            header: "Date",
        })?;

    Ok(Some(NormalizedGame {
        game_id,
        game_url: game.url.clone(),
        time_class: game.time_class.clone(),
        end_time: game.end_time,
        username: username.to_string(),
        user_color,
        user_rating: user.rating,
        opponent: opponent.username.clone(),
        opponent_rating: opponent.rating,
        opponent_url: format!("{MEMBER_URL_PREFIX}{}", opponent.username),
        result: user.result.clone(),
        pgn_result: header.get("Result").map(str::to_string),
        user_accuracy,
        opponent_accuracy,
        eco: header.get("ECO").map(str::to_string),
        eco_url: header.get("ECOUrl").map(str::to_string),
        start_date,
        start_time: header.get("StartTime").map(str::to_string),
        moves_per_player: header.move_count_per_player,
        pgn: pgn.to_string(),
    }))
}
