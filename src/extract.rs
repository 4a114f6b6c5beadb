//! Month-by-month game extraction for one tracked user.

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{debug, info};

use crate::chess_api::{ApiError, GameSource};
use crate::normalize::{normalize_game, NormalizeError, NormalizedGame};
use crate::windows::ExtractionWindow;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
    #[error("game {game_id} has start date {value:?}, expected YYYY-MM-DD")]
    InvalidStartDate { game_id: i64, value: String },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractSummary {
    pub months_queried: usize,
    pub payloads_seen: usize,
    pub skipped_without_move_log: usize,
    pub outside_window: usize,
}

pub fn extract_games(
    source: &dyn GameSource,
    username: &str,
    window: &ExtractionWindow,
) -> Result<Vec<NormalizedGame>, ExtractError> {
    extract_games_with_summary(source, username, window).map(|(games, _)| games)
}

pub fn extract_games_with_summary(
    source: &dyn GameSource,
    username: &str,
    window: &ExtractionWindow,
) -> Result<(Vec<NormalizedGame>, ExtractSummary), ExtractError> {
    let mut games = Vec::new();
    let mut summary = ExtractSummary::default();

    for month in window.month_keys() {
        let payloads = source.fetch_games(username, month)?;
        summary.months_queried += 1;
        summary.payloads_seen += payloads.len();

        let mut kept = 0usize;
        for payload in &payloads {
            let Some(game) = normalize_game(payload, username)? else {
                summary.skipped_without_move_log += 1;
                debug!(
                    component = "extract",
                    event = "extract.game.skipped",
                    url = %payload.url,
                    reason = "no_move_log"
                );
                continue;
            };

            let start_date = NaiveDate::parse_from_str(&game.start_date, "%Y-%m-%d").map_err(
                |_| ExtractError::InvalidStartDate {
                    game_id: game.game_id,
                    value: game.start_date.clone(),
                },
            )?;
            if !window.contains(start_date) {
                summary.outside_window += 1;
                continue;
            }

            games.push(game);
            kept += 1;
        }

        info!(
            component = "extract",
            event = "extract.month.fetched",
            username,
            year = month.year,
            month = month.month,
            payloads = payloads.len(),
            kept
        );
    }

    info!(
        component = "extract",
        event = "extract.finish",
        username,
        start = %window.start(),
        end = %window.end(),
        months = summary.months_queried,
        games = games.len(),
        skipped = summary.skipped_without_move_log,
        outside_window = summary.outside_window
    );

    Ok((games, summary))
}
