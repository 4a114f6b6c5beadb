//! Blocking client for the chess.com public API.

use std::time::Duration;

use reqwest::header::USER_AGENT;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::normalize::RawGamePayload;
use crate::players::PlayerProfile;
use crate::windows::MonthKey;

pub const DEFAULT_API_BASE_URL: &str = "https://api.chess.com/pub";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChessApiConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout_ms: u64,
}

impl Default for ChessApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            user_agent: concat!("chess-etl/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_ms: 15_000,
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP client build error: {0}")]
    HttpClientBuild(String),
    #[error("HTTP request failed for {url}: {message}")]
    HttpRequest { url: String, message: String },
    #[error("unexpected HTTP status {status} for {url}: {body}")]
    HttpStatus { url: String, status: u16, body: String },
    #[error("failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },
    #[error("response from {url} has no {key:?} field")]
    MissingField { url: String, key: &'static str },
}

pub trait GameSource {
    fn fetch_games(&self, username: &str, month: MonthKey)
        -> Result<Vec<RawGamePayload>, ApiError>;

    fn fetch_profile(&self, username: &str) -> Result<PlayerProfile, ApiError>;
}

#[derive(Debug, Deserialize)]
struct GamesEnvelope {
    games: Option<Vec<RawGamePayload>>,
}

#[derive(Debug, Clone)]
pub struct ChessApiClient {
    client: reqwest::blocking::Client,
    cfg: ChessApiConfig,
}

impl ChessApiClient {
    pub fn new(cfg: ChessApiConfig) -> Result<Self, ApiError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|err| ApiError::HttpClientBuild(err.to_string()))?;
        Ok(Self { client, cfg })
    }

    pub fn monthly_games_url(&self, username: &str, month: MonthKey) -> String {
        format!(
            "{}/player/{}/games/{:04}/{:02}",
            self.cfg.base_url.trim_end_matches('/'),
            username,
            month.year,
            month.month
        )
    }

    pub fn profile_url(&self, username: &str) -> String {
        format!(
            "{}/player/{}",
            self.cfg.base_url.trim_end_matches('/'),
            username
        )
    }

    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        debug!(component = "chess_api", event = "api.request", url);
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, self.cfg.user_agent.as_str())
            .send()
            .map_err(|err| ApiError::HttpRequest {
                url: url.to_string(),
                message: err.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ApiError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        response
            .bytes()
            .map(|bytes| bytes.to_vec())
            .map_err(|err| ApiError::HttpRequest {
                url: url.to_string(),
                message: err.to_string(),
            })
    }
}

impl GameSource for ChessApiClient {
    fn fetch_games(
        &self,
        username: &str,
        month: MonthKey,
    ) -> Result<Vec<RawGamePayload>, ApiError> {
        let url = self.monthly_games_url(username, month);
        let bytes = self.get_bytes(&url)?;
        let games = parse_games_response(&url, &bytes)?;
        info!(
            component = "chess_api",
            event = "api.games.fetched",
            username,
            year = month.year,
            month = month.month,
            games = games.len()
        );
        Ok(games)
    }

    fn fetch_profile(&self, username: &str) -> Result<PlayerProfile, ApiError> {
        let url = self.profile_url(username);
        let bytes = self.get_bytes(&url)?;
        decode(&url, &bytes)
    }
}

pub fn parse_games_response(url: &str, body: &[u8]) -> Result<Vec<RawGamePayload>, ApiError> {
    let envelope: GamesEnvelope = decode(url, body)?;
    envelope.games.ok_or_else(|| ApiError::MissingField {
        url: url.to_string(),
        key: "games",
    })
}

fn decode<T: DeserializeOwned>(url: &str, body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|err| ApiError::Decode {
        url: url.to_string(),
        message: err.to_string(),
    })
}
