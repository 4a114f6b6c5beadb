//! Pipeline configuration.
//!
//! Loaded once at process entry from a YAML file, with a handful of
//! environment overrides, then validated before any store or network I/O.
//! Core modules receive values from here and never read the environment.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chess_api::ChessApiConfig;
use crate::run_log::DEFAULT_RUN_LOG_TABLE;
use crate::store::{
    validate_identifier, LoadMethod, StoreError, UnknownLoadMethod, DEFAULT_CHUNK_SIZE,
};
use crate::templates::TemplateVars;
use crate::transform_dag::{default_transforms, TransformDag, TransformError, TransformNode};

pub const DEFAULT_CONFIG_FILE: &str = "config/pipeline.yaml";
pub const CONFIG_ENV_VAR: &str = "CHESS_ETL_CONFIG";
pub const DATABASE_PATH_ENV_VAR: &str = "CHESS_ETL_DATABASE_PATH";
pub const USER_AGENT_ENV_VAR: &str = "CHESS_API_USER_AGENT";
pub const API_BASE_URL_ENV_VAR: &str = "CHESS_API_BASE_URL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config YAML: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("missing required config key {0}")]
    MissingKey(&'static str),
    #[error("games.start_date {start} is after games.end_date {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },
    #[error(transparent)]
    LoadMethod(#[from] UnknownLoadMethod),
    #[error("invalid identifier in {key}: {source}")]
    Identifier {
        key: &'static str,
        #[source]
        source: StoreError,
    },
    #[error("chunk_size must be >= 1")]
    InvalidChunkSize,
    #[error(transparent)]
    Transform(#[from] TransformError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiSettings {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl ApiSettings {
    pub fn client_config(&self) -> ChessApiConfig {
        let defaults = ChessApiConfig::default();
        ChessApiConfig {
            base_url: self.base_url.clone().unwrap_or(defaults.base_url),
            user_agent: self.user_agent.clone().unwrap_or(defaults.user_agent),
            timeout_ms: self.timeout_ms.unwrap_or(defaults.timeout_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GamesConfig {
    #[serde(default)]
    pub usernames: Vec<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default = "default_games_table")]
    pub target_table: String,
    #[serde(default = "default_games_column")]
    pub target_column: String,
    #[serde(default = "default_games_load_method")]
    pub load_method: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayersConfig {
    #[serde(default)]
    pub usernames: Option<Vec<String>>,
    #[serde(default = "default_players_table")]
    pub target_table: String,
    #[serde(default = "default_players_load_method")]
    pub load_method: String,
}

impl Default for PlayersConfig {
    fn default() -> Self {
        Self {
            usernames: None,
            target_table: default_players_table(),
            load_method: default_players_load_method(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub name: String,
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    #[serde(default = "default_log_table")]
    pub log_table: String,
    pub eco_codes_path: PathBuf,
    #[serde(default = "default_template_path")]
    pub transform_template_path: PathBuf,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default)]
    pub api: ApiSettings,
    pub games: GamesConfig,
    #[serde(default)]
    pub players: PlayersConfig,
    #[serde(default = "default_transforms")]
    pub transforms: Vec<TransformNode>,
    #[serde(default)]
    pub template_vars: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    pub games_load_method: LoadMethod,
    pub players_load_method: LoadMethod,
    pub players: Vec<String>,
    pub dag: TransformDag,
    pub template_vars: TemplateVars,
}

impl PipelineConfig {
    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&raw)
    }

    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let path = match path {
            Some(p) => p.to_path_buf(),
            None => std::env::var(CONFIG_ENV_VAR)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE)),
        };

        let mut cfg = Self::from_path(&path)?;
        cfg.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(cfg)
    }

    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = non_empty(lookup(DATABASE_PATH_ENV_VAR)) {
            self.database_path = PathBuf::from(path);
        }
        if let Some(agent) = non_empty(lookup(USER_AGENT_ENV_VAR)) {
            self.api.user_agent = Some(agent);
        }
        if let Some(url) = non_empty(lookup(API_BASE_URL_ENV_VAR)) {
            self.api.base_url = Some(url);
        }
    }

    pub fn validate(&self) -> Result<ValidatedConfig, ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::MissingKey("name"));
        }
        if self.games.usernames.iter().all(|u| u.trim().is_empty()) {
            return Err(ConfigError::MissingKey("games.usernames"));
        }
        if self.games.start_date > self.games.end_date {
            return Err(ConfigError::InvalidDateRange {
                start: self.games.start_date,
                end: self.games.end_date,
            });
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::InvalidChunkSize);
        }

        for (key, ident) in [
            ("log_table", self.log_table.as_str()),
            ("games.target_table", self.games.target_table.as_str()),
            ("games.target_column", self.games.target_column.as_str()),
            ("players.target_table", self.players.target_table.as_str()),
        ] {
            validate_identifier(ident).map_err(|source| ConfigError::Identifier { key, source })?;
        }

        let games_load_method: LoadMethod = self.games.load_method.parse()?;
        let players_load_method: LoadMethod = self.players.load_method.parse()?;

        let dag = TransformDag::from_nodes(&self.transforms)?;
        dag.static_order()?;

        let players = self
            .players
            .usernames
            .clone()
            .unwrap_or_else(|| self.games.usernames.clone())
            .into_iter()
            .filter(|u| !u.trim().is_empty())
            .collect();

        let mut template_vars: TemplateVars = self.template_vars.clone();
        template_vars
            .entry("games_table".to_string())
            .or_insert_with(|| self.games.target_table.clone());
        template_vars
            .entry("players_table".to_string())
            .or_insert_with(|| self.players.target_table.clone());

        Ok(ValidatedConfig {
            games_load_method,
            players_load_method,
            players,
            dag,
            template_vars,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn default_database_path() -> PathBuf {
    PathBuf::from("data/chess.db")
}

fn default_log_table() -> String {
    DEFAULT_RUN_LOG_TABLE.to_string()
}

fn default_template_path() -> PathBuf {
    PathBuf::from("sql/transform")
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_games_table() -> String {
    "games".to_string()
}

fn default_games_column() -> String {
    "start_date".to_string()
}

fn default_games_load_method() -> String {
    "upsert".to_string()
}

fn default_players_table() -> String {
    "players".to_string()
}

fn default_players_load_method() -> String {
    "insert".to_string()
}
