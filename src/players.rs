//! Player profile snapshots.

use chrono::{DateTime, NaiveDateTime};
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::features::TIMESTAMP_FORMAT;
use crate::store::{
    column, opt_integer, opt_text, text, ColumnDef, ColumnType, TableRow, TableSchema,
};

pub const PLAYER_COLUMNS: [ColumnDef; 11] = [
    column("player_id", ColumnType::Integer),
    column("snapshot_date", ColumnType::Text),
    column("name", ColumnType::Text),
    column("username", ColumnType::Text),
    column("title", ColumnType::Text),
    column("followers", ColumnType::Integer),
    column("country", ColumnType::Text),
    column("location", ColumnType::Text),
    column("last_online", ColumnType::Text),
    column("joined", ColumnType::Text),
    column("is_streamer", ColumnType::Boolean),
];

pub fn players_table_schema(table: &str) -> TableSchema {
    TableSchema {
        name: table.to_string(),
        columns: PLAYER_COLUMNS.to_vec(),
        primary_key: vec!["player_id", "snapshot_date"],
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerProfile {
    pub player_id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub followers: Option<i64>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub last_online: Option<i64>,
    #[serde(default)]
    pub joined: Option<i64>,
    #[serde(default)]
    pub is_streamer: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub player_id: i64,
    pub snapshot_date: NaiveDateTime,
    pub name: Option<String>,
    pub username: Option<String>,
    pub title: Option<String>,
    pub followers: Option<i64>,
    pub country: Option<String>,
    pub location: Option<String>,
    pub last_online: Option<NaiveDateTime>,
    pub joined: Option<NaiveDateTime>,
    pub is_streamer: Option<bool>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlayerError {
    #[error("player {player_id} has out-of-range {field} timestamp {value}")]
    InvalidTimestamp {
        player_id: i64,
        field: &'static str,
        value: i64,
    },
}

impl TableRow for PlayerSnapshot {
    fn sql_values(&self) -> Vec<Value> {
        vec![
            Value::Integer(self.player_id),
            text(self.snapshot_date.format(TIMESTAMP_FORMAT).to_string()),
            opt_text(self.name.as_deref()),
            opt_text(self.username.as_deref()),
            opt_text(self.title.as_deref()),
            opt_integer(self.followers),
            opt_text(self.country.as_deref()),
            opt_text(self.location.as_deref()),
            opt_text(self.last_online.map(|t| t.format(TIMESTAMP_FORMAT).to_string())),
            opt_text(self.joined.map(|t| t.format(TIMESTAMP_FORMAT).to_string())),
            opt_integer(self.is_streamer.map(i64::from)),
        ]
    }
}

pub fn snapshot_player(
    profile: &PlayerProfile,
    snapshot_date: NaiveDateTime,
) -> Result<PlayerSnapshot, PlayerError> {
    Ok(PlayerSnapshot {
        player_id: profile.player_id,
        snapshot_date,
        name: profile.name.clone(),
        username: profile.username.clone(),
        title: profile.title.clone(),
        followers: profile.followers,
        country: profile.country.clone(),
        location: profile.location.clone(),
        last_online: epoch_to_utc(profile.player_id, "last_online", profile.last_online)?,
        joined: epoch_to_utc(profile.player_id, "joined", profile.joined)?,
        is_streamer: profile.is_streamer,
    })
}

fn epoch_to_utc(
    player_id: i64,
    field: &'static str,
    value: Option<i64>,
) -> Result<Option<NaiveDateTime>, PlayerError> {
    value
        .map(|secs| {
            DateTime::from_timestamp(secs, 0)
                .map(|dt| dt.naive_utc())
                .ok_or(PlayerError::InvalidTimestamp {
                    player_id,
                    field,
                    value: secs,
                })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn profile_ignores_unknown_fields_and_defaults_missing_ones() {
        let json = r#"{"player_id":41,"@id":"x","username":"hikaru","followers":10,
            "last_online":1700000000,"joined":1389043258,"status":"premium"}"#;
        let profile: PlayerProfile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.player_id, 41);
        assert_eq!(profile.title, None);
        assert_eq!(profile.is_streamer, None);
    }

    #[test]
    fn epoch_fields_become_utc_timestamps() {
        let profile = PlayerProfile {
            player_id: 7,
            name: None,
            username: Some("someone".to_string()),
            title: Some("GM".to_string()),
            followers: Some(3),
            country: None,
            location: None,
            last_online: Some(1_672_531_200),
            joined: None,
            is_streamer: Some(true),
        };
        let snapshot_date = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let snapshot = snapshot_player(&profile, snapshot_date).unwrap();
        assert_eq!(
            snapshot.last_online.unwrap().to_string(),
            "2023-01-01 00:00:00"
        );
        assert_eq!(snapshot.joined, None);

        let values = snapshot.sql_values();
        assert_eq!(values.len(), PLAYER_COLUMNS.len());
        assert_eq!(values[1], Value::Text("2024-05-01 12:00:00".to_string()));
        assert_eq!(values[10], Value::Integer(1));
    }
}
