//! Per-run status rows in `pipeline_logs`.

use std::fmt;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use tracing::debug;

use crate::features::TIMESTAMP_FORMAT;
use crate::store::{validate_identifier, StoreError};

pub const DEFAULT_RUN_LOG_TABLE: &str = "pipeline_logs";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Start,
    Success,
    Fail,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Success => "success",
            Self::Fail => "fail",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLogEntry {
    pub run_id: i64,
    pub timestamp: String,
    pub status: String,
    pub config: String,
    pub logs: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLog {
    table: String,
    pipeline_name: String,
    run_id: i64,
    config_json: String,
}

impl RunLog {
    pub fn begin(
        conn: &Connection,
        table: &str,
        pipeline_name: &str,
        config: &serde_json::Value,
    ) -> Result<Self, StoreError> {
        validate_identifier(table)?;
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                pipeline_name TEXT NOT NULL,
                run_id INTEGER NOT NULL,
                timestamp TEXT NOT NULL,
                status TEXT NOT NULL,
                config TEXT,
                logs TEXT,
                PRIMARY KEY (pipeline_name, run_id, timestamp, status)
            )"
        ))?;

        let last: Option<i64> = conn.query_row(
            &format!("SELECT MAX(run_id) FROM {table} WHERE pipeline_name = ?1"),
            params![pipeline_name],
            |row| row.get(0),
        )?;

        Ok(Self {
            table: table.to_string(),
            pipeline_name: pipeline_name.to_string(),
            run_id: last.map_or(1, |id| id + 1),
            config_json: config.to_string(),
        })
    }

    pub fn run_id(&self) -> i64 {
        self.run_id
    }

    pub fn pipeline_name(&self) -> &str {
        &self.pipeline_name
    }

    pub fn record(
        &self,
        conn: &Connection,
        status: RunStatus,
        at: NaiveDateTime,
        logs: Option<&str>,
    ) -> Result<(), StoreError> {
        conn.execute(
            &format!(
                "INSERT INTO {} (pipeline_name, run_id, timestamp, status, config, logs)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                self.table
            ),
            params![
                self.pipeline_name,
                self.run_id,
                at.format(TIMESTAMP_FORMAT).to_string(),
                status.as_str(),
                self.config_json,
                logs
            ],
        )?;
        debug!(
            component = "run_log",
            event = "run_log.recorded",
            pipeline = %self.pipeline_name,
            run_id = self.run_id,
            status = status.as_str()
        );
        Ok(())
    }

    pub fn entries(&self, conn: &Connection) -> Result<Vec<RunLogEntry>, StoreError> {
        let mut stmt = conn.prepare(&format!(
            "SELECT run_id, timestamp, status, config, logs FROM {}
             WHERE pipeline_name = ?1 ORDER BY run_id, rowid",
            self.table
        ))?;
        let rows = stmt.query_map(params![self.pipeline_name], |row| {
            Ok(RunLogEntry {
                run_id: row.get(0)?,
                timestamp: row.get(1)?,
                status: row.get(2)?,
                config: row.get(3)?,
                logs: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}
