//! SQLite warehouse: table loads, metadata queries and raw statement execution.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use thiserror::Error;
use tracing::{debug, info};

pub const DEFAULT_CHUNK_SIZE: usize = 1_000;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid SQL identifier: {0:?}")]
    InvalidIdentifier(String),
    #[error("chunk size must be >= 1")]
    InvalidChunkSize,
    #[error("row has {found} values, table {table} expects {expected}")]
    RowWidth {
        table: String,
        expected: usize,
        found: usize,
    },
    #[error("{table}.{column} holds {value:?}, which is not a YYYY-MM-DD date")]
    InvalidDate {
        table: String,
        column: String,
        value: String,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown load method {0:?}; expected one of insert, upsert, overwrite")]
pub struct UnknownLoadMethod(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMethod {
    Insert,
    Upsert,
    Overwrite,
}

impl LoadMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Upsert => "upsert",
            Self::Overwrite => "overwrite",
        }
    }
}

impl FromStr for LoadMethod {
    type Err = UnknownLoadMethod;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "insert" => Ok(Self::Insert),
            "upsert" => Ok(Self::Upsert),
            "overwrite" => Ok(Self::Overwrite),
            _ => Err(UnknownLoadMethod(raw.to_string())),
        }
    }
}

impl fmt::Display for LoadMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
    Boolean,
}

impl ColumnType {
    fn ddl(self) -> &'static str {
        match self {
            Self::Integer | Self::Boolean => "INTEGER",
            Self::Real => "REAL",
            Self::Text => "TEXT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub sql_type: ColumnType,
}

pub const fn column(name: &'static str, sql_type: ColumnType) -> ColumnDef {
    ColumnDef { name, sql_type }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub primary_key: Vec<&'static str>,
}

impl TableSchema {
    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.name).collect()
    }

    fn create_sql(&self) -> String {
        let mut parts: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("{} {}", c.name, c.sql_type.ddl()))
            .collect();
        if !self.primary_key.is_empty() {
            parts.push(format!("PRIMARY KEY({})", self.primary_key.join(", ")));
        }
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.name,
            parts.join(", ")
        )
    }

    fn insert_sql(&self, method: LoadMethod) -> String {
        let names = self.column_names();
        let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("?{i}")).collect();
        let insert = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.name,
            names.join(", "),
            placeholders.join(", ")
        );

        if method != LoadMethod::Upsert || self.primary_key.is_empty() {
            return insert;
        }

        let updates: Vec<String> = names
            .iter()
            .filter(|name| !self.primary_key.contains(name))
            .map(|name| format!("{name} = excluded.{name}"))
            .collect();
        if updates.is_empty() {
            format!(
                "{insert} ON CONFLICT({}) DO NOTHING",
                self.primary_key.join(", ")
            )
        } else {
            format!(
                "{insert} ON CONFLICT({}) DO UPDATE SET {}",
                self.primary_key.join(", "),
                updates.join(", ")
            )
        }
    }
}

pub trait TableRow {
    fn sql_values(&self) -> Vec<Value>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadReport {
    pub rows_written: usize,
    pub chunks: usize,
}

pub trait WarehouseQuery {
    fn table_exists(&self, table: &str) -> Result<bool, StoreError>;

    fn max_value(
        &self,
        table: &str,
        column: &str,
        filter: (&str, &str),
    ) -> Result<Option<NaiveDate>, StoreError>;
}

pub trait SqlExecutor {
    fn execute_batch(&self, sql: &str) -> Result<(), StoreError>;
}

pub fn validate_identifier(name: &str) -> Result<(), StoreError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };

    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidIdentifier(name.to_string()))
    }
}

pub struct Warehouse {
    conn: Connection,
}

impl fmt::Debug for Warehouse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Warehouse")
            .field("path", &self.conn.path())
            .finish()
    }
}

impl Warehouse {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA temp_store=MEMORY;
            ",
        )?;

        Ok(Self { conn })
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn create_table(&self, schema: &TableSchema) -> Result<(), StoreError> {
        validate_schema(schema)?;
        self.conn.execute_batch(&schema.create_sql())?;
        Ok(())
    }

    pub fn drop_table(&self, table: &str) -> Result<(), StoreError> {
        validate_identifier(table)?;
        self.conn
            .execute_batch(&format!("DROP TABLE IF EXISTS {table}"))?;
        Ok(())
    }

    pub fn load<R: TableRow>(
        &mut self,
        rows: &[R],
        schema: &TableSchema,
        method: LoadMethod,
        chunk_size: usize,
    ) -> Result<LoadReport, StoreError> {
        if chunk_size == 0 {
            return Err(StoreError::InvalidChunkSize);
        }
        validate_schema(schema)?;

        if method == LoadMethod::Overwrite {
            self.drop_table(&schema.name)?;
        }
        self.create_table(schema)?;

        let sql = schema.insert_sql(method);
        let mut report = LoadReport {
            rows_written: 0,
            chunks: 0,
        };

        for chunk in rows.chunks(chunk_size) {
            let tx = self.conn.transaction()?;
            {
                let mut stmt = tx.prepare(&sql)?;
                for row in chunk {
                    let values = row.sql_values();
                    if values.len() != schema.columns.len() {
                        return Err(StoreError::RowWidth {
                            table: schema.name.clone(),
                            expected: schema.columns.len(),
                            found: values.len(),
                        });
                    }
                    stmt.execute(params_from_iter(values))?;
                }
            }
            tx.commit()?;

            report.rows_written += chunk.len();
            report.chunks += 1;
            debug!(
                component = "store",
                event = "store.load.chunk",
                table = %schema.name,
                method = method.as_str(),
                chunk = report.chunks,
                rows = chunk.len()
            );
        }

        info!(
            component = "store",
            event = "store.load.finish",
            table = %schema.name,
            method = method.as_str(),
            rows_written = report.rows_written,
            chunks = report.chunks
        );

        Ok(report)
    }

    pub fn count_rows(&self, table: &str) -> Result<u64, StoreError> {
        validate_identifier(table)?;
        let count: i64 =
            self.conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                    row.get(0)
                })?;
        Ok(count as u64)
    }
}

impl WarehouseQuery for Warehouse {
    fn table_exists(&self, table: &str) -> Result<bool, StoreError> {
        let exists = self
            .conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type='table' AND name=?1 LIMIT 1",
                params![table],
                |row| row.get::<_, i64>(0),
            )
            .optional()?
            .is_some();
        Ok(exists)
    }

    fn max_value(
        &self,
        table: &str,
        column: &str,
        filter: (&str, &str),
    ) -> Result<Option<NaiveDate>, StoreError> {
        validate_identifier(table)?;
        validate_identifier(column)?;
        validate_identifier(filter.0)?;

        let sql = format!("SELECT MAX({column}) FROM {table} WHERE {} = ?1", filter.0);
        let raw: Option<String> = self
            .conn
            .query_row(&sql, params![filter.1], |row| row.get(0))?;

        raw.map(|value| {
            let date_part = value.get(..10).unwrap_or(&value);
            NaiveDate::parse_from_str(date_part, "%Y-%m-%d").map_err(|_| StoreError::InvalidDate {
                table: table.to_string(),
                column: column.to_string(),
                value: value.clone(),
            })
        })
        .transpose()
    }
}

impl SqlExecutor for Warehouse {
    fn execute_batch(&self, sql: &str) -> Result<(), StoreError> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }
}

fn validate_schema(schema: &TableSchema) -> Result<(), StoreError> {
    validate_identifier(&schema.name)?;
    for column in &schema.columns {
        validate_identifier(column.name)?;
    }
    Ok(())
}

pub fn text(value: impl Into<String>) -> Value {
    Value::Text(value.into())
}

pub fn opt_text(value: Option<impl Into<String>>) -> Value {
    value.map(|v| Value::Text(v.into())).unwrap_or(Value::Null)
}

pub fn opt_integer(value: Option<i64>) -> Value {
    value.map(Value::Integer).unwrap_or(Value::Null)
}

pub fn opt_real(value: Option<f64>) -> Value {
    value.map(Value::Real).unwrap_or(Value::Null)
}
