//! Shared logging configuration and initialization.

use std::env;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriter, MakeWriterExt};
use tracing_subscriber::EnvFilter;

pub const LOG_LEVEL_ENV_VAR: &str = "CHESS_ETL_LOG_LEVEL";
pub const LOG_FORMAT_ENV_VAR: &str = "CHESS_ETL_LOG_FORMAT";
pub const LOG_TARGET_ENV_VAR: &str = "CHESS_ETL_LOG_TARGET";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            include_target: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoggingInitError {
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(#[from] tracing::subscriber::SetGlobalDefaultError),
}

#[derive(Debug, Clone, Default)]
pub struct LogCapture {
    inner: Arc<Mutex<Vec<u8>>>,
}

pub struct LogCaptureWriter {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&lock_buffer(&self.inner)).into_owned()
    }

    pub fn clear(&self) {
        lock_buffer(&self.inner).clear();
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogCaptureWriter {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Write for LogCaptureWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        lock_buffer(&self.inner).extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// A panic mid-write leaves at worst a truncated line; keep capturing.
fn lock_buffer(inner: &Mutex<Vec<u8>>) -> MutexGuard<'_, Vec<u8>> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub fn logging_config_from_env() -> LoggingConfig {
    let mut config = LoggingConfig::default();

    if let Ok(level) = env::var(LOG_LEVEL_ENV_VAR) {
        let trimmed = level.trim();
        if !trimmed.is_empty() {
            config.level = trimmed.to_string();
        }
    }

    if let Ok(format) = env::var(LOG_FORMAT_ENV_VAR) {
        if let Some(parsed) = parse_log_format(&format) {
            config.format = parsed;
        }
    }

    if let Ok(include_target) = env::var(LOG_TARGET_ENV_VAR) {
        if let Some(parsed) = parse_bool(&include_target) {
            config.include_target = parsed;
        }
    }

    config
}

pub fn init_logging(
    config: &LoggingConfig,
    capture: Option<&LogCapture>,
) -> Result<(), LoggingInitError> {
    let env_filter =
        EnvFilter::try_new(config.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    let writer = match capture {
        Some(capture) => BoxMakeWriter::new(io::stdout.and(capture.clone())),
        None => BoxMakeWriter::new(io::stdout),
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(config.include_target)
        .with_ansi(matches!(config.format, LogFormat::Pretty) && capture.is_none())
        .with_writer(writer);

    match config.format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.pretty().finish())?,
    }

    Ok(())
}

pub fn log_app_start(config: &LoggingConfig) {
    info!(
        component = "chess_etl",
        event = "app.start",
        version = env!("CARGO_PKG_VERSION"),
        log_level = %config.level,
        log_format = ?config.format,
        include_target = config.include_target
    );
}

pub fn log_run_start(pipeline: &str, run_id: i64) {
    info!(
        component = "pipeline",
        event = "pipeline.run.start",
        pipeline,
        run_id
    );
}

pub fn log_run_finish(pipeline: &str, run_id: i64, games: usize, players: usize) {
    info!(
        component = "pipeline",
        event = "pipeline.run.finish",
        pipeline,
        run_id,
        games,
        players
    );
}

pub fn log_run_failed(pipeline: &str, run_id: i64, err: &dyn std::error::Error) {
    error!(
        component = "pipeline",
        event = "pipeline.run.failed",
        pipeline,
        run_id,
        error = %err
    );
}

fn parse_log_format(raw: &str) -> Option<LogFormat> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "json" => Some(LogFormat::Json),
        "pretty" => Some(LogFormat::Pretty),
        _ => None,
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::OnceLock;

    fn env_lock() -> &'static Mutex<()> {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn with_env_vars<R>(vars: &[(&str, Option<&str>)], f: impl FnOnce() -> R) -> R {
        let _guard = env_lock().lock().expect("env lock should not be poisoned");
        let previous: Vec<(String, Option<String>)> = vars
            .iter()
            .map(|(key, _)| ((*key).to_string(), env::var(key).ok()))
            .collect();

        for (key, value) in vars {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }

        let output = f();

        for (key, value) in previous {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }

        output
    }

    #[test]
    fn defaults_when_env_missing() {
        let cfg = with_env_vars(
            &[
                (LOG_LEVEL_ENV_VAR, None),
                (LOG_FORMAT_ENV_VAR, None),
                (LOG_TARGET_ENV_VAR, None),
            ],
            logging_config_from_env,
        );

        assert_eq!(cfg, LoggingConfig::default());
    }

    #[test]
    fn parses_json_and_level_and_target_from_env() {
        let cfg = with_env_vars(
            &[
                (LOG_LEVEL_ENV_VAR, Some("debug")),
                (LOG_FORMAT_ENV_VAR, Some("json")),
                (LOG_TARGET_ENV_VAR, Some("false")),
            ],
            logging_config_from_env,
        );

        assert_eq!(cfg.level, "debug");
        assert_eq!(cfg.format, LogFormat::Json);
        assert!(!cfg.include_target);
    }

    #[test]
    fn invalid_format_or_target_falls_back_to_defaults() {
        let cfg = with_env_vars(
            &[
                (LOG_LEVEL_ENV_VAR, Some("trace")),
                (LOG_FORMAT_ENV_VAR, Some("yaml")),
                (LOG_TARGET_ENV_VAR, Some("maybe")),
            ],
            logging_config_from_env,
        );

        assert_eq!(cfg.level, "trace");
        assert_eq!(cfg.format, LogFormat::Pretty);
        assert!(cfg.include_target);
    }

    #[test]
    fn capture_collects_written_bytes() {
        let capture = LogCapture::new();
        let mut writer = capture.make_writer();
        writer.write_all(b"line one\n").unwrap();
        capture.make_writer().write_all(b"line two\n").unwrap();
        assert_eq!(capture.contents(), "line one\nline two\n");
        capture.clear();
        assert!(capture.contents().is_empty());
    }
}
