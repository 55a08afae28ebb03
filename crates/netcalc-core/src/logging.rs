//! Logging setup shared by both binaries.
//!
//! Every record goes to two places: a console writer chosen by the caller
//! (stdout, stderr, or the server's in-memory ring behind the status table)
//! and an append-only log file. The file keeps growing across runs, so each
//! run starts with a banner record from [`log_new_start`].

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{
    EnvFilter, Layer, fmt, fmt::MakeWriter, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::timestamp::Timestamp;

/// Errors from installing the logging pipeline.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The log path has no file name component.
    #[error("invalid log file path: {}", .0.display())]
    InvalidPath(PathBuf),

    /// The level string is not a valid filter directive.
    #[error("invalid log filter: {0}")]
    Filter(String),

    /// The log file could not be opened.
    #[error("cannot open log file: {0}")]
    Open(String),

    /// A global subscriber is already installed.
    #[error("failed to install subscriber: {0}")]
    Install(String),
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Append-only log file.
    pub file: PathBuf,
    /// Filter directive used when `RUST_LOG` is unset (e.g. "info").
    pub level: String,
    /// Separate directive for the console writer; `None` uses `level`.
    pub console_level: Option<String>,
    /// Emit ANSI colors on the console writer.
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file: PathBuf::from("netcalc.log"),
            level: "info".to_string(),
            console_level: None,
            ansi: true,
        }
    }
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer when dropped; keep it alive
/// until the process has finished logging.
pub fn init_logging<W>(config: &LogConfig, console: W) -> Result<WorkerGuard, LoggingError>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let file_name = config
        .file
        .file_name()
        .ok_or_else(|| LoggingError::InvalidPath(config.file.clone()))?
        .to_string_lossy()
        .into_owned();
    let directory = config
        .file
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name)
        .build(directory)
        .map_err(|e| LoggingError::Open(e.to_string()))?;
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(console)
                .with_ansi(config.ansi)
                .with_target(false)
                .with_filter(build_filter(config.console_level.as_deref().unwrap_or(&config.level))?),
        )
        .with(
            fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_filter(build_filter(&config.level)?),
        )
        .try_init()
        .map_err(|e| LoggingError::Install(e.to_string()))?;

    Ok(guard)
}

/// Record the start of a new run in the append-only log.
pub fn log_new_start(process: &str) {
    tracing::info!(
        pid = std::process::id(),
        started_at = %Timestamp::now(),
        "=========== new start: {process} ==========="
    );
}

fn build_filter(level: &str) -> Result<EnvFilter, LoggingError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level).map_err(|e| LoggingError::Filter(e.to_string())),
    }
}
