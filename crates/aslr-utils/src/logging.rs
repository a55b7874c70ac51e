//! # Logging Utilities
//!
//! Logging infrastructure for `get_aslr` using `tracing`.
//!
//! Records always go to **stderr**. Standard output carries exactly one line,
//! the slide, and nothing else may be written there.
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Log filter (e.g., `RUST_LOG=debug`, `RUST_LOG=aslr_core=trace`). Defaults to `warn`.
//! - `GET_ASLR_LOG_FORMAT`: Output format (`json` or `pretty`, default: `pretty`)
//! - `GET_ASLR_LOG_FILE`: Optional path to a log file, rotated daily
//!
//! ## Example
//!
//! ```rust,no_run
//! use aslr_utils::init_logging;
//!
//! // Keep the guard alive until the program exits so buffered file records are flushed.
//! let _guard = init_logging().expect("Failed to initialize logging");
//! tracing::debug!("starting");
//! ```

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, io};

use tracing::{Level, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::writer::MakeWriter;
use tracing_subscriber::fmt::{self};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Environment variable selecting the output format.
pub const LOG_FORMAT_ENV: &str = "GET_ASLR_LOG_FORMAT";

/// Environment variable naming an optional log file.
pub const LOG_FILE_ENV: &str = "GET_ASLR_LOG_FILE";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat
{
    /// Pretty-printed, human-readable format (default)
    #[default]
    Pretty,
    /// JSON format, one object per line
    Json,
}

impl FromStr for LogFormat
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.trim().to_lowercase().as_str() {
            "pretty" | "dev" | "development" => Ok(LogFormat::Pretty),
            "json" | "prod" | "production" => Ok(LogFormat::Json),
            _ => Err(LoggingError::InvalidFormat(format!("{s}. Use 'pretty' or 'json'"))),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel
{
    /// Error level
    Error,
    /// Warning level (default)
    Warn,
    /// Info level
    Info,
    /// Debug level
    Debug,
    /// Trace level (most verbose)
    Trace,
}

impl Default for LogLevel
{
    fn default() -> Self
    {
        LogLevel::Warn
    }
}

impl From<LogLevel> for Level
{
    fn from(level: LogLevel) -> Self
    {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

impl FromStr for LogLevel
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.trim().to_lowercase().as_str() {
            "error" | "err" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" | "dbg" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(LoggingError::InvalidLevel(format!(
                "{s}. Use 'error', 'warn', 'info', 'debug', or 'trace'"
            ))),
        }
    }
}

/// Resolved logging configuration.
///
/// Built from the environment by [`LoggingConfig::from_env`], or by hand when a
/// caller wants to pin the settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggingConfig
{
    /// Level used when `filter` is unset or unparseable
    pub default_level: LogLevel,
    /// `EnvFilter` directives, taken from `RUST_LOG`
    pub filter: Option<String>,
    /// Output format for every layer
    pub format: LogFormat,
    /// Optional file receiving a copy of every record
    pub file: Option<PathBuf>,
}

impl LoggingConfig
{
    /// Read the configuration from `RUST_LOG`, `GET_ASLR_LOG_FORMAT` and `GET_ASLR_LOG_FILE`.
    ///
    /// An unknown format falls back to [`LogFormat::Pretty`]; an empty file path
    /// is treated as unset.
    pub fn from_env() -> Self
    {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self
    {
        let format = lookup(LOG_FORMAT_ENV)
            .and_then(|s| LogFormat::from_str(&s).ok())
            .unwrap_or_default();
        let file = lookup(LOG_FILE_ENV)
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);
        let filter = lookup(EnvFilter::DEFAULT_ENV).filter(|s| !s.trim().is_empty());

        Self {
            default_level: LogLevel::default(),
            filter,
            format,
            file,
        }
    }

    fn env_filter(&self) -> EnvFilter
    {
        let default_level: Level = self.default_level.into();
        self.filter
            .as_deref()
            .and_then(|directives| EnvFilter::try_new(directives).ok())
            .unwrap_or_else(|| EnvFilter::new(default_level.to_string()))
    }
}

/// Keeps the non-blocking file writer alive.
///
/// Dropping it flushes any buffered records. Hold it until the process exits.
#[derive(Debug, Default)]
pub struct LoggingGuard
{
    _file: Option<WorkerGuard>,
}

/// Initialize logging from the environment
///
/// ## Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_logging() -> Result<LoggingGuard, LoggingError>
{
    init_logging_with(&LoggingConfig::from_env())
}

/// Initialize logging with an explicit configuration
///
/// The console layer writes to stderr, with colours only when stderr is a terminal.
///
/// ## Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_logging_with(config: &LoggingConfig) -> Result<LoggingGuard, LoggingError>
{
    let env_filter = config.env_filter();

    let (file_layer, guard) = match &config.file {
        Some(path) => {
            let (dir, name) = split_log_path(path);
            let file_appender = tracing_appender::rolling::daily(dir, name);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = match config.format {
                LogFormat::Pretty => fmt::layer()
                    .with_writer(non_blocking)
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(false) // No ANSI in files
                    .with_filter(env_filter.clone())
                    .boxed(),
                LogFormat::Json => fmt::layer()
                    .json()
                    .with_writer(non_blocking)
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_filter(env_filter.clone())
                    .boxed(),
            };
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let ansi = io::stderr().is_terminal();

    Registry::default()
        .with(console_layer(config.format, env_filter, io::stderr, ansi))
        .with(file_layer)
        .try_init()
        .map_err(|err| LoggingError::InitializationFailed(err.to_string()))?;

    Ok(LoggingGuard { _file: guard })
}

/// Build the console half of the logging stack over an arbitrary writer.
///
/// Uses the same filter and format as [`init_logging_with`] but never emits
/// ANSI colours and installs nothing globally. Callers pick the scope, e.g.
/// with `tracing::subscriber::with_default`.
pub fn console_subscriber<W>(config: &LoggingConfig, writer: W) -> impl Subscriber + Send + Sync + use<W>
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    Registry::default().with(console_layer(config.format, config.env_filter(), writer, false))
}

fn console_layer<S, W>(format: LogFormat, filter: EnvFilter, writer: W, ansi: bool) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    match format {
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_timer(ChronoUtc::rfc_3339())
            .with_ansi(ansi)
            .with_writer(writer)
            .with_filter(filter)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_timer(ChronoUtc::rfc_3339())
            .with_current_span(true)
            .with_span_list(true)
            .with_writer(writer)
            .with_filter(filter)
            .boxed(),
    }
}

fn split_log_path(path: &Path) -> (PathBuf, PathBuf)
{
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let name = path
        .file_name()
        .map_or_else(|| PathBuf::from("get_aslr.log"), PathBuf::from);
    (dir, name)
}

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError
{
    /// Invalid log format
    #[error("Invalid log format: {0}")]
    InvalidFormat(String),

    /// Invalid log level
    #[error("Invalid log level: {0}")]
    InvalidLevel(String),

    /// Failed to initialize logging
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),
}
