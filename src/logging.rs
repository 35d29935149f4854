/*!
 * Logging and tracing initialization
 */

use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::LogConfig;
use crate::error::ConfigError;

/// Crates whose events pass the default filter
const LOG_TARGETS: [&str; 3] = ["podwatch", "podwatch_core_resilience", "tower_http"];

/// Effective level after applying the verbose shorthand
pub fn effective_level(config: &LogConfig) -> Level {
    if config.verbose {
        Level::DEBUG
    } else {
        config.level.to_tracing_level()
    }
}

/// Default filter directives; `RUST_LOG` replaces them entirely
fn default_directives(level: Level) -> String {
    LOG_TARGETS
        .iter()
        .map(|target| format!("{}={}", target, level))
        .collect::<Vec<_>>()
        .join(",")
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &LogConfig) -> Result<(), ConfigError> {
    let level = effective_level(config);

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives(level)))
        .map_err(|e| ConfigError::Invalid(format!("Failed to create log filter: {}", e)))?;

    match &config.file {
        Some(path) => init_file_logging(path, env_filter),
        None => init_stdout_logging(env_filter),
    }
}

fn init_stdout_logging(env_filter: EnvFilter) -> Result<(), ConfigError> {
    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::NONE)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| ConfigError::Invalid(format!("Logging already initialized: {}", e)))
}

/// JSON lines, appended so restarts keep earlier history
fn init_file_logging(log_path: &Path, env_filter: EnvFilter) -> Result<(), ConfigError> {
    let file = open_log_file(log_path)?;

    let fmt_layer = fmt::layer()
        .with_writer(Mutex::new(file))
        .with_target(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(false)
        .json();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| ConfigError::Invalid(format!("Logging already initialized: {}", e)))
}

fn open_log_file(log_path: &Path) -> Result<File, ConfigError> {
    let read_error = |source| ConfigError::Read {
        path: log_path.to_path_buf(),
        source,
    };
    if let Some(parent) = log_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(read_error)?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .map_err(read_error)
}
