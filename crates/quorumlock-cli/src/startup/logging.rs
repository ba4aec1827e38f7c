//! Logging setup
//!
//! Console output goes to stderr so stdout stays machine-readable. An
//! optional rolling file captures the same events.
//!
//! Environment overrides:
//!
//! | Variable                   | Meaning                             |
//! |----------------------------|-------------------------------------|
//! | `QUORUMLOCK_LOG_LEVEL`     | Console level (default `warn`)      |
//! | `QUORUMLOCK_LOG_CONSOLE`   | `false`/`0` disables console output |
//! | `QUORUMLOCK_LOG_FILE`      | `true`/`1` enables the log file     |
//! | `QUORUMLOCK_LOG_FILE_LEVEL`| File level (default console level)  |
//! | `QUORUMLOCK_LOG_DIR`       | Log directory                       |
//!
//! `RUST_LOG`, when set, replaces both levels with a full filter directive.

use std::path::PathBuf;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

const LOG_FILE_NAME: &str = "quorumlock.log";

/// Log rotation policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRotation {
    Daily,
    Hourly,
    Never,
}

impl LogRotation {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "daily" => Some(LogRotation::Daily),
            "hourly" => Some(LogRotation::Hourly),
            "never" => Some(LogRotation::Never),
            _ => None,
        }
    }
}

impl From<LogRotation> for Rotation {
    fn from(rotation: LogRotation) -> Self {
        match rotation {
            LogRotation::Daily => Rotation::DAILY,
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Never => Rotation::NEVER,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub log_dir: PathBuf,
    pub console_output: bool,
    pub console_level: Level,
    pub file_logging: bool,
    pub file_level: Level,
    pub rotation: LogRotation,
}

fn default_log_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(format!("{}/quorumlock/logs", home))
}

fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name)
        .ok()
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            console_output: true,
            console_level: Level::WARN,
            file_logging: false,
            file_level: Level::WARN,
            rotation: LogRotation::Daily,
        }
    }
}

impl LoggingConfig {
    /// Apply `QUORUMLOCK_LOG_*` variables on top of `self`.
    pub fn with_env(mut self) -> Self {
        if let Ok(dir) = std::env::var("QUORUMLOCK_LOG_DIR") {
            self.log_dir = PathBuf::from(dir);
        }
        if let Some(console) = env_flag("QUORUMLOCK_LOG_CONSOLE") {
            self.console_output = console;
        }
        if let Some(file) = env_flag("QUORUMLOCK_LOG_FILE") {
            self.file_logging = file;
        }
        if let Some(level) = std::env::var("QUORUMLOCK_LOG_LEVEL")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.console_level = level;
            self.file_level = level;
        }
        if let Some(level) = std::env::var("QUORUMLOCK_LOG_FILE_LEVEL")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.file_level = level;
        }
        self
    }

    /// Create from application configuration.
    pub fn from_config(
        log_dir: Option<String>,
        console_output: bool,
        file_logging: bool,
        level: &str,
        rotation: Option<&str>,
    ) -> Self {
        let level = level.parse().unwrap_or(Level::WARN);
        Self {
            log_dir: log_dir.map(PathBuf::from).unwrap_or_else(default_log_dir),
            console_output,
            console_level: level,
            file_logging,
            file_level: level,
            rotation: rotation
                .and_then(LogRotation::parse)
                .unwrap_or(LogRotation::Daily),
        }
    }
}

/// Keeps the file writer alive; dropping it flushes buffered output.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Install the global subscriber.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<LoggingGuard> {
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    let mut file_guard = None;

    if config.console_output {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.console_level.to_string()));
        let console_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_filter(filter);
        layers.push(Box::new(console_layer));
    }

    if config.file_logging {
        std::fs::create_dir_all(&config.log_dir)?;
        let appender =
            RollingFileAppender::new(config.rotation.into(), &config.log_dir, LOG_FILE_NAME);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        file_guard = Some(guard);

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.file_level.to_string()));
        let file_layer = fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_thread_names(true)
            .with_ansi(false)
            .with_filter(filter);
        layers.push(Box::new(file_layer));
    }

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))?;

    if config.file_logging {
        tracing::debug!(log_dir = %config.log_dir.display(), "File logging initialized");
    }

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}
