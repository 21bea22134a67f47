use anyhow::Result;
use std::path::PathBuf;
use tracing::Subscriber;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Environment variable that overrides the configured filter
pub const LOG_FILTER_ENV: &str = "RUST_LOG";

/// Logging settings
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default filter directive when `RUST_LOG` is not set
    pub level: String,
    /// Directory for rolling log files
    pub directory: PathBuf,
    /// Log file name prefix
    pub file_name: String,
    /// Emit JSON lines instead of plain text
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: PathBuf::from("logs"),
            file_name: "toolgate.log".to_string(),
            json: false,
        }
    }
}

impl LogConfig {
    /// Filter from `RUST_LOG`, falling back to the configured level
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_env(LOG_FILTER_ENV).unwrap_or_else(|_| EnvFilter::new(&self.level))
    }
}

/// Build a subscriber that writes to the configured rolling log file
///
/// Use with `tracing::subscriber::with_default` or `set_default` to scope
/// logging to a test or task instead of installing it globally.
pub fn build_subscriber(config: &LogConfig) -> Result<impl Subscriber + Send + Sync> {
    std::fs::create_dir_all(&config.directory)?;

    // Daily rotation in the log directory
    let file_appender =
        RollingFileAppender::new(Rotation::DAILY, &config.directory, &config.file_name);

    let file_layer = if config.json {
        fmt::layer()
            .json()
            .with_writer(file_appender)
            .with_target(true)
            .with_thread_ids(true)
            .with_line_number(true)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(file_appender)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_line_number(true)
            .boxed()
    };

    Ok(tracing_subscriber::registry()
        .with(config.env_filter())
        .with(file_layer))
}

/// Initialize the global logging system
/// Logs are written to the log directory only (no console output)
pub fn init_logging(config: &LogConfig) -> Result<()> {
    build_subscriber(config)?.try_init()?;

    tracing::info!("Logging system initialized");
    tracing::info!(
        "Log files location: {}",
        config.directory.join(&config.file_name).display()
    );

    Ok(())
}
