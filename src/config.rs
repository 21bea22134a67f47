//! Configuration
//!
//! Settings come from code via the builder methods or from environment
//! variables via [`GateConfig::from_env`].

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::logging::LogConfig;
use crate::permissions::DEFAULT_APPROVAL_TIMEOUT;

/// Environment variable for the approval timeout in seconds
pub const ENV_APPROVAL_TIMEOUT: &str = "TOOLGATE_APPROVAL_TIMEOUT_SECS";
/// Environment variable for the rules file path
pub const ENV_RULES_PATH: &str = "TOOLGATE_RULES_PATH";
/// Environment variable for the log level
pub const ENV_LOG_LEVEL: &str = "TOOLGATE_LOG_LEVEL";
/// Environment variable for the log directory
pub const ENV_LOG_DIR: &str = "TOOLGATE_LOG_DIR";
/// Environment variable naming who requests tool runs
pub const ENV_REQUESTER: &str = "TOOLGATE_REQUESTER";

/// Requester used when neither `TOOLGATE_REQUESTER` nor `USER` is set
pub const DEFAULT_REQUESTER: &str = "local";

/// Top-level configuration
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// How long to wait for a reviewer before denying
    pub approval_timeout: Duration,
    /// Rules file for persistent decisions; `None` keeps everything in memory
    pub rules_path: Option<PathBuf>,
    /// Default requesting user for invocations
    pub requested_by: String,
    pub logging: LogConfig,
}

impl GateConfig {
    pub fn new() -> Self {
        Self {
            approval_timeout: DEFAULT_APPROVAL_TIMEOUT,
            rules_path: None,
            requested_by: DEFAULT_REQUESTER.to_string(),
            logging: LogConfig::default(),
        }
    }

    /// Read configuration from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new();

        if let Some(secs) = lookup(ENV_APPROVAL_TIMEOUT) {
            let secs: u64 = secs
                .trim()
                .parse()
                .with_context(|| format!("{} must be a number of seconds", ENV_APPROVAL_TIMEOUT))?;
            config.approval_timeout = Duration::from_secs(secs);
        }
        if let Some(path) = lookup(ENV_RULES_PATH).filter(|p| !p.trim().is_empty()) {
            config.rules_path = Some(PathBuf::from(path));
        }
        if let Some(user) = lookup(ENV_REQUESTER)
            .or_else(|| lookup("USER"))
            .filter(|u| !u.trim().is_empty())
        {
            config.requested_by = user.trim().to_string();
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            config.logging.level = level;
        }
        if let Some(dir) = lookup(ENV_LOG_DIR) {
            config.logging.directory = PathBuf::from(dir);
        }

        Ok(config)
    }

    pub fn with_approval_timeout(mut self, timeout: Duration) -> Self {
        self.approval_timeout = timeout;
        self
    }

    pub fn with_rules_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.rules_path = Some(path.into());
        self
    }

    pub fn with_requested_by(mut self, user: impl Into<String>) -> Self {
        self.requested_by = user.into();
        self
    }

    pub fn with_logging(mut self, logging: LogConfig) -> Self {
        self.logging = logging;
        self
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self::new()
    }
}
