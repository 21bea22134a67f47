//! Error types for the permission workflow

use std::path::PathBuf;

use uuid::Uuid;

use crate::permissions::Refusal;

/// Result type used throughout the crate
pub type GateResult<T> = Result<T, GateError>;

/// Errors produced by the permission store, approval channels and workflow
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// The rules file exists but could not be parsed
    #[error("failed to load permission rules from {path}: {message}")]
    ConfigLoad { path: PathBuf, message: String },

    /// A durable decision could not be flushed to the rules file
    #[error("failed to persist permission rules: {0}")]
    Persistence(#[source] anyhow::Error),

    /// The request was abandoned before a decision was reached
    #[error("approval request {0} was cancelled")]
    Cancelled(Uuid),

    /// The request was refused (cached denial, human denial or timeout)
    #[error("{0}")]
    Denied(Refusal),

    /// The approval channel failed to deliver a decision
    #[error("approval channel error: {0}")]
    Channel(#[source] anyhow::Error),

    /// No pending approval exists for this id (answered, timed out or cancelled)
    #[error("no pending approval request with id {0}")]
    RequestNotFound(Uuid),

    /// A rule pattern could not be compiled
    #[error("invalid rule pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// A stored rule is not valid in a rules file
    #[error("invalid rule: {0}")]
    InvalidRule(String),

    /// The tool executor failed; the error is passed through unchanged
    #[error(transparent)]
    Execution(anyhow::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GateError {
    /// Whether this error is a refusal that timed out waiting for a human
    pub fn is_timeout_denial(&self) -> bool {
        matches!(self, GateError::Denied(refusal) if refusal.is_timeout())
    }
}
