//! Permission decisions and refusals

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::signature::RuleSignature;

/// Approved or denied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Approved,
    Denied,
}

/// How long a decision stays in effect
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionScope {
    /// Applies to the current request only; never stored
    #[default]
    Once,
    /// Kept in memory until the session ends
    Session,
    /// Kept in memory and written to the rules file
    Persistent,
}

impl DecisionScope {
    /// Whether the decision must be flushed to the rules file
    pub fn is_durable(self) -> bool {
        self == DecisionScope::Persistent
    }

    /// Whether the decision is kept in the store at all
    pub fn is_stored(self) -> bool {
        self != DecisionScope::Once
    }
}

/// A decision on a rule signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionDecision {
    pub verdict: Verdict,
    /// Who decided (reviewer name, "rules-file", ...)
    pub actor: String,
    pub decided_at: DateTime<Utc>,
    pub scope: DecisionScope,
}

impl PermissionDecision {
    /// Create a decision stamped with the current time
    pub fn new(verdict: Verdict, actor: impl Into<String>, scope: DecisionScope) -> Self {
        Self {
            verdict,
            actor: actor.into(),
            decided_at: Utc::now(),
            scope,
        }
    }

    pub fn approved(actor: impl Into<String>, scope: DecisionScope) -> Self {
        Self::new(Verdict::Approved, actor, scope)
    }

    pub fn denied(actor: impl Into<String>, scope: DecisionScope) -> Self {
        Self::new(Verdict::Denied, actor, scope)
    }

    pub fn is_approved(&self) -> bool {
        self.verdict == Verdict::Approved
    }
}

/// Why a request was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialKind {
    /// A stored decision denied the signature
    Cached,
    /// A reviewer explicitly denied the request
    Human,
    /// Nobody answered within the approval window
    TimedOut,
}

/// Structured refusal returned to the caller instead of executing the tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Refusal {
    pub request_id: Uuid,
    pub signature: RuleSignature,
    pub kind: DenialKind,
    /// Who denied; `None` for timeouts
    pub actor: Option<String>,
}

impl Refusal {
    pub fn is_timeout(&self) -> bool {
        self.kind == DenialKind::TimedOut
    }
}

impl fmt::Display for Refusal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.kind, &self.actor) {
            (DenialKind::TimedOut, _) => write!(
                f,
                "{} denied: no response within the approval window",
                self.signature
            ),
            (DenialKind::Cached, Some(actor)) => {
                write!(f, "{} denied by stored rule ({})", self.signature, actor)
            }
            (DenialKind::Cached, None) => write!(f, "{} denied by stored rule", self.signature),
            (DenialKind::Human, Some(actor)) => write!(f, "{} denied by {}", self.signature, actor),
            (DenialKind::Human, None) => write!(f, "{} denied by reviewer", self.signature),
        }
    }
}
