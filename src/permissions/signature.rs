//! Rule signatures
//!
//! A rule signature identifies a class of tool actions: the tool name plus a
//! normalized action pattern. Signatures derived from requests are always
//! exact; glob and regex signatures only come from rule files or explicit
//! API calls.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::{GateError, GateResult};

/// How the action part of a signature is compared against a request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    /// Normalized string equality
    #[default]
    Exact,
    /// Shell-style glob (`*`, `?`, `[...]`)
    Glob,
    /// Regular expression anchored at both ends
    Regex,
}

/// Tool name plus normalized action pattern
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuleSignature {
    tool: String,
    action: String,
    kind: MatchKind,
}

/// Collapse whitespace runs and trim the ends of an action string
pub fn normalize_action(action: &str) -> String {
    action.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl RuleSignature {
    /// Create an exact signature. A literal `*` in the action is not a wildcard.
    pub fn exact(tool: impl Into<String>, action: &str) -> Self {
        Self {
            tool: tool.into(),
            action: normalize_action(action),
            kind: MatchKind::Exact,
        }
    }

    /// Create a glob signature, validating the pattern
    pub fn glob(tool: impl Into<String>, pattern: &str) -> GateResult<Self> {
        Self::new(tool, pattern, MatchKind::Glob)
    }

    /// Create a regex signature, validating the pattern
    pub fn regex(tool: impl Into<String>, pattern: &str) -> GateResult<Self> {
        Self::new(tool, pattern, MatchKind::Regex)
    }

    /// Create a signature of any kind
    pub fn new(tool: impl Into<String>, action: &str, kind: MatchKind) -> GateResult<Self> {
        let action = match kind {
            MatchKind::Regex => action.trim().to_string(),
            MatchKind::Exact | MatchKind::Glob => normalize_action(action),
        };
        let signature = Self {
            tool: tool.into(),
            action,
            kind,
        };
        signature.compile()?;
        Ok(signature)
    }

    pub fn tool(&self) -> &str {
        &self.tool
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn kind(&self) -> MatchKind {
        self.kind
    }

    /// Whether this signature can match more than one action
    pub fn is_pattern(&self) -> bool {
        self.kind != MatchKind::Exact
    }

    /// Compile the action pattern. Exact signatures have no matcher.
    pub(crate) fn compile(&self) -> GateResult<Option<ActionMatcher>> {
        let invalid = |message: String| GateError::InvalidPattern {
            pattern: self.action.clone(),
            message,
        };

        match self.kind {
            MatchKind::Exact => Ok(None),
            MatchKind::Glob => glob::Pattern::new(&self.action)
                .map(|p| Some(ActionMatcher::Glob(p)))
                .map_err(|e| invalid(e.to_string())),
            MatchKind::Regex => Regex::new(&format!("^(?:{})$", self.action))
                .map(|r| Some(ActionMatcher::Regex(r)))
                .map_err(|e| invalid(e.to_string())),
        }
    }
}

impl fmt::Display for RuleSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            MatchKind::Exact => write!(f, "{}({})", self.tool, self.action),
            MatchKind::Glob => write!(f, "{}(glob:{})", self.tool, self.action),
            MatchKind::Regex => write!(f, "{}(regex:{})", self.tool, self.action),
        }
    }
}

/// Compiled form of a pattern signature
#[derive(Debug, Clone)]
pub(crate) enum ActionMatcher {
    Glob(glob::Pattern),
    Regex(Regex),
}

impl ActionMatcher {
    pub(crate) fn matches(&self, action: &str) -> bool {
        match self {
            ActionMatcher::Glob(pattern) => pattern.matches(action),
            ActionMatcher::Regex(regex) => regex.is_match(action),
        }
    }
}
