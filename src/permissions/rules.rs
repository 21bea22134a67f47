//! Rule backends
//!
//! Persistent decisions are written to a rule backend. The default backend
//! is a JSON file:
//!
//! ```json
//! {
//!   "version": 1,
//!   "rules": [
//!     { "tool": "Bash", "action": "git *", "match": "glob", "decision": "approved" }
//!   ]
//! }
//! ```

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use super::decision::{DecisionScope, PermissionDecision, Verdict};
use super::signature::{MatchKind, RuleSignature};
use crate::core::{GateError, GateResult};

/// Current rules file format version
pub const RULES_FILE_VERSION: u32 = 1;

/// Actor recorded for rules without a `decided_by` field
const RULES_FILE_ACTOR: &str = "rules-file";

/// One rule as stored in the rules file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleEntry {
    pub tool: String,
    pub action: String,
    #[serde(rename = "match", default)]
    pub kind: MatchKind,
    pub decision: Verdict,
    #[serde(default = "persistent_scope")]
    pub scope: DecisionScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
}

fn persistent_scope() -> DecisionScope {
    DecisionScope::Persistent
}

impl RuleEntry {
    /// Build an entry from a stored decision
    pub fn from_decision(signature: &RuleSignature, decision: &PermissionDecision) -> Self {
        Self {
            tool: signature.tool().to_string(),
            action: signature.action().to_string(),
            kind: signature.kind(),
            decision: decision.verdict,
            scope: decision.scope,
            decided_by: Some(decision.actor.clone()),
            decided_at: Some(decision.decided_at),
        }
    }

    /// Convert back into a signature and a persistent decision
    ///
    /// Only persistent rules belong in a rules file; any other scope is
    /// rejected rather than silently promoted.
    pub fn into_parts(self) -> GateResult<(RuleSignature, PermissionDecision)> {
        if self.scope != DecisionScope::Persistent {
            return Err(GateError::InvalidRule(format!(
                "{}({}) has scope {:?}, only persistent rules may be stored",
                self.tool, self.action, self.scope
            )));
        }
        let signature = RuleSignature::new(self.tool, &self.action, self.kind)?;
        let decision = PermissionDecision {
            verdict: self.decision,
            actor: self
                .decided_by
                .unwrap_or_else(|| RULES_FILE_ACTOR.to_string()),
            decided_at: self.decided_at.unwrap_or_else(Utc::now),
            scope: DecisionScope::Persistent,
        };
        Ok((signature, decision))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct RulesFile {
    version: u32,
    #[serde(default)]
    rules: Vec<RuleEntry>,
}

/// Storage for persistent rules
pub trait RuleBackend: Send + Sync {
    /// Read all rules. A missing source is an empty rule list.
    fn load(&self) -> GateResult<Vec<RuleEntry>>;

    /// Replace the stored rules
    fn save(&self, rules: &[RuleEntry]) -> GateResult<()>;

    /// Human-readable location for log messages
    fn describe(&self) -> String;

    /// Move an unreadable source out of the way so the next save cannot
    /// overwrite it. Returns where it went, or `None` if there was nothing
    /// to keep.
    fn quarantine(&self) -> GateResult<Option<String>> {
        Ok(None)
    }
}

/// JSON rules file on local disk
#[derive(Debug, Clone)]
pub struct JsonRuleFile {
    path: PathBuf,
}

impl JsonRuleFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn malformed(&self, message: impl Into<String>) -> GateError {
        GateError::ConfigLoad {
            path: self.path.clone(),
            message: message.into(),
        }
    }
}

impl RuleBackend for JsonRuleFile {
    fn load(&self) -> GateResult<Vec<RuleEntry>> {
        if !self.path.exists() {
            tracing::debug!("Rules file {} not found, starting empty", self.path.display());
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.path)?;
        let file: RulesFile =
            serde_json::from_str(&content).map_err(|e| self.malformed(e.to_string()))?;

        if file.version != RULES_FILE_VERSION {
            return Err(self.malformed(format!(
                "unsupported rules file version {} (expected {})",
                file.version, RULES_FILE_VERSION
            )));
        }

        Ok(file.rules)
    }

    fn save(&self, rules: &[RuleEntry]) -> GateResult<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let file = RulesFile {
            version: RULES_FILE_VERSION,
            rules: rules.to_vec(),
        };

        // Write next to the target and rename so readers never see a partial file
        let mut tmp = NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut tmp, &file)?;
        writeln!(tmp)?;
        tmp.persist(&self.path).map_err(|e| GateError::Io(e.error))?;

        tracing::debug!("Wrote {} rules to {}", rules.len(), self.path.display());
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn quarantine(&self) -> GateResult<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let mut name = self.path.as_os_str().to_os_string();
        name.push(format!(".malformed-{}", Utc::now().format("%Y%m%d%H%M%S%.3f")));
        let target = PathBuf::from(name);

        fs::rename(&self.path, &target)?;
        Ok(Some(target.display().to_string()))
    }
}

/// In-memory backend, mainly for tests
#[derive(Debug, Default)]
pub struct MemoryRuleBackend {
    rules: Mutex<Vec<RuleEntry>>,
    saves: AtomicUsize,
    fail_saves: AtomicBool,
}

impl MemoryRuleBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with pre-existing rules
    pub fn with_rules(rules: Vec<RuleEntry>) -> Self {
        Self {
            rules: Mutex::new(rules),
            ..Self::default()
        }
    }

    /// Number of successful `save` calls
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Rules from the most recent save
    pub fn rules(&self) -> Vec<RuleEntry> {
        self.rules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Make subsequent saves fail with an IO error
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

impl RuleBackend for MemoryRuleBackend {
    fn load(&self) -> GateResult<Vec<RuleEntry>> {
        Ok(self.rules())
    }

    fn save(&self, rules: &[RuleEntry]) -> GateResult<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(GateError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "memory backend configured to fail",
            )));
        }
        *self.rules.lock().unwrap_or_else(PoisonError::into_inner) = rules.to_vec();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
