//! Permission store
//!
//! Maps rule signatures to decisions. Reads run concurrently; writes are
//! serialized and stamped with a sequence number so the most recent `record`
//! for a signature always wins. Persistent decisions are flushed to the
//! configured [`RuleBackend`] after each durable write.
//!
//! Durable and session decisions live in separate layers. A session answer
//! shadows a durable rule for the same signature without replacing it, so
//! the rule is still flushed and comes back once the session ends.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::decision::{DecisionScope, PermissionDecision};
use super::rules::{RuleBackend, RuleEntry};
use super::signature::{ActionMatcher, MatchKind, RuleSignature};
use crate::core::{GateError, GateResult};

#[derive(Debug, Clone)]
struct StoredDecision {
    decision: PermissionDecision,
    seq: u64,
    matcher: Option<ActionMatcher>,
}

#[derive(Debug, Default)]
struct Layers {
    durable: HashMap<RuleSignature, StoredDecision>,
    session: HashMap<RuleSignature, StoredDecision>,
}

impl Layers {
    fn iter(&self) -> impl Iterator<Item = (&RuleSignature, &StoredDecision)> {
        self.session.iter().chain(self.durable.iter())
    }

    /// The newer of the two layers' entries for a signature
    fn active(&self, signature: &RuleSignature) -> Option<&StoredDecision> {
        match (self.session.get(signature), self.durable.get(signature)) {
            (Some(session), Some(durable)) => Some(if session.seq > durable.seq {
                session
            } else {
                durable
            }),
            (session, durable) => session.or(durable),
        }
    }

    /// Entries that currently apply, oldest first
    fn active_entries(&self) -> Vec<(&RuleSignature, &StoredDecision)> {
        let mut entries: Vec<_> = self
            .iter()
            .filter(|(signature, stored)| {
                self.active(signature).map(|active| active.seq) == Some(stored.seq)
            })
            .collect();
        entries.sort_by_key(|(_, stored)| stored.seq);
        entries
    }
}

/// Stores approved/denied decisions keyed by rule signature
pub struct PermissionStore {
    layers: RwLock<Layers>,
    sequence: AtomicU64,
    backend: Option<Arc<dyn RuleBackend>>,
    /// Serializes flushes so a later snapshot is never overwritten by an earlier one
    flush_lock: Mutex<()>,
    /// Set when an unreadable rules source could not be moved aside
    read_only: AtomicBool,
}

impl PermissionStore {
    /// Create an in-memory store with no backing file
    pub fn new() -> Self {
        Self {
            layers: RwLock::new(Layers::default()),
            sequence: AtomicU64::new(0),
            backend: None,
            flush_lock: Mutex::new(()),
            read_only: AtomicBool::new(false),
        }
    }

    /// Create a store that persists durable decisions to `backend`
    pub fn with_backend(backend: Arc<dyn RuleBackend>) -> Self {
        Self {
            backend: Some(backend),
            ..Self::new()
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Layers> {
        self.layers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Layers> {
        self.layers.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_seq(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst)
    }

    /// Load persistent rules from the backend, replacing current contents
    ///
    /// On a malformed source the store is left empty and the error is
    /// returned for the caller to log; it is never fatal. The unreadable
    /// source is moved aside first so the next flush cannot destroy it. If
    /// that is not possible, flushing is refused until a later load succeeds.
    pub fn load(&self) -> GateResult<usize> {
        let Some(backend) = &self.backend else {
            return Ok(0);
        };

        let loaded = backend.load().and_then(|entries| {
            entries
                .into_iter()
                .map(|entry| {
                    let (signature, decision) = entry.into_parts()?;
                    let matcher = signature.compile()?;
                    Ok((signature, decision, matcher))
                })
                .collect::<GateResult<Vec<_>>>()
        });

        let mut layers = self.write();
        layers.durable.clear();
        layers.session.clear();

        let parsed = match loaded {
            Ok(parsed) => parsed,
            Err(e) => {
                let e = match e {
                    GateError::InvalidPattern { pattern, message } => GateError::ConfigLoad {
                        path: backend.describe().into(),
                        message: format!("invalid pattern '{}': {}", pattern, message),
                    },
                    GateError::InvalidRule(message) => GateError::ConfigLoad {
                        path: backend.describe().into(),
                        message,
                    },
                    other => other,
                };
                tracing::warn!(
                    "Failed to load permission rules from {}: {}",
                    backend.describe(),
                    e
                );
                self.set_aside(backend.as_ref());
                return Err(e);
            }
        };

        self.read_only.store(false, Ordering::SeqCst);
        let count = parsed.len();
        for (signature, decision, matcher) in parsed {
            let seq = self.next_seq();
            layers.durable.insert(
                signature,
                StoredDecision {
                    decision,
                    seq,
                    matcher,
                },
            );
        }

        tracing::info!("Loaded {} permission rules from {}", count, backend.describe());
        Ok(count)
    }

    fn set_aside(&self, backend: &dyn RuleBackend) {
        match backend.quarantine() {
            Ok(Some(moved)) => {
                tracing::warn!(
                    "Moved unreadable rules from {} to {}",
                    backend.describe(),
                    moved
                );
                self.read_only.store(false, Ordering::SeqCst);
            }
            Ok(None) => self.read_only.store(false, Ordering::SeqCst),
            Err(e) => {
                tracing::warn!(
                    "Could not move unreadable rules at {} aside ({}), persistent decisions will not be saved",
                    backend.describe(),
                    e
                );
                self.read_only.store(true, Ordering::SeqCst);
            }
        }
    }

    /// Look up the decision that applies to a signature
    ///
    /// An entry with the identical signature wins. For exact signatures the
    /// pattern rules of the same tool are consulted next: the longest matching
    /// pattern applies, ties going to the most recently recorded rule.
    pub fn lookup(&self, signature: &RuleSignature) -> Option<PermissionDecision> {
        let layers = self.read();

        if let Some(stored) = layers.active(signature) {
            return Some(stored.decision.clone());
        }

        if signature.kind() != MatchKind::Exact {
            return None;
        }

        layers
            .iter()
            .filter(|(key, _)| key.tool() == signature.tool())
            .filter_map(|(key, stored)| {
                let matcher = stored.matcher.as_ref()?;
                matcher
                    .matches(signature.action())
                    .then_some((key.action().len(), stored.seq, &stored.decision))
            })
            .max_by_key(|(len, seq, _)| (*len, *seq))
            .map(|(_, _, decision)| decision.clone())
    }

    /// Record a decision for a signature, superseding any earlier one
    ///
    /// Returns the sequence number assigned to the decision, or `None` for
    /// `Once` decisions, which are not stored. For persistent decisions the
    /// backend is flushed; if that fails a `Persistence` error is returned
    /// but the in-memory decision stays applied.
    pub fn record(
        &self,
        signature: RuleSignature,
        decision: PermissionDecision,
    ) -> GateResult<Option<u64>> {
        if !decision.scope.is_stored() {
            tracing::debug!("Not storing one-time decision for {}", signature);
            return Ok(None);
        }

        let matcher = signature.compile()?;
        let durable = decision.scope.is_durable();

        let seq = {
            let mut layers = self.write();
            let seq = self.next_seq();
            tracing::info!(
                "Recording {:?} ({:?}) for {} by {}",
                decision.verdict,
                decision.scope,
                signature,
                decision.actor
            );
            let stored = StoredDecision {
                decision,
                seq,
                matcher,
            };
            if durable {
                layers.session.remove(&signature);
                layers.durable.insert(signature, stored);
            } else {
                layers.session.insert(signature, stored);
            }
            seq
        };

        if durable {
            self.flush()?;
        }
        Ok(Some(seq))
    }

    /// Remove every decision for a signature, returning the one that applied
    pub fn revoke(&self, signature: &RuleSignature) -> GateResult<Option<PermissionDecision>> {
        let (removed, durable_removed) = {
            let mut layers = self.write();
            let session = layers.session.remove(signature);
            let durable = layers.durable.remove(signature);
            let durable_removed = durable.is_some();
            let removed = match (session, durable) {
                (Some(s), Some(d)) => Some(if s.seq > d.seq { s } else { d }),
                (s, d) => s.or(d),
            };
            (removed.map(|stored| stored.decision), durable_removed)
        };

        if removed.is_some() {
            tracing::info!("Revoked decision for {}", signature);
        }
        if durable_removed {
            self.flush()?;
        }
        Ok(removed)
    }

    /// Drop all session-scoped decisions
    ///
    /// Persistent rules shadowed by a session answer apply again afterwards.
    pub fn end_session(&self) -> usize {
        let mut layers = self.write();
        let dropped = layers.session.len();
        layers.session.clear();
        tracing::debug!("Session ended, dropped {} session decisions", dropped);
        dropped
    }

    /// Decisions that currently apply, in the order they were recorded
    pub fn entries(&self) -> Vec<(RuleSignature, PermissionDecision)> {
        self.read()
            .active_entries()
            .into_iter()
            .map(|(signature, stored)| (signature.clone(), stored.decision.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        let layers = self.read();
        layers.durable.len()
            + layers
                .session
                .keys()
                .filter(|signature| !layers.durable.contains_key(*signature))
                .count()
    }

    pub fn is_empty(&self) -> bool {
        let layers = self.read();
        layers.durable.is_empty() && layers.session.is_empty()
    }

    /// Write every persistent decision to the backend
    fn flush(&self) -> GateResult<()> {
        let Some(backend) = &self.backend else {
            return Ok(());
        };

        let _guard = self.flush_lock.lock().unwrap_or_else(PoisonError::into_inner);

        if self.read_only.load(Ordering::SeqCst) {
            tracing::warn!(
                "Not writing permission rules to {}: the existing file is unreadable",
                backend.describe()
            );
            return Err(GateError::Persistence(anyhow::anyhow!(
                "{} could not be loaded or moved aside; refusing to overwrite it",
                backend.describe()
            )));
        }

        let rules: Vec<RuleEntry> = {
            let layers = self.read();
            let mut durable: Vec<_> = layers.durable.iter().collect();
            durable.sort_by_key(|(_, stored)| stored.seq);
            durable
                .into_iter()
                .map(|(signature, stored)| RuleEntry::from_decision(signature, &stored.decision))
                .collect()
        };

        backend.save(&rules).map_err(|e| {
            tracing::warn!(
                "Failed to persist {} permission rules to {}: {}",
                rules.len(),
                backend.describe(),
                e
            );
            GateError::Persistence(anyhow::Error::new(e))
        })
    }
}

impl Default for PermissionStore {
    fn default() -> Self {
        Self::new()
    }
}
