//! Approval channels
//!
//! An approval channel presents a prompt to a human and returns their
//! response. Timeouts and cancellation are applied by the workflow around
//! the channel call; a channel only needs to resolve once an answer arrives.
//! Dropping the returned future must invalidate the prompt.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::decision::{DecisionScope, PermissionDecision, Verdict};

/// Prompt shown to a reviewer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalPrompt {
    pub request_id: Uuid,
    pub tool_name: String,
    pub action: String,
    pub requested_by: String,
    pub created_at: DateTime<Utc>,
}

/// A reviewer's answer to an [`ApprovalPrompt`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalResponse {
    pub request_id: Uuid,
    pub verdict: Verdict,
    /// Missing scope means the answer applies to this request only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<DecisionScope>,
    pub responder: String,
}

impl ApprovalResponse {
    pub fn approve(request_id: Uuid, responder: impl Into<String>) -> Self {
        Self {
            request_id,
            verdict: Verdict::Approved,
            scope: None,
            responder: responder.into(),
        }
    }

    pub fn deny(request_id: Uuid, responder: impl Into<String>) -> Self {
        Self {
            request_id,
            verdict: Verdict::Denied,
            scope: None,
            responder: responder.into(),
        }
    }

    pub fn with_scope(mut self, scope: DecisionScope) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Shorthand for `with_scope(DecisionScope::Persistent)`
    pub fn persist(self) -> Self {
        self.with_scope(DecisionScope::Persistent)
    }

    pub fn scope(&self) -> DecisionScope {
        self.scope.unwrap_or_default()
    }

    /// Convert into a decision stamped now
    pub fn into_decision(self) -> PermissionDecision {
        let scope = self.scope();
        PermissionDecision::new(self.verdict, self.responder, scope)
    }
}

/// Asks a human to approve or deny a tool action
#[async_trait]
pub trait ApprovalChannel: Send + Sync {
    /// Present the prompt and wait for the reviewer's answer
    async fn request_approval(&self, prompt: &ApprovalPrompt) -> anyhow::Result<ApprovalResponse>;
}

/// A channel that approves every prompt once
pub struct AlwaysApprove;

#[async_trait]
impl ApprovalChannel for AlwaysApprove {
    async fn request_approval(&self, prompt: &ApprovalPrompt) -> anyhow::Result<ApprovalResponse> {
        Ok(ApprovalResponse::approve(prompt.request_id, "auto"))
    }
}

/// A channel that denies every prompt once
pub struct AlwaysDeny;

#[async_trait]
impl ApprovalChannel for AlwaysDeny {
    async fn request_approval(&self, prompt: &ApprovalPrompt) -> anyhow::Result<ApprovalResponse> {
        Ok(ApprovalResponse::deny(prompt.request_id, "auto"))
    }
}
