//! Pending approvals for message-based front-ends
//!
//! [`PendingApprovals`] turns each approval call into a prompt on a queue
//! (for a chat bot, web UI, ...) and waits for the front-end to call
//! [`PendingApprovals::respond`]. A prompt is removed as soon as the waiting
//! workflow stops listening, so answers that arrive after a timeout or
//! cancellation are rejected with `RequestNotFound`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::anyhow;
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use super::channel::{ApprovalChannel, ApprovalPrompt, ApprovalResponse};
use crate::core::{GateError, GateResult};

type PendingMap = Arc<Mutex<HashMap<Uuid, oneshot::Sender<ApprovalResponse>>>>;

/// Approval channel backed by a prompt queue and explicit responses
#[derive(Clone)]
pub struct PendingApprovals {
    pending: PendingMap,
    prompts: mpsc::UnboundedSender<ApprovalPrompt>,
}

impl PendingApprovals {
    /// Create the channel and the receiver the front-end reads prompts from
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ApprovalPrompt>) {
        let (prompts, rx) = mpsc::unbounded_channel();
        let channel = Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            prompts,
        };
        (channel, rx)
    }

    /// Deliver a reviewer's answer to the waiting request
    pub fn respond(&self, response: ApprovalResponse) -> GateResult<()> {
        let id = response.request_id;
        let sender = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .ok_or(GateError::RequestNotFound(id))?;

        sender.send(response).map_err(|_| {
            tracing::debug!("Approval {} answered after the requester stopped waiting", id);
            GateError::RequestNotFound(id)
        })
    }

    /// Whether a prompt is still waiting for an answer
    pub fn is_pending(&self, request_id: Uuid) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&request_id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Removes the pending entry when the waiting future completes or is dropped
struct PendingGuard {
    id: Uuid,
    pending: PendingMap,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let removed = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
        if removed.is_some() {
            tracing::debug!("Approval prompt {} invalidated", self.id);
        }
    }
}

#[async_trait]
impl ApprovalChannel for PendingApprovals {
    async fn request_approval(&self, prompt: &ApprovalPrompt) -> anyhow::Result<ApprovalResponse> {
        let id = prompt.request_id;
        let (tx, rx) = oneshot::channel();

        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, tx);
        let _guard = PendingGuard {
            id,
            pending: self.pending.clone(),
        };

        self.prompts
            .send(prompt.clone())
            .map_err(|_| anyhow!("approval front-end is no longer listening"))?;
        tracing::debug!("Approval prompt {} sent for {}", id, prompt.tool_name);

        rx.await
            .map_err(|_| anyhow!("approval request {} dropped without a response", id))
    }
}
