//! Permission workflow
//!
//! Drives a single request through
//! `Requested -> Checking -> {Approved, Denied, AwaitingHuman} -> {Approved, Denied}`.
//! Each request is an independent future; many can wait on reviewers at once.

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use tokio_util::sync::CancellationToken;

use super::channel::{ApprovalChannel, ApprovalResponse};
use super::decision::{DenialKind, PermissionDecision, Refusal, Verdict};
use super::request::PermissionRequest;
use super::rules::JsonRuleFile;
use super::signature::RuleSignature;
use super::store::PermissionStore;
use crate::config::GateConfig;
use crate::core::{GateError, GateResult};
use crate::tools::{ToolExecutor, ToolInvocation, ToolResult};

/// Default time to wait for a reviewer
pub const DEFAULT_APPROVAL_TIMEOUT: Duration = Duration::from_secs(300);

/// States a request moves through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Requested,
    Checking,
    AwaitingHuman,
    Approved,
    Denied,
}

/// Where an approval came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionSource {
    Cached,
    Human,
}

/// Terminal outcome of a request
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Approved {
        source: DecisionSource,
        decision: PermissionDecision,
    },
    Denied(Refusal),
}

/// Result of [`PermissionWorkflow::evaluate`]
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub resolution: Resolution,
    /// States visited, in order
    pub trace: Vec<WorkflowState>,
    /// Set when the answer applies but could not be saved to the rules file
    pub persist_error: Option<String>,
}

impl Evaluation {
    pub fn is_approved(&self) -> bool {
        matches!(self.resolution, Resolution::Approved { .. })
    }

    /// Whether the request passed through `state`
    pub fn reached(&self, state: WorkflowState) -> bool {
        self.trace.contains(&state)
    }

    pub fn final_state(&self) -> WorkflowState {
        match self.resolution {
            Resolution::Approved { .. } => WorkflowState::Approved,
            Resolution::Denied(_) => WorkflowState::Denied,
        }
    }
}

enum ChannelOutcome {
    Answered(ApprovalResponse),
    TimedOut,
}

/// Orchestrates store lookups, approval prompts and tool execution
pub struct PermissionWorkflow {
    store: Arc<PermissionStore>,
    channel: Arc<dyn ApprovalChannel>,
    executor: Arc<dyn ToolExecutor>,
    approval_timeout: Duration,
}

impl PermissionWorkflow {
    /// Create a workflow with the default approval timeout
    pub fn new(
        store: Arc<PermissionStore>,
        channel: Arc<dyn ApprovalChannel>,
        executor: Arc<dyn ToolExecutor>,
    ) -> Self {
        Self {
            store,
            channel,
            executor,
            approval_timeout: DEFAULT_APPROVAL_TIMEOUT,
        }
    }

    /// Build a workflow from configuration, loading the rules file if set
    ///
    /// A malformed rules file is logged, moved aside by the store, and the
    /// workflow starts with an empty store.
    pub fn from_config(
        config: &GateConfig,
        channel: Arc<dyn ApprovalChannel>,
        executor: Arc<dyn ToolExecutor>,
    ) -> Self {
        let store = match &config.rules_path {
            Some(path) => PermissionStore::with_backend(Arc::new(JsonRuleFile::new(path))),
            None => PermissionStore::new(),
        };

        if let Err(e) = store.load() {
            tracing::warn!("Starting with an empty permission store: {}", e);
        }

        Self::new(Arc::new(store), channel, executor)
            .with_approval_timeout(config.approval_timeout)
    }

    pub fn with_approval_timeout(mut self, timeout: Duration) -> Self {
        self.approval_timeout = timeout;
        self
    }

    pub fn store(&self) -> &Arc<PermissionStore> {
        &self.store
    }

    pub fn approval_timeout(&self) -> Duration {
        self.approval_timeout
    }

    /// Decide a request without executing anything
    ///
    /// Returns `Cancelled` if `cancel` fires before a decision is reached; in
    /// that case nothing is recorded. Channel failures are returned as
    /// `Channel` errors, also without recording.
    pub async fn evaluate(
        &self,
        request: &PermissionRequest,
        cancel: &CancellationToken,
    ) -> GateResult<Evaluation> {
        let mut trace = vec![WorkflowState::Requested];
        let signature = request.signature();

        if cancel.is_cancelled() {
            return Err(GateError::Cancelled(request.id()));
        }

        trace.push(WorkflowState::Checking);
        tracing::debug!("Checking stored decisions for {}", signature);

        if let Some(decision) = self.store.lookup(signature) {
            tracing::info!(
                "Request {} resolved from stored decision: {:?}",
                request.id(),
                decision.verdict
            );
            let resolution = match decision.verdict {
                Verdict::Approved => Resolution::Approved {
                    source: DecisionSource::Cached,
                    decision,
                },
                Verdict::Denied => Resolution::Denied(Refusal {
                    request_id: request.id(),
                    signature: signature.clone(),
                    kind: DenialKind::Cached,
                    actor: Some(decision.actor),
                }),
            };
            return Ok(finish(resolution, trace));
        }

        trace.push(WorkflowState::AwaitingHuman);
        tracing::info!(
            "Request {} awaiting approval for {} (requested by {})",
            request.id(),
            signature,
            request.requested_by()
        );

        let response = match self.solicit(request, cancel).await? {
            ChannelOutcome::Answered(response) => response,
            ChannelOutcome::TimedOut => {
                tracing::warn!(
                    "Request {} timed out after {:?} without a response",
                    request.id(),
                    self.approval_timeout
                );
                let refusal = Refusal {
                    request_id: request.id(),
                    signature: signature.clone(),
                    kind: DenialKind::TimedOut,
                    actor: None,
                };
                return Ok(finish(Resolution::Denied(refusal), trace));
            }
        };

        if response.request_id != request.id() {
            return Err(GateError::Channel(anyhow!(
                "response for request {} does not match pending request {}",
                response.request_id,
                request.id()
            )));
        }

        let decision = response.into_decision();
        tracing::info!(
            "Request {} {:?} by {} ({:?})",
            request.id(),
            decision.verdict,
            decision.actor,
            decision.scope
        );

        let mut persist_error = None;
        if decision.scope.is_stored() {
            if let Err(e) = self.record(signature.clone(), decision.clone()).await {
                // The decision still applies to this request
                tracing::warn!("Failed to record decision for {}: {}", signature, e);
                persist_error = Some(e.to_string());
            }
        }

        let resolution = match decision.verdict {
            Verdict::Approved => Resolution::Approved {
                source: DecisionSource::Human,
                decision,
            },
            Verdict::Denied => Resolution::Denied(Refusal {
                request_id: request.id(),
                signature: signature.clone(),
                kind: DenialKind::Human,
                actor: Some(decision.actor),
            }),
        };
        Ok(Evaluation {
            persist_error,
            ..finish(resolution, trace)
        })
    }

    /// Store an answer; durable answers write the rules file on the blocking pool
    async fn record(&self, signature: RuleSignature, decision: PermissionDecision) -> GateResult<()> {
        if !decision.scope.is_durable() {
            return self.store.record(signature, decision).map(|_| ());
        }

        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.record(signature, decision))
            .await
            .map_err(|e| GateError::Persistence(anyhow::Error::new(e)))?
            .map(|_| ())
    }

    /// Gate and run a tool invocation
    ///
    /// Approved invocations are handed to the executor unchanged and its
    /// result or error is returned as-is (errors wrapped in
    /// [`GateError::Execution`]). Denials return [`GateError::Denied`].
    pub async fn run(
        &self,
        invocation: ToolInvocation,
        requested_by: &str,
        cancel: &CancellationToken,
    ) -> GateResult<ToolResult> {
        if !self.executor.requires_permission(&invocation) {
            tracing::debug!("{} does not require permission", invocation.tool_name);
            return self
                .executor
                .execute(invocation)
                .await
                .map_err(GateError::Execution);
        }

        let action = self.executor.action_for(&invocation);
        let request = PermissionRequest::new(invocation.tool_name.clone(), action, requested_by)
            .with_input(invocation.input.clone());

        let evaluation = self.evaluate(&request, cancel).await?;
        match evaluation.resolution {
            Resolution::Approved { .. } => self
                .executor
                .execute(invocation)
                .await
                .map_err(GateError::Execution),
            Resolution::Denied(refusal) => Err(GateError::Denied(refusal)),
        }
    }

    /// Ask the channel, bounded by the timeout and the cancellation token
    async fn solicit(
        &self,
        request: &PermissionRequest,
        cancel: &CancellationToken,
    ) -> GateResult<ChannelOutcome> {
        let prompt = request.prompt();

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!("Request {} cancelled while awaiting approval", request.id());
                Err(GateError::Cancelled(request.id()))
            }
            result = tokio::time::timeout(
                self.approval_timeout,
                self.channel.request_approval(&prompt),
            ) => match result {
                Ok(Ok(response)) => Ok(ChannelOutcome::Answered(response)),
                Ok(Err(e)) => Err(GateError::Channel(e)),
                Err(_) => Ok(ChannelOutcome::TimedOut),
            }
        }
    }
}

fn finish(resolution: Resolution, mut trace: Vec<WorkflowState>) -> Evaluation {
    trace.push(match resolution {
        Resolution::Approved { .. } => WorkflowState::Approved,
        Resolution::Denied(_) => WorkflowState::Denied,
    });
    Evaluation {
        resolution,
        trace,
        persist_error: None,
    }
}
