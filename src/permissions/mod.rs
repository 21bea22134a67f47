//! Permission system for tool execution
//!
//! A tool invocation becomes a [`PermissionRequest`]. The
//! [`PermissionWorkflow`] checks the [`PermissionStore`] for a decision on
//! the request's [`RuleSignature`], asks a human through an
//! [`ApprovalChannel`] when none exists, records durable answers, and then
//! either runs the tool or returns a [`Refusal`].

mod channel;
mod decision;
mod pending;
mod request;
mod rules;
mod signature;
mod store;
mod workflow;

pub use channel::{AlwaysApprove, AlwaysDeny, ApprovalChannel, ApprovalPrompt, ApprovalResponse};
pub use decision::{DecisionScope, DenialKind, PermissionDecision, Refusal, Verdict};
pub use pending::PendingApprovals;
pub use request::PermissionRequest;
pub use rules::{JsonRuleFile, MemoryRuleBackend, RuleBackend, RuleEntry, RULES_FILE_VERSION};
pub use signature::{normalize_action, MatchKind, RuleSignature};
pub use store::PermissionStore;
pub use workflow::{
    DecisionSource, Evaluation, PermissionWorkflow, Resolution, WorkflowState,
    DEFAULT_APPROVAL_TIMEOUT,
};
