//! Permission-approval workflow for tool execution
//!
//! Tool invocations are checked against stored decisions; unknown actions
//! are sent to a human reviewer through an approval channel, durable answers
//! are written to a local rules file, and approved invocations are handed to
//! a tool executor.

pub mod cli;
pub mod config;
pub mod core;
pub mod logging;
pub mod permissions;
pub mod tools;

pub use crate::config::GateConfig;
pub use crate::core::{GateError, GateResult};
pub use crate::permissions::{
    ApprovalChannel, ApprovalPrompt, ApprovalResponse, DecisionScope, PermissionDecision,
    PermissionRequest, PermissionStore, PermissionWorkflow, Refusal, RuleSignature, Verdict,
};
pub use crate::tools::{ToolExecutor, ToolInvocation, ToolResult};
