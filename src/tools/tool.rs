//! Tool trait, invocations and the executor boundary

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Output of a tool execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Text output of the tool
    pub output: String,
    /// Whether the tool execution resulted in an error
    pub is_error: bool,
}

impl ToolResult {
    /// Create a successful tool result
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            is_error: false,
        }
    }

    /// Create an error tool result
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            output: message.into(),
            is_error: true,
        }
    }
}

/// An intercepted attempt to run a tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub tool_name: String,
    pub input: Value,
}

impl ToolInvocation {
    pub fn new(tool_name: impl Into<String>, input: Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            input,
        }
    }

    /// Default action string: the `command` field if present, otherwise the
    /// compact JSON input
    pub fn default_action(&self) -> String {
        match self.input.get("command").and_then(|v| v.as_str()) {
            Some(command) => command.to_string(),
            None => self.input.to_string(),
        }
    }
}

/// Trait for tools that can be gated by the permission workflow
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the name of this tool
    fn name(&self) -> &str;

    /// Get a description of this tool
    fn description(&self) -> &str;

    /// The action string used to build the rule signature for this input
    fn action(&self, input: &Value) -> String;

    /// Execute the tool with the given input
    async fn execute(&self, input: &Value) -> Result<ToolResult>;

    /// Check if this tool requires permission before execution
    ///
    /// Default is true - tools should generally require permission.
    fn requires_permission(&self) -> bool {
        true
    }
}

/// Runs approved invocations
///
/// The permission layer passes the invocation through unchanged and returns
/// the executor's result or error to the caller as-is.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Action string for signature derivation
    fn action_for(&self, invocation: &ToolInvocation) -> String {
        invocation.default_action()
    }

    /// Whether the invocation must pass through the approval workflow
    fn requires_permission(&self, _invocation: &ToolInvocation) -> bool {
        true
    }

    async fn execute(&self, invocation: ToolInvocation) -> Result<ToolResult>;
}
