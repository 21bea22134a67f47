//! Permission requests

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use super::channel::ApprovalPrompt;
use super::signature::RuleSignature;

/// A request for permission to execute a tool action
///
/// Created when a tool invocation is intercepted. Fields are read-only once
/// the request has been built.
#[derive(Debug, Clone)]
pub struct PermissionRequest {
    id: Uuid,
    tool_name: String,
    action: String,
    input: Value,
    requested_by: String,
    created_at: DateTime<Utc>,
    signature: RuleSignature,
}

impl PermissionRequest {
    /// Create a new permission request
    pub fn new(
        tool_name: impl Into<String>,
        action: impl Into<String>,
        requested_by: impl Into<String>,
    ) -> Self {
        let tool_name = tool_name.into();
        let action = action.into();
        let signature = RuleSignature::exact(tool_name.clone(), &action);

        Self {
            id: Uuid::new_v4(),
            tool_name,
            action,
            input: Value::Null,
            requested_by: requested_by.into(),
            created_at: Utc::now(),
            signature,
        }
    }

    /// Attach the raw tool input
    pub fn with_input(mut self, input: Value) -> Self {
        self.input = input;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    /// The action as requested, before normalization
    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn input(&self) -> &Value {
        &self.input
    }

    pub fn requested_by(&self) -> &str {
        &self.requested_by
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn signature(&self) -> &RuleSignature {
        &self.signature
    }

    /// Build the prompt shown to a reviewer
    pub fn prompt(&self) -> ApprovalPrompt {
        ApprovalPrompt {
            request_id: self.id,
            tool_name: self.tool_name.clone(),
            action: self.action.clone(),
            requested_by: self.requested_by.clone(),
            created_at: self.created_at,
        }
    }
}
