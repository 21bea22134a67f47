//! Tool registry
//!
//! Holds the tools available for execution and acts as the
//! [`ToolExecutor`] handed to the permission workflow.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use super::tool::{Tool, ToolExecutor, ToolInvocation, ToolResult};

/// Registry of named tools
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any tool with the same name
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        let name = tool.name().to_string();
        tracing::debug!("Registering tool: {}", name);
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Tool names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    fn action_for(&self, invocation: &ToolInvocation) -> String {
        match self.tools.get(&invocation.tool_name) {
            Some(tool) => tool.action(&invocation.input),
            None => invocation.default_action(),
        }
    }

    fn requires_permission(&self, invocation: &ToolInvocation) -> bool {
        self.tools
            .get(&invocation.tool_name)
            .map_or(true, |tool| tool.requires_permission())
    }

    async fn execute(&self, invocation: ToolInvocation) -> Result<ToolResult> {
        let tool = self
            .tools
            .get(&invocation.tool_name)
            .ok_or_else(|| anyhow!("Tool not found: {}", invocation.tool_name))?;

        tracing::info!("Executing tool: {}", invocation.tool_name);
        tool.execute(&invocation.input).await
    }
}
