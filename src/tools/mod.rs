//! Tool execution behind the permission workflow
//!
//! This module provides the Tool trait, the ToolExecutor boundary and a
//! ToolRegistry that implements it.

pub mod bash;
mod registry;
mod tool;

pub use bash::BashTool;
pub use registry::ToolRegistry;
pub use tool::{Tool, ToolExecutor, ToolInvocation, ToolResult};
