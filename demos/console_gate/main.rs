//! Console Gate Example
//!
//! Gates a shell command behind an interactive terminal approval.
//! Answers with `a` or `d` are written to the rules file and reused on the
//! next run.
//!
//! Run with: cargo run --example console_gate -- "ls -la"

use anyhow::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use toolgate::{
    cli::ConsoleChannel,
    config::GateConfig,
    permissions::PermissionWorkflow,
    tools::{BashTool, ToolInvocation, ToolRegistry},
    GateError,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("console_gate=info,toolgate=warn")
        .init();

    let command = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if command.is_empty() {
        eprintln!("usage: console_gate <command>");
        return Ok(());
    }

    let mut config = GateConfig::from_env()?;
    if config.rules_path.is_none() {
        config = config.with_rules_path(".toolgate/rules.json");
    }

    let user = config.requested_by.clone();
    let channel = Arc::new(ConsoleChannel::new(user.clone()));

    let mut registry = ToolRegistry::new();
    registry.register(BashTool::new()?);

    let workflow = PermissionWorkflow::from_config(&config, channel.clone(), Arc::new(registry));

    // Ctrl-C abandons a pending approval
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let invocation = ToolInvocation::new("Bash", serde_json::json!({ "command": command }));
    match workflow.run(invocation, &user, &cancel).await {
        Ok(result) => println!("{}", result.output),
        Err(GateError::Denied(refusal)) => channel.print_error(&refusal.to_string()),
        Err(e) => channel.print_error(&e.to_string()),
    }

    Ok(())
}
