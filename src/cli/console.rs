use anyhow::{anyhow, Result};
use async_trait::async_trait;
use colored::*;
use std::io::{self, BufRead, Write};
use tokio::sync::{mpsc, Mutex};

use crate::permissions::{ApprovalChannel, ApprovalPrompt, ApprovalResponse, DecisionScope, Verdict};

/// Terminal approval channel with colored prompts
///
/// Answers: `y` approve once, `s` approve for the session, `a` always
/// approve, `n` deny once, `d` always deny.
///
/// Input comes from a single reader that lives as long as the channel.
/// Prompts take turns on it, and lines typed while no prompt is waiting
/// are discarded rather than answering the next one.
pub struct ConsoleChannel {
    reviewer: String,
    prompt_color: Color,
    lines: Mutex<mpsc::UnboundedReceiver<String>>,
}

impl ConsoleChannel {
    /// Create a console channel answering as `reviewer`, reading stdin
    pub fn new(reviewer: impl Into<String>) -> Self {
        Self::with_lines(reviewer, spawn_stdin_reader())
    }

    /// Create a console channel reading answers from `lines`
    pub fn with_lines(reviewer: impl Into<String>, lines: mpsc::UnboundedReceiver<String>) -> Self {
        Self {
            reviewer: reviewer.into(),
            prompt_color: Color::Cyan,
            lines: Mutex::new(lines),
        }
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.prompt_color = color;
        self
    }

    /// Print the approval prompt
    pub fn print_prompt(&self, prompt: &ApprovalPrompt) {
        println!("{}", "-".repeat(60).bright_black());
        println!(
            "{} {} wants to run {}",
            "Permission:".yellow().bold(),
            prompt.requested_by,
            prompt.tool_name.color(self.prompt_color).bold()
        );
        println!("  {}", prompt.action);
        println!(
            "  {}",
            "[y] once  [s] session  [a] always  [n] deny  [d] always deny".bright_black()
        );
    }

    /// Print an error message
    pub fn print_error(&self, error: &str) {
        eprintln!("{} {}", "Error:".red().bold(), error);
    }
}

/// Parse a console answer into a verdict and scope
pub fn parse_answer(answer: &str) -> Option<(Verdict, DecisionScope)> {
    match answer.trim().to_lowercase().as_str() {
        "y" | "yes" => Some((Verdict::Approved, DecisionScope::Once)),
        "s" | "session" => Some((Verdict::Approved, DecisionScope::Session)),
        "a" | "always" => Some((Verdict::Approved, DecisionScope::Persistent)),
        "n" | "no" => Some((Verdict::Denied, DecisionScope::Once)),
        "d" | "never" => Some((Verdict::Denied, DecisionScope::Persistent)),
        _ => None,
    }
}

/// Forward stdin lines from a dedicated thread
///
/// A plain thread rather than the blocking pool, so a read that is still
/// pending never holds up runtime shutdown.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    let spawned = std::thread::Builder::new()
        .name("toolgate-stdin".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
    if let Err(e) = spawned {
        tracing::warn!("Failed to start console reader: {}", e);
    }
    rx
}

#[async_trait]
impl ApprovalChannel for ConsoleChannel {
    async fn request_approval(&self, prompt: &ApprovalPrompt) -> Result<ApprovalResponse> {
        let mut lines = self.lines.lock().await;

        // Typed before this prompt was shown
        while lines.try_recv().is_ok() {}

        self.print_prompt(prompt);
        loop {
            print!("{} ", ">".color(self.prompt_color).bold());
            io::stdout().flush()?;

            let Some(line) = lines.recv().await else {
                return Err(anyhow!("stdin closed before an answer was given"));
            };
            match parse_answer(&line) {
                Some((verdict, scope)) => {
                    return Ok(ApprovalResponse {
                        request_id: prompt.request_id,
                        verdict,
                        scope: Some(scope),
                        responder: self.reviewer.clone(),
                    })
                }
                None => self.print_error("Please answer y, s, a, n or d"),
            }
        }
    }
}
