//! Command handlers
//!
//! Implementations for the CLI commands plus the output rendering shared
//! with the REPL.

use anyhow::Result;
use serde_json::json;

use sdk::{CodegenErrorExt, EngineError, ToolResult};

use crate::agent::{AgentState, LoopStatus};
use crate::config::Config;
use crate::history::HistoryEntry;
use crate::session::Session;

/// Output format for commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Run a single task. Returns whether it completed.
pub async fn handle_run(task: &str, session: &mut Session, format: OutputFormat) -> Result<bool> {
    if format == OutputFormat::Text {
        println!("Executing task: {}", task);
        println!();
    }

    match session.run_task(task).await {
        Ok(state) => {
            println!("{}", render_state(&state, format)?);
            Ok(state.is_completed())
        }
        Err(e) => {
            println!("{}", render_error(&e, format)?);
            Ok(false)
        }
    }
}

/// Show the trailing `limit` history entries
pub async fn handle_history(limit: usize, session: &Session, format: OutputFormat) -> Result<()> {
    let entries = session.history().load(limit).await;
    println!("{}", render_history(&entries, limit, format)?);
    Ok(())
}

/// Save the API key, prompting for it when not given on the command line.
pub async fn handle_set_key(key: Option<String>, config: &Config, format: OutputFormat) -> Result<()> {
    let key = match key {
        Some(key) => key,
        None => prompt_line("Enter your Gemini API key: ").await?,
    };
    let key = key.trim();
    if key.is_empty() {
        anyhow::bail!("No key provided");
    }

    let path = config.save_api_key(key)?;
    match format {
        OutputFormat::Text => println!("✓ Saved API key to {}", path.display()),
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&json!({ "saved": path }))?
        ),
    }
    Ok(())
}

async fn prompt_line(prompt: &'static str) -> Result<String> {
    let line = tokio::task::spawn_blocking(move || -> std::io::Result<String> {
        use std::io::{BufRead, Write};
        let mut stdout = std::io::stdout();
        write!(stdout, "{prompt}")?;
        stdout.flush()?;
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line)?;
        Ok(line)
    })
    .await??;
    Ok(line)
}

/// Terminal summary of a task: success, incomplete, or error, plus the
/// iteration count.
pub fn render_state(state: &AgentState, format: OutputFormat) -> Result<String> {
    if format == OutputFormat::Json {
        let output = json!({
            "status": state.status(),
            "iterations": state.iteration(),
            "summary": state.summary(),
            "error": state.error(),
            "transcript": state.transcript_json(),
        });
        return Ok(serde_json::to_string_pretty(&output)?);
    }

    let iterations = state.iteration();
    let text = match state.status() {
        LoopStatus::Completed => {
            let summary = state.summary().unwrap_or_default();
            format!("✓ Task completed after {iterations} iteration(s)\n  {summary}")
        }
        LoopStatus::Failed
            if state.error() == Some(EngineError::MaxIterationsExceeded.to_string().as_str()) =>
        {
            format!(
                "⚠ Task incomplete after {iterations} iteration(s): max iterations reached\n  Hint: {}",
                EngineError::MaxIterationsExceeded.user_hint()
            )
        }
        LoopStatus::Failed => {
            let hint = if state.rate_limited() {
                EngineError::RateLimited(String::new()).user_hint()
            } else {
                EngineError::NoToolCall.user_hint()
            };
            format!(
                "✗ Task failed after {iterations} iteration(s): {}\n  Hint: {hint}",
                state.error().unwrap_or("unknown error")
            )
        }
        LoopStatus::Running => format!("Task still running after {iterations} iteration(s)"),
    };
    Ok(text)
}

pub fn render_error(err: &EngineError, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Text => format!("✗ {err}\n  Hint: {}", err.user_hint()),
        OutputFormat::Json => serde_json::to_string_pretty(&json!({
            "status": "FAILED",
            "error": err.to_string(),
            "hint": err.user_hint(),
        }))?,
    })
}

/// One tool result as printed for a direct tool command
pub fn render_tool_result(tool: &str, result: &ToolResult, format: OutputFormat) -> Result<String> {
    if format == OutputFormat::Json {
        return Ok(serde_json::to_string_pretty(result)?);
    }
    let marker = if result.success { "✓" } else { "✗" };
    Ok(format!("{marker} {tool}\n{}", result.output_text()))
}

fn render_history(entries: &[HistoryEntry], limit: usize, format: OutputFormat) -> Result<String> {
    if format == OutputFormat::Json {
        return Ok(serde_json::to_string_pretty(entries)?);
    }
    if entries.is_empty() {
        return Ok("No tasks in history".to_string());
    }

    let mut lines = vec![format!("History (last {} entries):", limit), String::new()];
    for entry in entries {
        lines.push(format!("[{}] {}", entry.timestamp, entry.user));
        if let Some(status) = entry.agent_plan.get("status").and_then(|s| s.as_str()) {
            let iterations = entry
                .agent_plan
                .get("iterations")
                .and_then(|i| i.as_u64())
                .unwrap_or(0);
            lines.push(format!("  Status: {status} ({iterations} iterations)"));
        }
        if let Some(summary) = entry.agent_plan.get("summary").and_then(|s| s.as_str()) {
            lines.push(format!("  Summary: {summary}"));
        }
        if let Some(error) = entry.agent_plan.get("error").and_then(|s| s.as_str()) {
            lines.push(format!("  Error: {error}"));
        }
    }
    Ok(lines.join("\n"))
}
