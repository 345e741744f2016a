//! Shell execution tool
//!
//! Routes every command through [`CommandExecutor`] for disallow-list
//! validation and the timeout. A command that passes validation still needs
//! an explicit yes from the confirmation gate.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use sdk::{ParamType, Tool, ToolError, ToolInvocation, ToolParameter, ToolResult, ToolSchema};

use super::ToolContext;
use crate::command_executor::{CommandError, CommandExecutor};
use crate::confirmation::{ConfirmationGate, DestructiveAction};

#[derive(Clone)]
pub struct RunCommandTool {
    executor: CommandExecutor,
    gate: ConfirmationGate,
    default_timeout_ms: u64,
}

impl RunCommandTool {
    pub fn new(ctx: &ToolContext) -> Self {
        Self {
            executor: CommandExecutor::with_disallowed(
                ctx.guard.root(),
                ctx.settings.disallowed_commands.iter().cloned(),
            ),
            gate: ctx.gate.clone(),
            default_timeout_ms: ctx.settings.shell_timeout_ms,
        }
    }
}

#[async_trait]
impl Tool for RunCommandTool {
    fn name(&self) -> &str {
        "run_command"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "run_command",
            "Run a shell command in the workspace root and return its output. Privileged and destructive commands are refused.",
        )
        .with_parameter(ToolParameter::new("command", "Shell command line to run", true))
        .with_parameter(
            ToolParameter::new("timeout_ms", "Timeout in milliseconds (default 120000)", false)
                .with_type(ParamType::Integer),
        )
    }

    async fn call(&self, invocation: &ToolInvocation) -> Result<Value, ToolError> {
        // Shorthand commands arrive as separate words: `bash ls -la`
        let command = match invocation.str_param(0, "command") {
            Some(c) if invocation.kwargs.contains_key("command") => c,
            _ => invocation
                .args
                .iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(" "),
        };
        if command.trim().is_empty() {
            return Err(ToolError::MissingParameter("command".into()));
        }
        let timeout_ms = match invocation.kwargs.get("timeout_ms") {
            Some(_) => match invocation.i64_param(1, "timeout_ms")? {
                Some(ms) if ms > 0 => ms as u64,
                _ => {
                    return Err(ToolError::InvalidParameter(
                        "timeout_ms must be positive".into(),
                    ))
                }
            },
            None => self.default_timeout_ms,
        };

        if let Err(e) = self.executor.validate(&command) {
            warn!(command = %command, error = %e, "Command rejected");
            return Ok(ToolResult::failure(e.to_string()).into());
        }

        if !self
            .gate
            .confirm(DestructiveAction::Execute, &command)
            .await
            .is_approved()
        {
            return Ok(ToolResult::failure("Command cancelled.").into());
        }

        info!(command = %command, timeout_ms, "Running command");
        match self.executor.execute(&command, timeout_ms).await {
            Ok(out) => {
                let result = if out.success() {
                    ToolResult::ok(out.combined())
                } else {
                    ToolResult::failure(out.combined())
                };
                Ok(result.with_meta("exit_code", out.exit_code).into())
            }
            Err(CommandError::Timeout(ms)) => {
                Ok(ToolResult::failure(format!("Command timed out after {ms} ms")).into())
            }
            Err(e) => Err(ToolError::Execution(e.to_string())),
        }
    }
}
