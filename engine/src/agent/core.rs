//! Agent Loop Core
//!
//! Drives one goal through repeated decide, act, observe cycles:
//!
//! 1. Advance the iteration counter; stop with "max iterations reached" once
//!    the budget is spent
//! 2. Build a prompt from the task framing, the last few transcript entries
//!    and the working-memory snapshot
//! 3. Ask the model. Free text becomes a thought; no usable answer fails the
//!    task with "no tool call returned"
//! 4. `task_complete` ends the task successfully
//! 5. Anything else is normalized and dispatched; the full result goes into
//!    the transcript
//! 6. A failed result queues a reflection thought for the next prompt
//!
//! Termination only happens at steps 1, 3 and 4. Tool failures never end
//! the task by themselves.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use sdk::{ToolInvocation, ToolResult};

use super::state::{AgentState, TranscriptEntry};
use crate::llm::{parse_tool_payload, LLMError, LLMProvider, LLMResponse, Message};
use crate::tools::normalizer::{from_function_call, normalize};
use crate::tools::{Dispatcher, TASK_COMPLETE};

/// Default iteration budget per task
pub const DEFAULT_MAX_ITERATIONS: u32 = 50;

/// Transcript entries shown to the model each iteration
pub const DEFAULT_PROMPT_WINDOW: usize = 5;

/// Tool output characters fed back to the model
pub const DEFAULT_OUTPUT_TRUNCATE: usize = 2000;

/// File lists cached in working memory are capped at this many entries
const MEMORY_FILE_LIMIT: usize = 50;

const NO_TOOL_CALL: &str = "no tool call returned";

/// Loop limits
#[derive(Debug, Clone, Copy)]
pub struct LoopSettings {
    pub max_iterations: u32,
    pub prompt_window: usize,
    pub output_truncate_chars: usize,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            prompt_window: DEFAULT_PROMPT_WINDOW,
            output_truncate_chars: DEFAULT_OUTPUT_TRUNCATE,
        }
    }
}

/// What the model decided this iteration
enum Decision {
    Act(ToolInvocation),
    Rejected {
        tool: String,
        result: ToolResult,
    },
    Think(String),
    Nothing(Option<LLMError>),
}

pub struct AgentLoop {
    provider: Arc<dyn LLMProvider>,
    dispatcher: Arc<Dispatcher>,
    settings: LoopSettings,
}

impl AgentLoop {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        dispatcher: Arc<Dispatcher>,
        settings: LoopSettings,
    ) -> Self {
        Self {
            provider,
            dispatcher,
            settings,
        }
    }

    pub fn settings(&self) -> LoopSettings {
        self.settings
    }

    /// Run one goal to a terminal state.
    ///
    /// `session_context` is extra framing for this task (recent conversation,
    /// project summary). It may be empty.
    pub async fn run(&self, goal: &str, session_context: &str) -> AgentState {
        let mut state = AgentState::new(goal);
        let framing = self.task_framing(session_context);
        let schemas = self.dispatcher.registry().schemas();
        let mut pending_reflection: Option<String> = None;

        info!(
            provider = self.provider.name(),
            max_iterations = self.settings.max_iterations,
            "Starting task: {}",
            goal
        );

        loop {
            if state.iteration() >= self.settings.max_iterations {
                warn!(iterations = state.iteration(), "Iteration budget exhausted");
                state.fail(sdk::EngineError::MaxIterationsExceeded.to_string());
                break;
            }
            state.advance();
            debug!(iteration = state.iteration(), "Agent iteration");

            if let Some(reflection) = pending_reflection.take() {
                state.record_thought(reflection);
            }

            let messages = vec![
                Message::system(framing.as_str()),
                Message::user(self.build_prompt(&state)),
            ];
            let response = self.provider.generate(&messages, &schemas).await;

            let invocation = match self.interpret(response) {
                Decision::Act(invocation) => invocation,
                Decision::Think(text) => {
                    debug!("Model replied with free text");
                    state.record_thought(text);
                    continue;
                }
                Decision::Rejected { tool, result } => {
                    warn!(tool = %tool, output = %result.output_text(), "Tool call rejected");
                    let invocation = ToolInvocation::new(tool);
                    pending_reflection = Some(reflection_for(&invocation, &result));
                    state.record_tool_result(&invocation, result);
                    continue;
                }
                Decision::Nothing(err) => {
                    match err {
                        Some(e) => {
                            error!(error = %e, "Model call failed");
                            let reason = format!("{NO_TOOL_CALL}: {e}");
                            if e.is_rate_limit() {
                                state.fail_rate_limited(reason);
                            } else {
                                state.fail(reason);
                            }
                        }
                        None => {
                            error!("Model returned no usable output");
                            state.fail(NO_TOOL_CALL);
                        }
                    }
                    break;
                }
            };

            if invocation.name == TASK_COMPLETE {
                let summary = invocation
                    .str_param(0, "summary")
                    .or_else(|| invocation.str_param(0, "message"))
                    .unwrap_or_else(|| "Task complete".to_string());
                state.record_tool_result(&invocation, ToolResult::ok(summary));
                state.mark_completed();
                info!(iterations = state.iteration(), "Task completed");
                break;
            }

            info!(tool = %invocation.name, iteration = state.iteration(), "Dispatching");
            let result = self.dispatcher.dispatch(&invocation).await;
            if result.success {
                update_working_memory(&mut state, &invocation, &result);
            } else {
                pending_reflection = Some(reflection_for(&invocation, &result));
            }
            state.record_tool_result(&invocation, result);
        }

        state
    }

    fn interpret(&self, response: Result<LLMResponse, LLMError>) -> Decision {
        let registry = self.dispatcher.registry();
        match response {
            Err(e) => Decision::Nothing(Some(e)),
            Ok(LLMResponse::Empty) => Decision::Nothing(None),
            Ok(LLMResponse::ToolCall { name, arguments }) => {
                match from_function_call(&name, &arguments, registry) {
                    Ok(invocation) => Decision::Act(invocation),
                    Err(rejection) => Decision::Rejected {
                        tool: name.to_ascii_lowercase(),
                        result: rejection.into_result(),
                    },
                }
            }
            Ok(LLMResponse::Text(text)) => match parse_tool_payload(&text) {
                Some(payload) => match normalize(&payload, registry) {
                    Ok(invocation) => Decision::Act(invocation),
                    Err(rejection) => Decision::Rejected {
                        tool: payload
                            .get("tool")
                            .and_then(Value::as_str)
                            .unwrap_or("unknown")
                            .to_ascii_lowercase(),
                        result: rejection.into_result(),
                    },
                },
                None if text.trim().is_empty() => Decision::Nothing(None),
                None => Decision::Think(text.trim().to_string()),
            },
        }
    }

    fn task_framing(&self, session_context: &str) -> String {
        let mut framing = String::from(
            "You are a coding agent working inside a single repository.\n\
             Work step by step. Each reply must be exactly one tool call.\n\
             Prefer the dedicated file tools over shell commands for reading, searching and listing.\n\
             Never touch paths outside the workspace.\n\
             When a tool fails, read the error, adjust the arguments and try again.\n\
             When the goal is fully achieved, call task_complete with a short summary.\n\n\
             If function calling is unavailable, reply with JSON only:\n\
             {\"tool\": \"<name>\", \"args\": [...], \"kwargs\": {...}}\n\n\
             ## Tools\n",
        );
        framing.push_str(&self.dispatcher.registry().tool_listing());
        if !session_context.trim().is_empty() {
            framing.push_str("\n\n");
            framing.push_str(session_context.trim());
        }
        framing
    }

    fn build_prompt(&self, state: &AgentState) -> String {
        let mut prompt = format!(
            "## Goal\n{}\n\n## Iteration\n{} of {}\n",
            state.goal(),
            state.iteration(),
            self.settings.max_iterations
        );

        let recent = state.recent(self.settings.prompt_window);
        if !recent.is_empty() {
            prompt.push_str("\n## Recent steps\n");
            for entry in recent {
                prompt.push_str(&render_entry(entry, self.settings.output_truncate_chars));
                prompt.push('\n');
            }
        }

        if !state.working_memory().is_empty() {
            prompt.push_str("\n## Working memory\n");
            for (key, value) in state.working_memory() {
                prompt.push_str(&format!("- {key}: {value}\n"));
            }
        }

        prompt.push_str("\nDecide the next action.");
        prompt
    }
}

fn render_entry(entry: &TranscriptEntry, max_chars: usize) -> String {
    match entry {
        TranscriptEntry::Thought { iteration, text } => {
            format!("[{iteration}] thought: {}", truncate_for_prompt(text, max_chars))
        }
        TranscriptEntry::ToolResult {
            iteration,
            tool,
            args,
            kwargs,
            result,
        } => {
            let status = if result.success { "ok" } else { "failed" };
            format!(
                "[{iteration}] {tool} args={} kwargs={} -> {status}\n{}",
                json!(args),
                json!(kwargs),
                truncate_for_prompt(&result.output_text(), max_chars)
            )
        }
    }
}

/// Cut `text` to `max_chars` characters, noting how much was dropped.
pub fn truncate_for_prompt(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars).collect();
    format!("{head}\n... [truncated {} chars]", total - max_chars)
}

fn reflection_for(invocation: &ToolInvocation, result: &ToolResult) -> String {
    format!(
        "The previous call failed. Tool: {} args: {} kwargs: {} result: {}. \
         Work out what went wrong and choose a corrected next action.",
        invocation.name,
        json!(invocation.args),
        json!(invocation.kwargs),
        json!({
            "success": result.success,
            "output": result.output,
            "meta": result.meta,
        })
    )
}

/// Cache facts that save the model a repeat call
fn update_working_memory(state: &mut AgentState, invocation: &ToolInvocation, result: &ToolResult) {
    match invocation.name.as_str() {
        "find_files" | "list_files" => {
            if let Value::Array(files) = &result.output {
                let cached: Vec<Value> = files.iter().take(MEMORY_FILE_LIMIT).cloned().collect();
                state.remember("files_found", Value::Array(cached));
            }
        }
        "grep" => {
            let files: Vec<Value> = match &result.output {
                Value::Array(items) => items
                    .iter()
                    .filter_map(|item| item.get("file").cloned().or_else(|| Some(item.clone())))
                    .collect(),
                Value::Object(counts) => counts.keys().cloned().map(Value::String).collect(),
                _ => Vec::new(),
            };
            let mut deduped: Vec<Value> = Vec::new();
            for file in files {
                if !deduped.contains(&file) && deduped.len() < MEMORY_FILE_LIMIT {
                    deduped.push(file);
                }
            }
            state.remember("files_matched", Value::Array(deduped));
        }
        "read_file" => {
            if let Some(path) = result.meta.get("path") {
                state.remember("last_read", path.clone());
            }
        }
        _ => {}
    }
}
