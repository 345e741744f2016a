//! Per-task agent state
//!
//! One [`AgentState`] exists per goal. The loop owns it exclusively; callers
//! get it back once the loop reaches a terminal status.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use sdk::{Kwargs, ToolInvocation, ToolResult};

use crate::tools::TASK_COMPLETE;

/// Where the loop is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoopStatus {
    Running,
    Completed,
    Failed,
}

/// One transcript record, tagged with the iteration it happened in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TranscriptEntry {
    Thought {
        iteration: u32,
        text: String,
    },
    ToolResult {
        iteration: u32,
        tool: String,
        args: Vec<Value>,
        kwargs: Kwargs,
        result: ToolResult,
    },
}

impl TranscriptEntry {
    pub fn iteration(&self) -> u32 {
        match self {
            Self::Thought { iteration, .. } | Self::ToolResult { iteration, .. } => *iteration,
        }
    }

    pub fn is_tool_result(&self) -> bool {
        matches!(self, Self::ToolResult { .. })
    }
}

/// Mutable record of one task's execution
#[derive(Debug, Clone, Serialize)]
pub struct AgentState {
    goal: String,
    iteration: u32,
    transcript: Vec<TranscriptEntry>,
    working_memory: BTreeMap<String, Value>,
    completed: bool,
    error: Option<String>,
    #[serde(skip)]
    rate_limited: bool,
}

impl AgentState {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            iteration: 0,
            transcript: Vec::new(),
            working_memory: BTreeMap::new(),
            completed: false,
            error: None,
            rate_limited: false,
        }
    }

    pub fn goal(&self) -> &str {
        &self.goal
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    pub fn working_memory(&self) -> &BTreeMap<String, Value> {
        &self.working_memory
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// True when the terminal failure came from a rate limit or quota error
    pub fn rate_limited(&self) -> bool {
        self.rate_limited
    }

    pub fn status(&self) -> LoopStatus {
        if self.completed {
            LoopStatus::Completed
        } else if self.error.is_some() {
            LoopStatus::Failed
        } else {
            LoopStatus::Running
        }
    }

    /// Number of `tool_result` entries in the transcript
    pub fn tool_result_count(&self) -> usize {
        self.transcript.iter().filter(|e| e.is_tool_result()).count()
    }

    /// The trailing `window` entries
    pub fn recent(&self, window: usize) -> &[TranscriptEntry] {
        let start = self.transcript.len().saturating_sub(window);
        &self.transcript[start..]
    }

    /// Summary text carried by the `task_complete` entry, if any
    pub fn summary(&self) -> Option<String> {
        self.transcript.iter().rev().find_map(|entry| match entry {
            TranscriptEntry::ToolResult { tool, result, .. } if tool == TASK_COMPLETE => {
                Some(result.output_text())
            }
            _ => None,
        })
    }

    pub(crate) fn advance(&mut self) {
        self.iteration += 1;
    }

    pub(crate) fn record_thought(&mut self, text: impl Into<String>) {
        self.transcript.push(TranscriptEntry::Thought {
            iteration: self.iteration,
            text: text.into(),
        });
    }

    pub(crate) fn record_tool_result(&mut self, invocation: &ToolInvocation, result: ToolResult) {
        self.transcript.push(TranscriptEntry::ToolResult {
            iteration: self.iteration,
            tool: invocation.name.clone(),
            args: invocation.args.clone(),
            kwargs: invocation.kwargs.clone(),
            result,
        });
    }

    pub(crate) fn remember(&mut self, key: impl Into<String>, value: Value) {
        self.working_memory.insert(key.into(), value);
    }

    /// Set once, and only by the loop on an explicit completion signal.
    pub(crate) fn mark_completed(&mut self) {
        debug_assert!(self.status() == LoopStatus::Running);
        self.completed = true;
    }

    pub(crate) fn fail(&mut self, reason: impl Into<String>) {
        debug_assert!(!self.completed);
        self.error = Some(reason.into());
    }

    pub(crate) fn fail_rate_limited(&mut self, reason: impl Into<String>) {
        self.rate_limited = true;
        self.fail(reason);
    }

    /// Full transcript as JSON for history persistence
    pub fn transcript_json(&self) -> Value {
        serde_json::to_value(&self.transcript).unwrap_or(Value::Null)
    }
}
