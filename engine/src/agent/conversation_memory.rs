//! Cross-task conversation memory
//!
//! Keeps short summaries of the last few finished tasks so a follow-up like
//! "now add tests for it" has something to resolve "it" against. Eviction is
//! strict FIFO.

use std::collections::{BTreeSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::state::{AgentState, TranscriptEntry};
use crate::tools::TASK_COMPLETE;

/// Default number of tasks remembered
pub const DEFAULT_MEMORY_CAPACITY: usize = 10;

/// Summary of one finished task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMemory {
    pub request: String,
    pub iterations: u32,
    pub completed: bool,
    pub files_created: Vec<String>,
    pub files_modified: Vec<String>,
    pub summary: String,
    pub key_outcomes: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl TaskMemory {
    /// Extract what a finished task touched from its transcript.
    pub fn from_state(state: &AgentState) -> Self {
        let mut files_created = Vec::new();
        let mut files_modified: Vec<String> = Vec::new();
        let mut key_outcomes = Vec::new();
        let mut summary = String::new();

        for entry in state.transcript() {
            let TranscriptEntry::ToolResult { tool, result, .. } = entry else {
                continue;
            };
            if !result.success {
                continue;
            }
            let output = match &result.output {
                Value::String(s) => s.as_str(),
                _ => "",
            };
            match tool.as_str() {
                "write_file" => {
                    if let Some(path) = output.strip_prefix("Wrote to ") {
                        let path = path.trim().to_string();
                        key_outcomes.push(format!("Created {path}"));
                        files_created.push(path);
                    }
                }
                "edit_file" | "multi_edit" => {
                    if let Some(paths) = output.strip_prefix("Edited ") {
                        for path in paths.split(", ").map(str::trim) {
                            if !path.is_empty() && !files_modified.iter().any(|p| p == path) {
                                files_modified.push(path.to_string());
                            }
                        }
                    }
                }
                "delete_file" => {
                    if let Some(Value::Array(deleted)) = result.meta.get("deleted") {
                        for path in deleted.iter().filter_map(Value::as_str) {
                            key_outcomes.push(format!("Deleted {path}"));
                        }
                    }
                }
                TASK_COMPLETE => summary = output.to_string(),
                _ => {}
            }
        }

        Self {
            request: state.goal().to_string(),
            iterations: state.iteration(),
            completed: state.is_completed(),
            files_created,
            files_modified,
            summary,
            key_outcomes,
            timestamp: Utc::now(),
        }
    }
}

/// Bounded FIFO of recent task summaries
#[derive(Debug, Clone)]
pub struct ConversationMemory {
    capacity: usize,
    tasks: VecDeque<TaskMemory>,
    files_touched: BTreeSet<String>,
}

impl ConversationMemory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            tasks: VecDeque::new(),
            files_touched: BTreeSet::new(),
        }
    }

    pub fn add_task(&mut self, task: TaskMemory) {
        if self.tasks.len() == self.capacity {
            self.tasks.pop_front();
        }
        self.files_touched.extend(task.files_created.iter().cloned());
        self.files_touched.extend(task.files_modified.iter().cloned());
        self.tasks.push_back(task);
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn tasks(&self) -> impl Iterator<Item = &TaskMemory> {
        self.tasks.iter()
    }

    pub fn clear(&mut self) {
        self.tasks.clear();
        self.files_touched.clear();
    }

    /// Markdown block describing the last `limit` tasks, empty when there
    /// is nothing to remember.
    pub fn recent_context(&self, limit: usize) -> String {
        if self.tasks.is_empty() {
            return String::new();
        }

        let mut lines = vec![
            "## Previous Conversation (Recent Tasks)".to_string(),
            "This is our conversation history from earlier in this session:\n".to_string(),
        ];

        let skip = self.tasks.len().saturating_sub(limit);
        for (i, task) in self.tasks.iter().skip(skip).enumerate() {
            lines.push(format!("**Task {}**: {}", i + 1, task.request));
            if !task.files_created.is_empty() {
                lines.push(format!("  - Created: {}", task.files_created.join(", ")));
            }
            if !task.files_modified.is_empty() {
                lines.push(format!("  - Modified: {}", task.files_modified.join(", ")));
            }
            if !task.summary.is_empty() {
                lines.push(format!("  - Result: {}", task.summary));
            }
            for outcome in &task.key_outcomes {
                lines.push(format!("  - {outcome}"));
            }
            lines.push(String::new());
        }

        if !self.files_touched.is_empty() {
            let files: Vec<&str> = self.files_touched.iter().map(String::as_str).collect();
            lines.push(format!(
                "**Files we've worked with this session**: {}",
                files.join(", ")
            ));
        }

        lines.join("\n")
    }
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_CAPACITY)
    }
}
