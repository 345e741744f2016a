//! Persistent todo list for multi-step tasks.
//!
//! Stored as a JSON array of `{id, content, status}` at the configured path
//! (`CODEGEN_TODOS_PATH`, default under the user config dir).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::fs;
use tracing::{debug, warn};

use sdk::{ParamType, Tool, ToolError, ToolInvocation, ToolParameter, ToolResult, ToolSchema};

use super::filesystem::write_atomic;
use super::ToolContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
}

impl TodoStatus {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: String,
    pub content: String,
    pub status: TodoStatus,
}

impl TodoItem {
    /// Accepts numeric ids as well as strings.
    fn from_value(value: &Value) -> Option<Self> {
        let id = match value.get("id")? {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        let content = value.get("content")?.as_str()?.to_string();
        let status = TodoStatus::parse(value.get("status")?.as_str()?)?;
        Some(Self {
            id,
            content,
            status,
        })
    }
}

/// JSON-file backed todo store
#[derive(Debug, Clone)]
pub struct TodoStore {
    path: PathBuf,
}

impl TodoStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or unreadable files load as an empty list.
    pub async fn load(&self) -> Vec<TodoItem> {
        let Ok(text) = fs::read_to_string(&self.path).await else {
            return Vec::new();
        };
        match serde_json::from_str(&text) {
            Ok(items) => items,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ignoring corrupt todo file");
                Vec::new()
            }
        }
    }

    pub async fn save(&self, items: &[TodoItem]) -> Result<(), ToolError> {
        let text = serde_json::to_string_pretty(items)
            .map_err(|e| ToolError::Execution(e.to_string()))?;
        write_atomic(&self.path, &text).await
    }
}

fn next_id(items: &[TodoItem]) -> String {
    let max = items
        .iter()
        .filter_map(|t| t.id.parse::<u64>().ok())
        .max()
        .unwrap_or(0);
    (max + 1).to_string()
}

/// Replace items with matching ids, append the rest; ordered by id.
fn merge_by_id(existing: Vec<TodoItem>, incoming: Vec<TodoItem>) -> Vec<TodoItem> {
    let mut merged = existing;
    for item in incoming {
        match merged.iter_mut().find(|t| t.id == item.id) {
            Some(slot) => *slot = item,
            None => merged.push(item),
        }
    }
    merged.sort_by(|a, b| match (a.id.parse::<u64>(), b.id.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.id.cmp(&b.id),
    });
    merged
}

pub struct ManageTodosTool {
    store: TodoStore,
}

impl ManageTodosTool {
    pub fn new(ctx: &ToolContext) -> Self {
        Self {
            store: TodoStore::new(&ctx.settings.todos_path),
        }
    }

    async fn write_list(&self, raw: &[Value], merge: bool) -> Result<ToolResult, ToolError> {
        let parsed: Option<Vec<TodoItem>> = raw.iter().map(TodoItem::from_value).collect();
        let Some(incoming) = parsed else {
            return Ok(ToolResult::failure(
                "Invalid todos array. Each item must have id, content, status.",
            ));
        };
        let items = if merge {
            merge_by_id(self.store.load().await, incoming)
        } else {
            incoming
        };
        self.store.save(&items).await?;
        Ok(ToolResult::ok(json!({"message": "Todos updated", "count": items.len()})))
    }
}

#[async_trait]
impl Tool for ManageTodosTool {
    fn name(&self) -> &str {
        "manage_todos"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "manage_todos",
            "Track the steps of a multi-step task. Actions: add, list, pop, clear, update_status, active.",
        )
        .with_parameter(ToolParameter::new(
            "action",
            "One of add, list, pop, clear, update_status, active",
            true,
        ))
        .with_parameter(ToolParameter::new("content", "Text of the todo to add", false))
        .with_parameter(ToolParameter::new("id", "Todo id for update_status", false))
        .with_parameter(ToolParameter::new(
            "status",
            "New status: pending, in_progress or completed",
            false,
        ))
        .with_parameter(
            ToolParameter::new("todos", "Full list of {id, content, status} to store", false)
                .with_items(json!({"type": "object"})),
        )
        .with_parameter(
            ToolParameter::new("merge", "Merge `todos` into the stored list by id", false)
                .with_type(ParamType::Boolean),
        )
    }

    async fn call(&self, invocation: &ToolInvocation) -> Result<Value, ToolError> {
        let list = invocation
            .kwargs
            .get("todos")
            .or_else(|| invocation.args.first())
            .and_then(Value::as_array);
        if let Some(raw) = list {
            return Ok(self.write_list(raw, invocation.flag("merge")).await?.into());
        }

        let action = invocation
            .str_param(0, "action")
            .map(|a| a.trim().to_ascii_lowercase())
            .unwrap_or_else(|| "list".to_string());
        debug!(action = %action, "manage_todos");

        let mut items = self.store.load().await;
        let result = match action.as_str() {
            "add" => {
                let content = invocation
                    .kwargs
                    .get("content")
                    .or_else(|| invocation.kwargs.get("text"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| {
                        invocation
                            .args
                            .iter()
                            .skip(1)
                            .filter_map(Value::as_str)
                            .collect::<Vec<_>>()
                            .join(" ")
                    });
                let content = content.trim();
                if content.is_empty() {
                    return Ok(ToolResult::failure("Todo text cannot be empty.").into());
                }
                let item = TodoItem {
                    id: next_id(&items),
                    content: content.to_string(),
                    status: TodoStatus::Pending,
                };
                let output = format!("Added todo {}: {}", item.id, item.content);
                items.push(item);
                self.store.save(&items).await?;
                ToolResult::ok(output)
            }
            "list" => ToolResult::ok(json!(items)),
            "active" => {
                let active: Vec<&TodoItem> = items
                    .iter()
                    .filter(|t| t.status != TodoStatus::Completed)
                    .collect();
                ToolResult::ok(json!(active))
            }
            "pop" => {
                if items.is_empty() {
                    return Ok(ToolResult::failure("No todos to remove.").into());
                }
                let removed = items.remove(0);
                self.store.save(&items).await?;
                ToolResult::ok(format!("Removed todo {}: {}", removed.id, removed.content))
            }
            "clear" => {
                self.store.save(&[]).await?;
                ToolResult::ok("Cleared all todos.")
            }
            "update_status" | "update" => {
                let id = invocation
                    .str_param(1, "id")
                    .ok_or_else(|| ToolError::MissingParameter("id".into()))?;
                let status_name = invocation
                    .str_param(2, "status")
                    .ok_or_else(|| ToolError::MissingParameter("status".into()))?;
                let Some(status) = TodoStatus::parse(&status_name) else {
                    return Ok(ToolResult::failure(
                        "Invalid status. Must be one of: pending, in_progress, completed",
                    )
                    .into());
                };
                let Some(todo) = items.iter_mut().find(|t| t.id == id) else {
                    return Ok(ToolResult::failure(format!("Todo with ID '{id}' not found")).into());
                };
                todo.status = status;
                self.store.save(&items).await?;
                ToolResult::ok(format!("Updated todo {id} status to {}", status.as_str()))
            }
            other => ToolResult::failure(format!(
                "Unknown action '{other}'. Use add, list, pop, clear, update_status or active."
            )),
        };
        Ok(result.into())
    }
}
