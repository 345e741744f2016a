//! Find-and-replace editing: `edit_file` and the atomic `multi_edit` batch.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use regex::{NoExpand, Regex};
use serde_json::{json, Value};
use tokio::fs;
use tracing::info;

use sdk::{ParamType, Tool, ToolError, ToolInvocation, ToolParameter, ToolResult, ToolSchema};

use super::filesystem::write_atomic;
use super::{resolve_path, ToolContext};
use crate::confirmation::{ConfirmationGate, DestructiveAction};
use crate::fs_guard::WorkspaceGuard;

/// One replacement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub old_string: String,
    pub new_string: String,
    pub replace_all: bool,
}

/// Apply one edit to `content`.
///
/// An empty `old_string` replaces the whole content. An exact match is
/// preferred; without one, the words of `old_string` are matched with any
/// whitespace between them. More than one match without `replace_all` is an
/// error.
pub fn apply_edit(content: &str, edit: &Edit) -> Result<String, String> {
    if edit.old_string.is_empty() {
        return Ok(edit.new_string.clone());
    }

    let exact = content.matches(edit.old_string.as_str()).count();
    if exact > 1 && !edit.replace_all {
        return Err(format!(
            "Found {exact} occurrences of the text; set replace_all or add more context"
        ));
    }
    if exact == 1 {
        return Ok(content.replacen(edit.old_string.as_str(), &edit.new_string, 1));
    }
    if exact > 1 {
        return Ok(content.replace(edit.old_string.as_str(), &edit.new_string));
    }

    let words: Vec<String> = edit
        .old_string
        .split_whitespace()
        .map(regex::escape)
        .collect();
    if words.is_empty() {
        return Err(format!("Text '{}' not found in file.", edit.old_string));
    }
    let fuzzy = Regex::new(&words.join(r"\s+")).map_err(|e| e.to_string())?;
    match fuzzy.find_iter(content).count() {
        0 => Err(format!("Text '{}' not found in file.", edit.old_string)),
        1 => Ok(fuzzy
            .replacen(content, 1, NoExpand(&edit.new_string))
            .into_owned()),
        n if !edit.replace_all => Err(format!(
            "Found {n} occurrences of the text; set replace_all or add more context"
        )),
        _ => Ok(fuzzy
            .replace_all(content, NoExpand(&edit.new_string))
            .into_owned()),
    }
}

fn string_field(obj: &Value, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}

fn bool_field(obj: &Value, key: &str) -> bool {
    match obj.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

pub struct EditFileTool {
    guard: Arc<WorkspaceGuard>,
}

impl EditFileTool {
    pub fn new(ctx: &ToolContext) -> Self {
        Self {
            guard: Arc::clone(&ctx.guard),
        }
    }
}

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "edit_file",
            "Edit an existing file by finding and replacing text. Read the file first to know the exact text to replace.",
        )
        .with_parameter(ToolParameter::new("path", "Path to the file to edit", true))
        .with_parameter(ToolParameter::new(
            "old_string",
            "Exact text to find (empty replaces the whole file)",
            true,
        ))
        .with_parameter(ToolParameter::new("new_string", "Replacement text", true))
        .with_parameter(
            ToolParameter::new("replace_all", "Replace every occurrence (default false)", false)
                .with_type(ParamType::Boolean),
        )
    }

    async fn call(&self, invocation: &ToolInvocation) -> Result<Value, ToolError> {
        let path = invocation.require_str(0, "path")?;
        let (Some(old_string), Some(new_string)) = (
            invocation.str_param(1, "old_string"),
            invocation.str_param(2, "new_string"),
        ) else {
            return Ok(ToolResult::failure("Both old_string and new_string are required.").into());
        };
        let edit = Edit {
            old_string,
            new_string,
            replace_all: invocation.flag("replace_all"),
        };

        let target = resolve_path(&self.guard, &path)?;
        if !target.is_file() {
            return Ok(ToolResult::failure(format!("File not found: {path}")).into());
        }
        let rel = self.guard.relative(&target);
        let original = fs::read_to_string(&target).await?;

        match apply_edit(&original, &edit) {
            Ok(updated) => {
                write_atomic(&target, &updated).await?;
                info!("Edited {}", rel);
                Ok(ToolResult::ok(format!("Edited {rel}")).into())
            }
            Err(reason) => Ok(ToolResult::failure(reason).into()),
        }
    }
}

pub struct MultiEditTool {
    guard: Arc<WorkspaceGuard>,
    gate: ConfirmationGate,
}

impl MultiEditTool {
    pub fn new(ctx: &ToolContext) -> Self {
        Self {
            guard: Arc::clone(&ctx.guard),
            gate: ctx.gate.clone(),
        }
    }

    /// Edits grouped by target path, in first-seen order of paths.
    fn plan(&self, invocation: &ToolInvocation) -> Result<Vec<(String, Vec<Edit>)>, ToolError> {
        let base = match (invocation.kwargs.get("path"), invocation.args.first()) {
            (Some(Value::String(p)), _) => Some(p.clone()),
            (None, Some(Value::String(p))) => Some(p.clone()),
            _ => None,
        };
        let edits = invocation
            .kwargs
            .get("edits")
            .or_else(|| invocation.args.iter().find(|v| v.is_array()))
            .and_then(Value::as_array)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| ToolError::MissingParameter("edits".into()))?;

        let mut order: Vec<String> = Vec::new();
        let mut grouped: BTreeMap<String, Vec<Edit>> = BTreeMap::new();
        for (i, raw) in edits.iter().enumerate() {
            let path = string_field(raw, "path")
                .or_else(|| string_field(raw, "file_path"))
                .or_else(|| base.clone())
                .ok_or_else(|| ToolError::InvalidParameter(format!("edit {i} has no path")))?;
            let (Some(old_string), Some(new_string)) =
                (string_field(raw, "old_string"), string_field(raw, "new_string"))
            else {
                return Err(ToolError::InvalidParameter(format!(
                    "edit {i} needs old_string and new_string"
                )));
            };
            if !grouped.contains_key(&path) {
                order.push(path.clone());
            }
            grouped.entry(path).or_default().push(Edit {
                old_string,
                new_string,
                replace_all: bool_field(raw, "replace_all"),
            });
        }

        Ok(order
            .into_iter()
            .filter_map(|p| grouped.remove(&p).map(|e| (p, e)))
            .collect())
    }
}

#[async_trait]
impl Tool for MultiEditTool {
    fn name(&self) -> &str {
        "multi_edit"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "multi_edit",
            "Apply several find-and-replace edits at once. Nothing is written unless every edit applies.",
        )
        .with_parameter(ToolParameter::new(
            "path",
            "Default file for edits that do not name one",
            false,
        ))
        .with_parameter(
            ToolParameter::new(
                "edits",
                "List of {path?, old_string, new_string, replace_all?} objects",
                true,
            )
            .with_items(json!({"type": "object"})),
        )
    }

    async fn call(&self, invocation: &ToolInvocation) -> Result<Value, ToolError> {
        let plan = self.plan(invocation)?;

        // Every edit is applied in memory before anything is confirmed or written.
        let mut staged: Vec<(PathBuf, String, String)> = Vec::new();
        for (path, edits) in &plan {
            let target = resolve_path(&self.guard, path)?;
            if !target.is_file() {
                return Ok(ToolResult::failure(format!(
                    "File not found: {path}. No files were changed."
                ))
                .into());
            }
            let mut content = fs::read_to_string(&target).await?;
            for (i, edit) in edits.iter().enumerate() {
                match apply_edit(&content, edit) {
                    Ok(updated) => content = updated,
                    Err(reason) => {
                        return Ok(ToolResult::failure(format!(
                            "Edit {} on {path} failed: {reason} No files were changed.",
                            i + 1
                        ))
                        .into())
                    }
                }
            }
            let rel = self.guard.relative(&target);
            staged.push((target, rel, content));
        }

        let mut edited = Vec::new();
        let mut declined = Vec::new();
        for (target, rel, content) in staged {
            if !self
                .gate
                .confirm(DestructiveAction::MultiEdit, &rel)
                .await
                .is_approved()
            {
                declined.push(rel);
                continue;
            }
            write_atomic(&target, &content).await?;
            edited.push(rel);
        }

        if edited.is_empty() {
            return Ok(ToolResult::failure("Multi-edit cancelled.")
                .with_meta("declined", json!(declined))
                .into());
        }
        info!(files = edited.len(), "Applied multi-edit");
        Ok(ToolResult::ok(format!("Edited {}", edited.join(", ")))
            .with_meta("edited", json!(edited))
            .with_meta("declined", json!(declined))
            .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support;
    use std::fs as stdfs;

    fn edit(old: &str, new: &str, all: bool) -> Edit {
        Edit {
            old_string: old.into(),
            new_string: new.into(),
            replace_all: all,
        }
    }

    #[test]
    fn test_apply_exact() {
        assert_eq!(
            apply_edit("let x = 1;", &edit("1", "2", false)).unwrap(),
            "let x = 2;"
        );
    }

    #[test]
    fn test_apply_empty_old_string_replaces_everything() {
        assert_eq!(apply_edit("old body", &edit("", "new", false)).unwrap(), "new");
    }

    #[test]
    fn test_apply_ambiguous_without_replace_all() {
        let err = apply_edit("a a a", &edit("a", "b", false)).unwrap_err();
        assert!(err.contains("3 occurrences"));
        assert_eq!(apply_edit("a a a", &edit("a", "b", true)).unwrap(), "b b b");
    }

    #[test]
    fn test_apply_whitespace_tolerant_fallback() {
        let content = "fn main() {\n    println!(\"hi\");\n}\n";
        let updated = apply_edit(content, &edit("fn main()   {", "fn start() {", false)).unwrap();
        assert!(updated.starts_with("fn start() {\n"));
    }

    #[test]
    fn test_apply_replacement_is_literal() {
        assert_eq!(
            apply_edit("price  tag", &edit("price tag", "$1 off", false)).unwrap(),
            "$1 off"
        );
    }

    #[test]
    fn test_apply_not_found() {
        let err = apply_edit("hello", &edit("goodbye", "x", false)).unwrap_err();
        assert_eq!(err, "Text 'goodbye' not found in file.");
    }

    #[tokio::test]
    async fn test_edit_file_is_not_gated() {
        let (temp, ctx, confirmer) = test_support::context(&[]);
        stdfs::write(temp.path().join("a.rs"), "let x = 1;").unwrap();
        let tool = EditFileTool::new(&ctx);

        let inv = ToolInvocation::new("edit_file")
            .with_arg("a.rs")
            .with_kwarg("old_string", "1")
            .with_kwarg("new_string", "2");
        let res = ToolResult::from_raw(tool.call(&inv).await.unwrap());
        assert!(res.success);
        assert_eq!(res.output, json!("Edited a.rs"));
        assert_eq!(stdfs::read_to_string(temp.path().join("a.rs")).unwrap(), "let x = 2;");
        assert!(confirmer.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_multi_edit_is_all_or_nothing() {
        let (temp, ctx, confirmer) = test_support::context(&[true, true]);
        stdfs::write(temp.path().join("a.txt"), "alpha").unwrap();
        stdfs::write(temp.path().join("b.txt"), "beta").unwrap();
        let tool = MultiEditTool::new(&ctx);

        let inv = ToolInvocation::new("multi_edit").with_kwarg(
            "edits",
            json!([
                {"path": "a.txt", "old_string": "alpha", "new_string": "ALPHA"},
                {"path": "b.txt", "old_string": "missing", "new_string": "x"}
            ]),
        );
        let res = ToolResult::from_raw(tool.call(&inv).await.unwrap());
        assert!(!res.success);
        assert!(res.output_text().contains("No files were changed"));
        assert_eq!(stdfs::read_to_string(temp.path().join("a.txt")).unwrap(), "alpha");
        assert!(confirmer.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_multi_edit_asks_once_per_path() {
        let (temp, ctx, confirmer) = test_support::context(&[true, false]);
        stdfs::write(temp.path().join("a.txt"), "one two").unwrap();
        stdfs::write(temp.path().join("b.txt"), "three").unwrap();
        let tool = MultiEditTool::new(&ctx);

        let inv = ToolInvocation::new("multi_edit")
            .with_arg("a.txt")
            .with_kwarg(
                "edits",
                json!([
                    {"old_string": "one", "new_string": "1"},
                    {"old_string": "two", "new_string": "2"},
                    {"path": "b.txt", "old_string": "three", "new_string": "3"}
                ]),
            );
        let res = ToolResult::from_raw(tool.call(&inv).await.unwrap());
        assert!(res.success);
        assert_eq!(res.meta["edited"], json!(["a.txt"]));
        assert_eq!(res.meta["declined"], json!(["b.txt"]));
        assert_eq!(stdfs::read_to_string(temp.path().join("a.txt")).unwrap(), "1 2");
        assert_eq!(stdfs::read_to_string(temp.path().join("b.txt")).unwrap(), "three");
        assert_eq!(
            confirmer.prompts(),
            vec![
                "Apply edits to 'a.txt'? (y/n) ".to_string(),
                "Apply edits to 'b.txt'? (y/n) ".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_multi_edit_all_declined() {
        let (temp, ctx, _) = test_support::context(&[false]);
        stdfs::write(temp.path().join("a.txt"), "x").unwrap();
        let tool = MultiEditTool::new(&ctx);

        let inv = ToolInvocation::new("multi_edit").with_kwarg(
            "edits",
            json!([{"path": "a.txt", "old_string": "x", "new_string": "y"}]),
        );
        let res = ToolResult::from_raw(tool.call(&inv).await.unwrap());
        assert_eq!(res.output, json!("Multi-edit cancelled."));
        assert_eq!(stdfs::read_to_string(temp.path().join("a.txt")).unwrap(), "x");
    }

    #[tokio::test]
    async fn test_multi_edit_requires_edits() {
        let (_temp, ctx, _) = test_support::context(&[]);
        let tool = MultiEditTool::new(&ctx);
        let err = tool
            .call(&ToolInvocation::new("multi_edit").with_arg("a.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::MissingParameter(_)));
    }
}
