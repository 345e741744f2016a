//! Filesystem tools: read, write, list and delete.
//!
//! Every path goes through the [`WorkspaceGuard`] before any I/O. Writes are
//! atomic (temp file in the same directory, then rename) and overwrites and
//! deletes go through the confirmation gate.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::fs;
use tracing::{debug, info, warn};

use sdk::{ParamType, Tool, ToolError, ToolInvocation, ToolParameter, ToolResult, ToolSchema};

use super::{
    glob_entries_in_workspace, glob_in_workspace, is_glob_pattern, resolve_path, ToolContext,
    DEFAULT_IGNORE_DIRS,
};
use crate::confirmation::{ConfirmationGate, DestructiveAction};
use crate::fs_guard::WorkspaceGuard;

/// Write `content` to `path` via a sibling temp file and a rename.
pub(crate) async fn write_atomic(path: &Path, content: &str) -> Result<(), ToolError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    let tmp = path.with_file_name(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4()));

    fs::write(&tmp, content).await?;
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

fn window(content: &str, offset: Option<i64>, limit: Option<i64>) -> String {
    if offset.is_none() && limit.is_none() {
        return content.to_string();
    }
    let start = offset.unwrap_or(0).max(0) as usize;
    let lines = content.split_inclusive('\n').skip(start);
    match limit {
        Some(limit) => lines.take(limit.max(0) as usize).collect(),
        None => lines.collect(),
    }
}

pub struct ReadFileTool {
    guard: Arc<WorkspaceGuard>,
}

impl ReadFileTool {
    pub fn new(ctx: &ToolContext) -> Self {
        Self {
            guard: Arc::clone(&ctx.guard),
        }
    }

    /// A missing relative path is retried once as `**/<path>`; a single
    /// match is used, several are ambiguous.
    fn locate(&self, path: &str) -> Result<Option<PathBuf>, ToolError> {
        let resolved = resolve_path(&self.guard, path)?;
        if resolved.is_file() {
            return Ok(Some(resolved));
        }
        if Path::new(path).is_absolute() || resolved.exists() {
            return Ok(None);
        }

        let pattern = format!("**/{}", glob::Pattern::escape(path.trim_start_matches("./")));
        let found: Vec<PathBuf> = glob_in_workspace(&self.guard, &pattern)?
            .into_iter()
            .filter(|p| p.is_file())
            .collect();
        match found.as_slice() {
            [single] => {
                debug!(requested = path, found = %single.display(), "Resolved read by search");
                Ok(Some(single.clone()))
            }
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "read_file",
            "Read the contents of a file in the workspace. Use this to examine code, configuration, or any text file.",
        )
        .with_parameter(ToolParameter::new(
            "path",
            "Relative path to the file from workspace root",
            true,
        ))
        .with_parameter(
            ToolParameter::new("offset", "Line number to start reading from (0-based)", false)
                .with_type(ParamType::Integer),
        )
        .with_parameter(
            ToolParameter::new("limit", "Maximum number of lines to read", false)
                .with_type(ParamType::Integer),
        )
    }

    fn read_only(&self) -> bool {
        true
    }

    async fn call(&self, invocation: &ToolInvocation) -> Result<Value, ToolError> {
        let path = invocation.require_str(0, "path")?;
        let offset = invocation.i64_param(1, "offset")?;
        let limit = invocation.i64_param(2, "limit")?;

        let Some(target) = self.locate(&path)? else {
            return Ok(ToolResult::failure(format!("File not found: {path}")).into());
        };

        let bytes = fs::read(&target).await?;
        let content = String::from_utf8_lossy(&bytes);
        debug!("Read {} bytes from {}", bytes.len(), target.display());

        Ok(ToolResult::ok(window(&content, offset, limit))
            .with_meta("path", self.guard.relative(&target))
            .into())
    }
}

pub struct WriteFileTool {
    guard: Arc<WorkspaceGuard>,
    gate: ConfirmationGate,
}

impl WriteFileTool {
    pub fn new(ctx: &ToolContext) -> Self {
        Self {
            guard: Arc::clone(&ctx.guard),
            gate: ctx.gate.clone(),
        }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "write_file",
            "Create a new file or overwrite an existing file with content. Parent directories are created.",
        )
        .with_parameter(ToolParameter::new("path", "Path where the file should be written", true))
        .with_parameter(ToolParameter::new("content", "Content to write to the file", true))
    }

    async fn call(&self, invocation: &ToolInvocation) -> Result<Value, ToolError> {
        let path = invocation.require_str(0, "path")?;
        let content = match invocation.kwargs.get("content") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => invocation
                .args
                .iter()
                .skip(1)
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(" "),
            Some(other) => other.to_string(),
        };

        let target = resolve_path(&self.guard, &path)?;
        let rel = self.guard.relative(&target);
        if target.is_dir() {
            return Ok(ToolResult::failure(format!("Cannot write to directory: {rel}")).into());
        }
        if target.exists()
            && !self
                .gate
                .confirm(DestructiveAction::Overwrite, &rel)
                .await
                .is_approved()
        {
            return Ok(ToolResult::failure("Write cancelled.").into());
        }

        write_atomic(&target, &content).await?;
        info!("Wrote {} bytes to {}", content.len(), rel);

        Ok(ToolResult::ok(format!("Wrote to {rel}"))
            .with_meta("bytes", content.len())
            .into())
    }
}

/// Options of one `list_files` call
#[derive(Debug, Clone)]
struct ListOptions {
    depth: Option<usize>,
    show_hidden: bool,
    names_only: bool,
    dirs_only: bool,
    ignore: HashSet<String>,
}

pub struct ListFilesTool {
    guard: Arc<WorkspaceGuard>,
}

impl ListFilesTool {
    pub fn new(ctx: &ToolContext) -> Self {
        Self {
            guard: Arc::clone(&ctx.guard),
        }
    }
}

/// Simple directory names from `.gitignore`: no globs, no slashes.
fn gitignore_names(dir: &Path) -> Vec<String> {
    std::fs::read_to_string(dir.join(".gitignore"))
        .map(|text| {
            text.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .filter(|l| !l.contains('/') && !l.contains('*'))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn walk(base: &Path, opts: &ListOptions) -> Vec<String> {
    let mut out = Vec::new();
    let mut stack = vec![(base.to_path_buf(), 0usize)];

    while let Some((dir, depth)) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !opts.show_hidden && name.starts_with('.') {
                continue;
            }
            if opts.ignore.contains(&name) {
                continue;
            }
            let path = entry.path();
            // symlinks are listed, never followed
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            let rel = path
                .strip_prefix(base)
                .map(|r| r.to_string_lossy().replace('\\', "/"))
                .unwrap_or_else(|_| name.clone());

            if is_dir {
                if opts.dirs_only {
                    out.push(if opts.names_only {
                        format!("{name}/")
                    } else {
                        format!("{rel}/")
                    });
                }
                if opts.depth.map_or(true, |max| depth + 1 < max) {
                    stack.push((path, depth + 1));
                }
            } else if !opts.dirs_only {
                out.push(if opts.names_only { name } else { rel });
            }
        }
    }

    out.sort();
    if opts.names_only {
        out.dedup();
    }
    out
}

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "list_files",
            "List files in a directory of the workspace, skipping VCS, dependency and build directories.",
        )
        .with_parameter(ToolParameter::new("path", "Directory to list (default: workspace root)", false))
        .with_parameter(
            ToolParameter::new("depth", "Maximum directory depth to descend", false)
                .with_type(ParamType::Integer),
        )
        .with_parameter(
            ToolParameter::new("recursive", "Descend into subdirectories (default true)", false)
                .with_type(ParamType::Boolean),
        )
        .with_parameter(
            ToolParameter::new("show_hidden", "Include dot files", false)
                .with_type(ParamType::Boolean),
        )
        .with_parameter(
            ToolParameter::new("names_only", "Return bare names instead of relative paths", false)
                .with_type(ParamType::Boolean),
        )
        .with_parameter(
            ToolParameter::new("dirs_only", "List directories instead of files", false)
                .with_type(ParamType::Boolean),
        )
        .with_parameter(
            ToolParameter::new("files_only", "List files only (the default)", false)
                .with_type(ParamType::Boolean),
        )
    }

    fn read_only(&self) -> bool {
        true
    }

    async fn call(&self, invocation: &ToolInvocation) -> Result<Value, ToolError> {
        let path = invocation
            .str_param(0, "path")
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| ".".to_string());
        let base = resolve_path(&self.guard, &path)?;
        if !base.exists() {
            return Ok(ToolResult::failure(format!("Path not found: {path}")).into());
        }
        if !base.is_dir() {
            return Ok(ToolResult::failure(format!("Not a directory: {path}")).into());
        }

        let recursive = invocation
            .kwargs
            .get("recursive")
            .map_or(true, |_| invocation.flag("recursive"));
        let depth = match invocation.i64_param(1, "depth")? {
            Some(d) if d < 1 => {
                return Err(ToolError::InvalidParameter("depth must be at least 1".into()))
            }
            Some(d) => Some(d as usize),
            None => None,
        };

        let mut ignore: HashSet<String> =
            DEFAULT_IGNORE_DIRS.iter().map(|s| s.to_string()).collect();
        ignore.extend(gitignore_names(&base));
        if let Some(Value::Array(extra)) = invocation.kwargs.get("ignore") {
            ignore.extend(extra.iter().filter_map(|v| v.as_str().map(str::to_string)));
        }

        let opts = ListOptions {
            depth: if recursive { depth } else { Some(1) },
            show_hidden: invocation.flag("show_hidden"),
            names_only: invocation.flag("names_only"),
            dirs_only: invocation.flag("dirs_only") && !invocation.flag("files_only"),
            ignore,
        };

        let entries = tokio::task::spawn_blocking(move || walk(&base, &opts))
            .await
            .map_err(|e| ToolError::Execution(e.to_string()))?;

        Ok(ToolResult::ok(json!(entries))
            .with_meta("count", entries.len())
            .into())
    }
}

pub struct DeleteFileTool {
    guard: Arc<WorkspaceGuard>,
    gate: ConfirmationGate,
}

impl DeleteFileTool {
    pub fn new(ctx: &ToolContext) -> Self {
        Self {
            guard: Arc::clone(&ctx.guard),
            gate: ctx.gate.clone(),
        }
    }

    fn targets(&self, pattern: &str) -> Result<Vec<PathBuf>, ToolError> {
        if is_glob_pattern(pattern) {
            return glob_entries_in_workspace(&self.guard, pattern);
        }
        // A trailing symlink names the link, never its target
        let resolved = self
            .guard
            .resolve_entry(pattern)
            .map_err(|e| ToolError::PathRejected(e.to_string()))?;
        if resolved.symlink_metadata().is_ok() {
            Ok(vec![resolved])
        } else {
            Ok(Vec::new())
        }
    }
}

#[async_trait]
impl Tool for DeleteFileTool {
    fn name(&self) -> &str {
        "delete_file"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "delete_file",
            "Delete a file or directory in the workspace. Glob patterns delete every match.",
        )
        .with_parameter(ToolParameter::new(
            "path",
            "Path or glob pattern of what to delete",
            true,
        ))
    }

    async fn call(&self, invocation: &ToolInvocation) -> Result<Value, ToolError> {
        let pattern = invocation.require_str(0, "path")?;
        let targets = self.targets(&pattern)?;
        if targets.is_empty() {
            return Ok(ToolResult::failure(format!("No matches found for '{pattern}'.")).into());
        }

        let mut deleted = Vec::new();
        let mut declined = Vec::new();
        let mut failed = Vec::new();
        let mut removed: Vec<PathBuf> = Vec::new();
        for target in targets {
            let rel = self.guard.relative(&target);
            if target == self.guard.root() {
                return Ok(ToolResult::failure("Refusing to delete the workspace root.").into());
            }
            // Already gone with a directory removed earlier in this call
            if removed.iter().any(|dir| target.starts_with(dir)) {
                continue;
            }
            let Ok(metadata) = target.symlink_metadata() else {
                continue;
            };
            if !self
                .gate
                .confirm(DestructiveAction::Delete, &rel)
                .await
                .is_approved()
            {
                declined.push(rel);
                continue;
            }

            let outcome = if metadata.is_dir() {
                fs::remove_dir_all(&target).await
            } else {
                fs::remove_file(&target).await
            };
            match outcome {
                Ok(()) => {
                    info!("Deleted {}", rel);
                    deleted.push(rel);
                    removed.push(target);
                }
                Err(e) => {
                    warn!("Failed to delete {}: {}", rel, e);
                    failed.push(json!({"path": rel, "error": e.to_string()}));
                }
            }
        }

        if deleted.is_empty() {
            let result = if failed.is_empty() {
                ToolResult::failure("Deletion cancelled.")
            } else {
                ToolResult::failure("Nothing could be deleted.")
            };
            return Ok(result
                .with_meta("declined", json!(declined))
                .with_meta("failed", json!(failed))
                .into());
        }

        let mut output = format!("Deleted: {}", deleted.join(", "));
        if !declined.is_empty() {
            output.push_str(&format!(" (skipped: {})", declined.join(", ")));
        }
        if !failed.is_empty() {
            output.push_str(&format!(" ({} failed)", failed.len()));
        }
        Ok(ToolResult::ok(output)
            .with_meta("deleted", json!(deleted))
            .with_meta("declined", json!(declined))
            .with_meta("failed", json!(failed))
            .into())
    }
}
