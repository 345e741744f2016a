//! Workspace search: glob file discovery and regex content search.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use regex::RegexBuilder;
use serde_json::{json, Value};
use tracing::debug;

use sdk::{ParamType, Tool, ToolError, ToolInvocation, ToolParameter, ToolResult, ToolSchema};

use super::{glob_in_workspace, in_ignored_dir, ToolContext, DEFAULT_IGNORE_DIRS};
use crate::fs_guard::WorkspaceGuard;

/// Cap on `find_files` results
const MAX_RESULTS: usize = 1000;

/// Files larger than this are not searched
const MAX_GREP_FILE_BYTES: u64 = 5 * 1024 * 1024;

const DEFAULT_HEAD_LIMIT: usize = 50;

fn relative_to(guard: &WorkspaceGuard, path: &Path) -> Option<PathBuf> {
    path.strip_prefix(guard.root()).ok().map(Path::to_path_buf)
}

pub struct FindFilesTool {
    guard: Arc<WorkspaceGuard>,
}

impl FindFilesTool {
    pub fn new(ctx: &ToolContext) -> Self {
        Self {
            guard: Arc::clone(&ctx.guard),
        }
    }
}

#[async_trait]
impl Tool for FindFilesTool {
    fn name(&self) -> &str {
        "find_files"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "find_files",
            "Find files using glob patterns. Use for finding specific file types or names.",
        )
        .with_parameter(ToolParameter::new(
            "pattern",
            "Glob pattern, e.g. '**/*.rs' (default: '**/*')",
            false,
        ))
    }

    fn read_only(&self) -> bool {
        true
    }

    async fn call(&self, invocation: &ToolInvocation) -> Result<Value, ToolError> {
        let pattern = invocation
            .str_param(0, "pattern")
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| "**/*".to_string());

        let guard = Arc::clone(&self.guard);
        let glob_pattern = pattern.clone();
        let matches = tokio::task::spawn_blocking(move || {
            glob_in_workspace(&guard, &glob_pattern).map(|paths| {
                paths
                    .iter()
                    .filter(|p| {
                        relative_to(&guard, p)
                            .is_some_and(|rel| !in_ignored_dir(&rel, DEFAULT_IGNORE_DIRS))
                    })
                    .map(|p| guard.relative(p))
                    .collect::<Vec<_>>()
            })
        })
        .await
        .map_err(|e| ToolError::Execution(e.to_string()))??;

        let total = matches.len();
        let truncated = total > MAX_RESULTS;
        let shown: Vec<String> = matches.into_iter().take(MAX_RESULTS).collect();
        debug!(pattern = %pattern, total, "find_files");

        Ok(ToolResult::ok(json!(shown))
            .with_meta("count", total)
            .with_meta("truncated", truncated)
            .into())
    }
}

/// What `grep` reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Content,
    FilesWithMatches,
    Count,
}

impl OutputMode {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "content" => Some(Self::Content),
            "files_with_matches" | "files" => Some(Self::FilesWithMatches),
            "count" => Some(Self::Count),
            _ => None,
        }
    }
}

pub struct GrepTool {
    guard: Arc<WorkspaceGuard>,
}

impl GrepTool {
    pub fn new(ctx: &ToolContext) -> Self {
        Self {
            guard: Arc::clone(&ctx.guard),
        }
    }
}

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &str {
        "grep"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "grep",
            "Search for text patterns across files using regular expressions.",
        )
        .with_parameter(ToolParameter::new("pattern", "Search pattern (regex)", true))
        .with_parameter(ToolParameter::new(
            "path_pattern",
            "Glob selecting the files to search (default: '**/*')",
            false,
        ))
        .with_parameter(ToolParameter::new(
            "output_mode",
            "'content' (default), 'files_with_matches' or 'count'",
            false,
        ))
        .with_parameter(
            ToolParameter::new("head_limit", "Maximum number of results (default 50)", false)
                .with_type(ParamType::Integer),
        )
        .with_parameter(
            ToolParameter::new("case_insensitive", "Ignore case", false)
                .with_type(ParamType::Boolean),
        )
    }

    fn read_only(&self) -> bool {
        true
    }

    async fn call(&self, invocation: &ToolInvocation) -> Result<Value, ToolError> {
        let pattern = invocation.require_str(0, "pattern")?;
        let path_pattern = invocation
            .str_param(1, "path_pattern")
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| "**/*".to_string());
        let mode_name = invocation
            .str_param(2, "output_mode")
            .unwrap_or_else(|| "content".to_string());
        let Some(mode) = OutputMode::parse(&mode_name) else {
            return Err(ToolError::InvalidParameter(format!(
                "output_mode must be content, files_with_matches or count, got '{mode_name}'"
            )));
        };
        let head_limit = match invocation.i64_param(3, "head_limit")? {
            Some(n) if n > 0 => n as usize,
            Some(_) => return Err(ToolError::InvalidParameter("head_limit must be positive".into())),
            None => DEFAULT_HEAD_LIMIT,
        };

        let regex = match RegexBuilder::new(&pattern)
            .case_insensitive(invocation.flag("case_insensitive"))
            .build()
        {
            Ok(r) => r,
            Err(e) => return Ok(ToolResult::failure(format!("Invalid regex: {e}")).into()),
        };

        let guard = Arc::clone(&self.guard);
        let files = tokio::task::spawn_blocking(move || -> Result<_, ToolError> {
            let candidates = glob_in_workspace(&guard, &path_pattern)?;
            let mut hits: Vec<(String, usize, String)> = Vec::new();
            for path in candidates {
                let Some(rel) = relative_to(&guard, &path) else {
                    continue;
                };
                if in_ignored_dir(&rel, DEFAULT_IGNORE_DIRS) {
                    continue;
                }
                let Ok(meta) = path.metadata() else {
                    continue;
                };
                if !meta.is_file() || meta.len() > MAX_GREP_FILE_BYTES {
                    continue;
                }
                let Ok(bytes) = std::fs::read(&path) else {
                    continue;
                };
                let text = String::from_utf8_lossy(&bytes);
                let display = guard.relative(&path);
                for (i, line) in text.lines().enumerate() {
                    if regex.is_match(line) {
                        hits.push((display.clone(), i + 1, line.trim().to_string()));
                    }
                }
            }
            Ok(hits)
        })
        .await
        .map_err(|e| ToolError::Execution(e.to_string()))??;

        let total = files.len();
        let output = match mode {
            OutputMode::Content => json!(files
                .iter()
                .take(head_limit)
                .map(|(file, line_number, line)| json!({
                    "file": file,
                    "line_number": line_number,
                    "line": line,
                }))
                .collect::<Vec<_>>()),
            OutputMode::FilesWithMatches => {
                let mut names: Vec<&String> = files.iter().map(|(f, _, _)| f).collect();
                names.dedup();
                json!(names.into_iter().take(head_limit).collect::<Vec<_>>())
            }
            OutputMode::Count => {
                let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
                for (file, _, _) in &files {
                    *counts.entry(file.as_str()).or_default() += 1;
                }
                json!(counts)
            }
        };

        Ok(ToolResult::ok(output)
            .with_meta("total_matches", total)
            .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support;
    use std::fs as stdfs;

    fn populate(root: &Path) {
        stdfs::create_dir_all(root.join("src")).unwrap();
        stdfs::create_dir_all(root.join("node_modules/dep")).unwrap();
        stdfs::write(root.join("src/main.rs"), "fn main() {\n    todo!()\n}\n").unwrap();
        stdfs::write(root.join("src/lib.rs"), "// TODO one\n// todo two\n").unwrap();
        stdfs::write(root.join("node_modules/dep/index.js"), "// TODO vendored\n").unwrap();
        stdfs::write(root.join("README.md"), "readme\n").unwrap();
    }

    #[tokio::test]
    async fn test_find_files_sorted_and_filtered() {
        let (temp, ctx, _) = test_support::context(&[]);
        populate(temp.path());
        let tool = FindFilesTool::new(&ctx);

        let res = ToolResult::from_raw(
            tool.call(&ToolInvocation::new("find_files").with_arg("**/*.rs"))
                .await
                .unwrap(),
        );
        assert_eq!(res.output, json!(["src/lib.rs", "src/main.rs"]));
        assert_eq!(res.meta["count"], json!(2));
    }

    #[tokio::test]
    async fn test_find_files_default_pattern_skips_ignored_dirs() {
        let (temp, ctx, _) = test_support::context(&[]);
        populate(temp.path());
        let tool = FindFilesTool::new(&ctx);

        let res = ToolResult::from_raw(tool.call(&ToolInvocation::new("find_files")).await.unwrap());
        let listed = res.output.as_array().unwrap();
        assert!(listed.contains(&json!("README.md")));
        assert!(listed.iter().all(|v| !v.as_str().unwrap().starts_with("node_modules")));
    }

    #[tokio::test]
    async fn test_find_files_cannot_escape() {
        let (_temp, ctx, _) = test_support::context(&[]);
        let tool = FindFilesTool::new(&ctx);
        let res = ToolResult::from_raw(
            tool.call(&ToolInvocation::new("find_files").with_arg("../*"))
                .await
                .unwrap(),
        );
        assert_eq!(res.output, json!([]));
    }

    #[tokio::test]
    async fn test_grep_content_mode() {
        let (temp, ctx, _) = test_support::context(&[]);
        populate(temp.path());
        let tool = GrepTool::new(&ctx);

        let res = ToolResult::from_raw(
            tool.call(&ToolInvocation::new("grep").with_arg("TODO"))
                .await
                .unwrap(),
        );
        assert_eq!(
            res.output,
            json!([{"file": "src/lib.rs", "line_number": 1, "line": "// TODO one"}])
        );
    }

    #[tokio::test]
    async fn test_grep_case_insensitive_and_count() {
        let (temp, ctx, _) = test_support::context(&[]);
        populate(temp.path());
        let tool = GrepTool::new(&ctx);

        let inv = ToolInvocation::new("grep")
            .with_arg("todo")
            .with_kwarg("case_insensitive", true)
            .with_kwarg("output_mode", "count");
        let res = ToolResult::from_raw(tool.call(&inv).await.unwrap());
        assert_eq!(res.output, json!({"src/lib.rs": 2, "src/main.rs": 1}));
    }

    #[tokio::test]
    async fn test_grep_files_with_matches_and_head_limit() {
        let (temp, ctx, _) = test_support::context(&[]);
        populate(temp.path());
        let tool = GrepTool::new(&ctx);

        let inv = ToolInvocation::new("grep")
            .with_arg("(?i)todo")
            .with_kwarg("path_pattern", "src/*.rs")
            .with_kwarg("output_mode", "files_with_matches")
            .with_kwarg("head_limit", 1);
        let res = ToolResult::from_raw(tool.call(&inv).await.unwrap());
        assert_eq!(res.output, json!(["src/lib.rs"]));
    }

    #[tokio::test]
    async fn test_grep_rejects_bad_input() {
        let (_temp, ctx, _) = test_support::context(&[]);
        let tool = GrepTool::new(&ctx);

        let bad_regex = ToolResult::from_raw(
            tool.call(&ToolInvocation::new("grep").with_arg("("))
                .await
                .unwrap(),
        );
        assert!(!bad_regex.success);

        let bad_mode = tool
            .call(
                &ToolInvocation::new("grep")
                    .with_arg("x")
                    .with_kwarg("output_mode", "lines"),
            )
            .await;
        assert!(matches!(bad_mode, Err(ToolError::InvalidParameter(_))));
    }
}
