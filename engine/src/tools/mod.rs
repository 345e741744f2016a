pub mod dispatcher;
pub mod editor;
pub mod filesystem;
pub mod normalizer;
pub mod search;
pub mod terminal;
pub mod todo;
pub mod web;

pub use dispatcher::Dispatcher;
pub use normalizer::{normalize, Rejection};

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sdk::{Tool, ToolError, ToolParameter, ToolSchema};
use tracing::debug;

use crate::confirmation::{ConfirmationGate, DestructiveAction};
use crate::fs_guard::WorkspaceGuard;

/// Sentinel action the model calls to finish a task. Never dispatched.
pub const TASK_COMPLETE: &str = "task_complete";

/// Legacy short names accepted from the model and from typed commands.
const ALIASES: &[(&str, &str)] = &[
    ("read", "read_file"),
    ("write", "write_file"),
    ("edit", "edit_file"),
    ("multiedit", "multi_edit"),
    ("delete", "delete_file"),
    ("ls", "list_files"),
    ("glob", "find_files"),
    ("search", "grep"),
    ("bash", "run_command"),
    ("shell", "run_command"),
    ("todowrite", "manage_todos"),
    ("todo", "manage_todos"),
    ("webfetch", "fetch_url"),
    ("websearch", "search_web"),
];

/// Per-tool settings taken from config.
#[derive(Debug, Clone)]
pub struct ToolSettings {
    pub shell_timeout_ms: u64,
    pub disallowed_commands: Vec<String>,
    pub fetch_max_chars: usize,
    pub todos_path: PathBuf,
    pub http_timeout_secs: u64,
    pub search_endpoint: String,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            shell_timeout_ms: 120_000,
            disallowed_commands: crate::command_executor::DEFAULT_DISALLOWED_COMMANDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            fetch_max_chars: 20_000,
            todos_path: PathBuf::from("todos.json"),
            http_timeout_secs: 10,
            search_endpoint: web::DUCKDUCKGO_HTML_URL.to_string(),
        }
    }
}

/// Everything a built-in tool needs, constructed once at startup.
#[derive(Clone)]
pub struct ToolContext {
    pub guard: Arc<WorkspaceGuard>,
    pub gate: ConfirmationGate,
    pub settings: ToolSettings,
}

impl ToolContext {
    pub fn new(guard: WorkspaceGuard, gate: ConfirmationGate, settings: ToolSettings) -> Self {
        Self {
            guard: Arc::new(guard),
            gate,
            settings,
        }
    }
}

/// Registry of available tools: canonical name -> implementation, plus the
/// alias table. The registry is the allow-list; anything it cannot resolve
/// is rejected.
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
    aliases: HashMap<String, String>,
}

impl ToolRegistry {
    /// Create an empty registry with no tools enabled.
    pub fn empty() -> Self {
        Self {
            tools: BTreeMap::new(),
            aliases: HashMap::new(),
        }
    }

    /// Registry with every built-in tool and the legacy aliases.
    pub fn builtin(ctx: &ToolContext) -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(filesystem::ReadFileTool::new(ctx)));
        registry.register(Arc::new(filesystem::WriteFileTool::new(ctx)));
        registry.register(Arc::new(filesystem::ListFilesTool::new(ctx)));
        registry.register(Arc::new(filesystem::DeleteFileTool::new(ctx)));
        registry.register(Arc::new(editor::EditFileTool::new(ctx)));
        registry.register(Arc::new(editor::MultiEditTool::new(ctx)));
        registry.register(Arc::new(search::FindFilesTool::new(ctx)));
        registry.register(Arc::new(search::GrepTool::new(ctx)));
        registry.register(Arc::new(terminal::RunCommandTool::new(ctx)));
        registry.register(Arc::new(todo::ManageTodosTool::new(ctx)));
        registry.register(Arc::new(web::FetchUrlTool::new(ctx)));
        registry.register(Arc::new(web::SearchWebTool::new(ctx)));

        for (alias, canonical) in ALIASES {
            registry.alias(alias, canonical);
        }
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        debug!("Registering tool '{}'", tool.name());
        self.tools.insert(tool.name().to_ascii_lowercase(), tool);
    }

    pub fn alias(&mut self, alias: &str, canonical: &str) {
        self.aliases
            .insert(alias.to_ascii_lowercase(), canonical.to_ascii_lowercase());
    }

    /// Resolve a (case-insensitive) name or alias to its canonical name.
    /// `task_complete` always resolves.
    pub fn resolve_name(&self, name: &str) -> Option<String> {
        let lowered = name.trim().to_ascii_lowercase();
        if lowered == TASK_COMPLETE || self.tools.contains_key(&lowered) {
            return Some(lowered);
        }
        self.aliases
            .get(&lowered)
            .filter(|canonical| self.tools.contains_key(*canonical))
            .cloned()
    }

    pub fn get(&self, canonical: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(canonical).map(Arc::clone)
    }

    /// Canonical names, sorted
    pub fn available_tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// Every name the normalizer accepts as a first word of a typed command.
    pub fn is_known_name(&self, word: &str) -> bool {
        let lowered = word.to_ascii_lowercase();
        lowered != TASK_COMPLETE && self.resolve_name(&lowered).is_some()
    }

    /// Schemas of all tools plus the `task_complete` sentinel.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self.tools.values().map(|t| t.schema()).collect();
        schemas.push(task_complete_schema());
        schemas
    }

    /// Plain-text listing of the tools for the task framing.
    pub fn tool_listing(&self) -> String {
        let mut lines = Vec::new();
        for schema in self.schemas() {
            let gated = if DestructiveAction::for_tool(&schema.name).is_some() {
                " [asks for confirmation]"
            } else {
                ""
            };
            lines.push(format!(
                "- {}: {}{}",
                schema.signature(),
                schema.description,
                gated
            ));
        }
        lines.join("\n")
    }
}

fn task_complete_schema() -> ToolSchema {
    ToolSchema::new(
        TASK_COMPLETE,
        "Call this when the task is fully done. Summarize what was accomplished.",
    )
    .with_parameter(ToolParameter::new(
        "summary",
        "Short summary of what was done",
        true,
    ))
}

/// Directory names skipped by listing, globbing and search
pub(crate) const DEFAULT_IGNORE_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "__pycache__",
    ".venv",
    ".env",
    ".cache",
    ".pytest_cache",
    "dist",
    "build",
];

/// True when `s` contains glob metacharacters
pub(crate) fn is_glob_pattern(s: &str) -> bool {
    s.contains(['*', '?', '['])
}

/// Resolve a tool path through the workspace guard.
pub(crate) fn resolve_path(guard: &WorkspaceGuard, path: &str) -> Result<PathBuf, ToolError> {
    guard
        .resolve(path)
        .map_err(|e| ToolError::PathRejected(e.to_string()))
}

/// Expand a glob relative to the workspace root. Matches the guard rejects
/// are dropped; results are sorted and deduplicated.
pub(crate) fn glob_in_workspace(
    guard: &WorkspaceGuard,
    pattern: &str,
) -> Result<Vec<PathBuf>, ToolError> {
    expand_glob(guard, pattern, |p| guard.resolve(p).ok())
}

/// Like [`glob_in_workspace`], but a matched symlink stays the link itself.
pub(crate) fn glob_entries_in_workspace(
    guard: &WorkspaceGuard,
    pattern: &str,
) -> Result<Vec<PathBuf>, ToolError> {
    expand_glob(guard, pattern, |p| guard.resolve_entry(p).ok())
}

fn expand_glob<F>(guard: &WorkspaceGuard, pattern: &str, resolve: F) -> Result<Vec<PathBuf>, ToolError>
where
    F: Fn(&Path) -> Option<PathBuf>,
{
    let full = if Path::new(pattern).is_absolute() {
        pattern.to_string()
    } else {
        let root = glob::Pattern::escape(&guard.root().to_string_lossy());
        format!("{}/{}", root.trim_end_matches('/'), pattern)
    };

    let entries = glob::glob(&full)
        .map_err(|e| ToolError::InvalidParameter(format!("bad glob pattern '{pattern}': {e}")))?;

    let mut matches: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter_map(|p| resolve(&p))
        .filter(|p| p != guard.root())
        .collect();
    matches.sort();
    matches.dedup();
    Ok(matches)
}

/// True when any component of `rel` is an ignored directory name
pub(crate) fn in_ignored_dir(rel: &Path, ignore: &[&str]) -> bool {
    rel.components().any(|c| {
        c.as_os_str()
            .to_str()
            .is_some_and(|part| ignore.contains(&part))
    })
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry_resolves_aliases() {
        let (_temp, ctx, _) = test_support::context(&[]);
        let registry = ToolRegistry::builtin(&ctx);

        assert_eq!(registry.resolve_name("READ").as_deref(), Some("read_file"));
        assert_eq!(registry.resolve_name("ls").as_deref(), Some("list_files"));
        assert_eq!(registry.resolve_name("bash").as_deref(), Some("run_command"));
        assert_eq!(registry.resolve_name("grep").as_deref(), Some("grep"));
        assert_eq!(
            registry.resolve_name("task_complete").as_deref(),
            Some("task_complete")
        );
        assert_eq!(registry.resolve_name("frobnicate"), None);
    }

    #[test]
    fn test_empty_registry_rejects_aliases() {
        let mut registry = ToolRegistry::empty();
        registry.alias("read", "read_file");
        assert_eq!(registry.resolve_name("read"), None);
    }

    #[test]
    fn test_schemas_cover_every_tool() {
        let (_temp, ctx, _) = test_support::context(&[]);
        let registry = ToolRegistry::builtin(&ctx);
        let schemas = registry.schemas();

        assert_eq!(schemas.len(), registry.available_tool_names().len() + 1);
        for name in registry.available_tool_names() {
            let schema = schemas.iter().find(|s| s.name == name).unwrap();
            assert!(!schema.description.is_empty(), "{name} needs a description");
        }
        assert!(schemas.iter().any(|s| s.name == TASK_COMPLETE));
    }

    #[test]
    fn test_tool_listing_marks_gated_tools() {
        let (_temp, ctx, _) = test_support::context(&[]);
        let listing = ToolRegistry::builtin(&ctx).tool_listing();
        assert!(listing.contains("- delete_file(path): "));
        assert!(listing
            .lines()
            .any(|l| l.starts_with("- run_command") && l.ends_with("[asks for confirmation]")));
        assert!(listing
            .lines()
            .any(|l| l.starts_with("- read_file") && !l.contains("confirmation")));
    }

    #[test]
    fn test_known_names_for_typed_commands() {
        let (_temp, ctx, _) = test_support::context(&[]);
        let registry = ToolRegistry::builtin(&ctx);
        assert!(registry.is_known_name("read"));
        assert!(registry.is_known_name("Grep"));
        assert!(!registry.is_known_name("task_complete"));
        assert!(!registry.is_known_name("please"));
    }

    #[test]
    fn test_is_glob_pattern() {
        assert!(is_glob_pattern("*.txt"));
        assert!(is_glob_pattern("src/**/mod.rs"));
        assert!(is_glob_pattern("file[0-9].txt"));
        assert!(!is_glob_pattern("src/main.rs"));
    }
}
