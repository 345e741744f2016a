//! Configuration management
//!
//! Configuration is stored in TOML format at `~/.config/codegen/config.toml`.
//! Every key has a default, so a partial file (or none at all) loads.
//!
//! # Configuration Sections
//!
//! - **core**: Workspace root, log level, loop limits, history location
//! - **llm**: Model, endpoint and the env var holding the API key
//! - **tools**: Shell timeout, fetch limits, todo list location
//! - **security**: Auto-confirm and the disallowed command list
//!
//! # Load order
//!
//! 1. The TOML file (created with defaults when missing)
//! 2. Environment overrides: `CODEGEN_AUTO_CONFIRM`, `CODEGEN_HISTORY_PATH`,
//!    `CODEGEN_TODOS_PATH`
//! 3. Validation: log level, loop limits, `~` expansion, and workspace
//!    canonicalization
//!
//! # Examples
//!
//! ```no_run
//! use codegen_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("Workspace: {:?}", config.core.workspace);
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use sdk::errors::EngineError;

use crate::agent::LoopSettings;
use crate::command_executor::DEFAULT_DISALLOWED_COMMANDS;
use crate::tools::ToolSettings;

pub const ENV_AUTO_CONFIRM: &str = "CODEGEN_AUTO_CONFIRM";
pub const ENV_HISTORY_PATH: &str = "CODEGEN_HISTORY_PATH";
pub const ENV_TODOS_PATH: &str = "CODEGEN_TODOS_PATH";

const VALID_LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub core: CoreConfig,

    #[serde(default)]
    pub llm: LLMConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Workspace root; every tool path is confined to it
    #[serde(default = "default_workspace")]
    pub workspace: PathBuf,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Transcript entries shown to the model each iteration
    #[serde(default = "default_prompt_window")]
    pub prompt_window: usize,

    #[serde(default = "default_output_truncate_chars")]
    pub output_truncate_chars: usize,

    /// Finished tasks remembered across a session
    #[serde(default = "default_memory_capacity")]
    pub memory_capacity: usize,

    #[serde(default = "default_history_path")]
    pub history_path: PathBuf,

    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_shell_timeout_ms")]
    pub shell_timeout_ms: u64,

    #[serde(default = "default_fetch_max_chars")]
    pub fetch_max_chars: usize,

    #[serde(default = "default_todos_path")]
    pub todos_path: PathBuf,

    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Approve every destructive action without prompting
    #[serde(default)]
    pub auto_confirm: bool,

    #[serde(default = "default_disallowed_commands")]
    pub disallowed_commands: Vec<String>,
}

fn default_workspace() -> PathBuf {
    PathBuf::from(".")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_iterations() -> u32 {
    crate::agent::core::DEFAULT_MAX_ITERATIONS
}

fn default_prompt_window() -> usize {
    crate::agent::core::DEFAULT_PROMPT_WINDOW
}

fn default_output_truncate_chars() -> usize {
    crate::agent::core::DEFAULT_OUTPUT_TRUNCATE
}

fn default_memory_capacity() -> usize {
    crate::agent::conversation_memory::DEFAULT_MEMORY_CAPACITY
}

fn default_history_path() -> PathBuf {
    PathBuf::from("~/.config/codegen/history.json")
}

fn default_history_limit() -> usize {
    20
}

fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

fn default_llm_timeout_secs() -> u64 {
    120
}

fn default_shell_timeout_ms() -> u64 {
    120_000
}

fn default_fetch_max_chars() -> usize {
    20_000
}

fn default_todos_path() -> PathBuf {
    PathBuf::from("~/.config/codegen/todos.json")
}

fn default_http_timeout_secs() -> u64 {
    10
}

fn default_disallowed_commands() -> Vec<String> {
    DEFAULT_DISALLOWED_COMMANDS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            workspace: default_workspace(),
            log_level: default_log_level(),
            max_iterations: default_max_iterations(),
            prompt_window: default_prompt_window(),
            output_truncate_chars: default_output_truncate_chars(),
            memory_capacity: default_memory_capacity(),
            history_path: default_history_path(),
            history_limit: default_history_limit(),
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            shell_timeout_ms: default_shell_timeout_ms(),
            fetch_max_chars: default_fetch_max_chars(),
            todos_path: default_todos_path(),
            http_timeout_secs: default_http_timeout_secs(),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            auto_confirm: false,
            disallowed_commands: default_disallowed_commands(),
        }
    }
}

impl Config {
    /// Load configuration from the default location
    /// (`~/.config/codegen/config.toml`), writing a default file first when
    /// none exists.
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, TOML parsing fails, or
    /// validation fails.
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate_and_process()?;
        debug!("Loaded config from {}", path.display());

        Ok(config)
    }

    /// Write the default configuration to `path` and return it
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        // The file keeps the unexpanded defaults so it stays portable
        let toml_string = toml::to_string_pretty(&Config::default())
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;
        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        let mut config = Config::default();
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate_and_process()?;
        Ok(config)
    }

    /// `~/.config/codegen/config.toml`
    pub fn default_config_path() -> Result<PathBuf, EngineError> {
        Ok(config_dir()?.join("config.toml"))
    }

    /// Apply environment overrides. `lookup` is the environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_AUTO_CONFIRM) {
            self.security.auto_confirm = is_truthy(&value);
        }
        if let Some(path) = lookup(ENV_HISTORY_PATH).filter(|p| !p.trim().is_empty()) {
            self.core.history_path = PathBuf::from(path);
        }
        if let Some(path) = lookup(ENV_TODOS_PATH).filter(|p| !p.trim().is_empty()) {
            self.tools.todos_path = PathBuf::from(path);
        }
    }

    /// Point the configuration at another workspace root
    pub fn set_workspace(&mut self, workspace: &Path) -> Result<(), EngineError> {
        self.core.workspace = canonical_workspace(workspace)?;
        Ok(())
    }

    /// Validate values, expand `~` and canonicalize the workspace.
    pub fn validate_and_process(&mut self) -> Result<(), EngineError> {
        if !VALID_LOG_LEVELS.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                VALID_LOG_LEVELS.join(", ")
            )));
        }

        if self.core.max_iterations < 1 {
            return Err(EngineError::Config(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if self.core.prompt_window < 1 {
            return Err(EngineError::Config(
                "prompt_window must be at least 1".to_string(),
            ));
        }
        if self.core.output_truncate_chars < 1 {
            return Err(EngineError::Config(
                "output_truncate_chars must be at least 1".to_string(),
            ));
        }
        if self.llm.model.trim().is_empty() {
            return Err(EngineError::Config("llm.model must not be empty".to_string()));
        }

        self.core.workspace = canonical_workspace(&self.core.workspace)?;
        self.core.history_path = expand_path(&self.core.history_path)?;
        self.tools.todos_path = expand_path(&self.tools.todos_path)?;

        Ok(())
    }

    /// Read the API key from the environment, falling back to `.env` files:
    /// the workspace root first, then `~/.config/codegen/.env`.
    pub fn api_key(&self) -> Result<String, EngineError> {
        let var = &self.llm.api_key_env;
        if let Some(key) = std::env::var(var).ok().filter(|k| !k.trim().is_empty()) {
            return Ok(key);
        }

        let mut candidates = vec![self.core.workspace.join(".env")];
        if let Ok(dir) = config_dir() {
            candidates.push(dir.join(".env"));
        }
        candidates
            .iter()
            .filter_map(|path| parse_env_file(path).remove(var))
            .find(|k| !k.trim().is_empty())
            .ok_or_else(|| EngineError::MissingApiKey(var.clone()))
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key().is_ok()
    }

    /// Save `key` to `~/.config/codegen/.env`, replacing an earlier value.
    pub fn save_api_key(&self, key: &str) -> Result<PathBuf, EngineError> {
        let path = config_dir()?.join(".env");
        upsert_env_file(&path, &self.llm.api_key_env, key)?;
        Ok(path)
    }

    pub fn tool_settings(&self) -> ToolSettings {
        ToolSettings {
            shell_timeout_ms: self.tools.shell_timeout_ms,
            disallowed_commands: self.security.disallowed_commands.clone(),
            fetch_max_chars: self.tools.fetch_max_chars,
            todos_path: self.tools.todos_path.clone(),
            http_timeout_secs: self.tools.http_timeout_secs,
            ..ToolSettings::default()
        }
    }

    pub fn loop_settings(&self) -> LoopSettings {
        LoopSettings {
            max_iterations: self.core.max_iterations,
            prompt_window: self.core.prompt_window,
            output_truncate_chars: self.core.output_truncate_chars,
        }
    }
}

/// "1", "true" and "yes" (any case) are truthy
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}

/// Parse a simple `.env` file: `KEY=VALUE` or `export KEY=VALUE` lines,
/// `#` comments, optional surrounding quotes. Unreadable files yield nothing.
pub fn parse_env_file(path: &Path) -> HashMap<String, String> {
    let Ok(contents) = fs::read_to_string(path) else {
        return HashMap::new();
    };
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| line.strip_prefix("export ").map(str::trim).unwrap_or(line))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| {
            let value = value.trim().trim_matches('"').trim_matches('\'');
            (key.trim().to_string(), value.to_string())
        })
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

/// Set `key=value` in a `.env` file, keeping every other line.
pub fn upsert_env_file(path: &Path, key: &str, value: &str) -> Result<(), EngineError> {
    let existing = fs::read_to_string(path).unwrap_or_default();
    let entry = format!("{key}={value}");

    let mut replaced = false;
    let mut lines: Vec<String> = existing
        .lines()
        .map(|line| {
            let bare = line.trim().strip_prefix("export ").unwrap_or(line.trim());
            let matches = bare
                .split_once('=')
                .is_some_and(|(k, _)| k.trim() == key);
            if matches && !replaced {
                replaced = true;
                entry.clone()
            } else {
                line.to_string()
            }
        })
        .collect();
    if !replaced {
        lines.push(entry);
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| EngineError::Config(format!("Failed to create {:?}: {}", parent, e)))?;
    }
    fs::write(path, lines.join("\n") + "\n")
        .map_err(|e| EngineError::Config(format!("Failed to write {:?}: {}", path, e)))
}

fn config_dir() -> Result<PathBuf, EngineError> {
    let home = dirs::home_dir()
        .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;
    Ok(home.join(".config").join("codegen"))
}

fn canonical_workspace(path: &Path) -> Result<PathBuf, EngineError> {
    let expanded = expand_path(path)?;
    let canonical = expanded
        .canonicalize()
        .map_err(|e| EngineError::PathCanonicalization(expanded.clone(), e.to_string()))?;
    if !canonical.is_dir() {
        return Err(EngineError::Config(format!(
            "Workspace path is not a directory: {:?}",
            canonical
        )));
    }
    Ok(canonical)
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;
        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}
