use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;

/// Commands rejected outright, matched as whole-token sequences anywhere in
/// the command line (so `echo hi && sudo ls` is caught but `add` is not `dd`).
pub const DEFAULT_DISALLOWED_COMMANDS: &[&str] = &[
    "sudo",
    "ssh",
    "scp",
    "rm -rf",
    "reboot",
    "shutdown",
    "poweroff",
    "su",
    "passwd",
    "chmod 777",
    "chown",
    "dd",
    "mkfs",
    "fdisk",
];

/// CommandExecutor runs shell command lines inside the workspace root.
///
/// # Security Features
/// - Disallow-list validation on every shell segment
/// - Working directory pinned to the workspace root
/// - stdin set to null, stdout/stderr piped
/// - Hard timeout; the child is killed when it expires
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    disallowed: Vec<Vec<String>>,
    work_dir: PathBuf,
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Empty command")]
    Empty,

    #[error("Command not allowed: {0}")]
    CommandNotAllowed(String),

    #[error("Command timed out after {0} ms")]
    Timeout(u64),

    #[error("Command execution failed: {0}")]
    ExecutionFailed(#[from] std::io::Error),
}

/// Captured result of one command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// stdout, followed by a `STDERR:` section when stderr is non-empty
    pub fn combined(&self) -> String {
        if self.stderr.trim().is_empty() {
            self.stdout.clone()
        } else {
            format!("{}\nSTDERR:\n{}", self.stdout, self.stderr)
        }
    }
}

impl CommandExecutor {
    /// Creates an executor with the default disallow list.
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self::with_disallowed(
            work_dir,
            DEFAULT_DISALLOWED_COMMANDS.iter().map(|s| s.to_string()),
        )
    }

    /// Creates an executor with a custom disallow list.
    pub fn with_disallowed(
        work_dir: impl Into<PathBuf>,
        commands: impl IntoIterator<Item = String>,
    ) -> Self {
        let disallowed = commands
            .into_iter()
            .map(|c| tokenize(&c))
            .filter(|t| !t.is_empty())
            .collect();
        Self {
            disallowed,
            work_dir: work_dir.into(),
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Validates a command line without executing it.
    pub fn validate(&self, command: &str) -> Result<(), CommandError> {
        let tokens = tokenize(command);
        if tokens.is_empty() {
            return Err(CommandError::Empty);
        }

        for pattern in &self.disallowed {
            if tokens.windows(pattern.len()).any(|w| w == pattern.as_slice()) {
                return Err(CommandError::CommandNotAllowed(pattern.join(" ")));
            }
        }

        Ok(())
    }

    /// Validates then runs `command` through the platform shell.
    pub async fn execute(
        &self,
        command: &str,
        timeout_ms: u64,
    ) -> Result<CommandOutput, CommandError> {
        self.validate(command)?;

        let mut cmd = shell_command(command);
        cmd.current_dir(&self.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn()?;
        let output = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            child.wait_with_output(),
        )
        .await
        .map_err(|_| CommandError::Timeout(timeout_ms))??;

        Ok(CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(unix)]
fn shell_command(command: &str) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell_command(command: &str) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

/// Lower-cased tokens, split on whitespace and shell separators.
fn tokenize(command: &str) -> Vec<String> {
    command
        .split(|c: char| c.is_whitespace() || matches!(c, ';' | '&' | '|' | '(' | ')' | '`'))
        .filter(|t| !t.is_empty())
        .map(|t| t.to_ascii_lowercase())
        .collect()
}
