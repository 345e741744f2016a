//! Error types and handling
//!
//! This module provides the error types used throughout the codegen engine.
//! All errors implement the `CodegenErrorExt` trait which provides user-friendly
//! hints and indicates whether errors are recoverable.
//!
//! Hints are static strings: they never echo API keys, raw model output or
//! absolute paths back to the terminal.

use thiserror::Error;

/// Trait for codegen error extensions
///
/// This trait provides additional context for errors, including user-friendly
/// hints and recoverability information. All engine errors implement this trait.
pub trait CodegenErrorExt {
    /// Returns a user-friendly hint for the error
    fn user_hint(&self) -> &'static str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors end the current task at most. Non-recoverable
    /// errors mean the session itself cannot continue without user action.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Error Categories
///
/// - **Configuration**: Invalid or missing configuration
/// - **Workspace**: Path containment violations
/// - **LLM Provider**: API failures, authentication, rate limits
/// - **Agent loop**: Budget exhaustion, missing decisions
/// - **Tools**: Unknown tools, rejected invocations, runtime failures
/// - **History**: Persistence failures
///
/// # Examples
///
/// ```
/// use sdk::errors::{CodegenErrorExt, EngineError};
/// use std::path::PathBuf;
///
/// let error = EngineError::PathOutsideWorkspace(PathBuf::from("/etc/passwd"));
/// println!("Hint: {}", error.user_hint());
/// assert!(error.is_recoverable());
///
/// let fatal = EngineError::MissingApiKey("GEMINI_API_KEY".to_string());
/// assert!(!fatal.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing API key: set the {0} environment variable")]
    MissingApiKey(String),

    // Workspace containment errors
    #[error("Path denied: {0:?}")]
    PathDenied(std::path::PathBuf),

    #[error("Path outside workspace: {0:?}")]
    PathOutsideWorkspace(std::path::PathBuf),

    #[error("Path canonicalization failed for {0:?}: {1}")]
    PathCanonicalization(std::path::PathBuf, String),

    // LLM provider errors
    #[error("LLM provider error: {0}")]
    LLMProvider(String),

    #[error("LLM rate limit or quota exceeded: {0}")]
    RateLimited(String),

    #[error("LLM call timed out")]
    LLMTimeout,

    // Agent loop errors
    #[error("max iterations reached")]
    MaxIterationsExceeded,

    #[error("no tool call returned")]
    NoToolCall,

    // Tool errors
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid tool invocation: {0}")]
    InvalidInvocation(String),

    #[error("Tool error: {0}")]
    ToolError(String),

    #[error("Command not allowed: {0}")]
    CommandNotAllowed(String),

    // History errors
    #[error("History error: {0}")]
    History(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CodegenErrorExt for EngineError {
    fn user_hint(&self) -> &'static str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",
            Self::MissingApiKey(_) => "Export your API key or add it to a .env file",

            Self::PathDenied(_) => "Access to this path is not allowed",
            Self::PathOutsideWorkspace(_) => "Operation must be within the workspace",
            Self::PathCanonicalization(_, _) => "Invalid path specified",

            Self::LLMProvider(_) => "LLM provider unavailable. Check your API key and network",
            Self::RateLimited(_) => "Rate limit or quota reached. Wait a moment and try again",
            Self::LLMTimeout => "LLM provider took too long to respond. Try again",

            Self::MaxIterationsExceeded => "Task too complex. Try breaking it into smaller steps",
            Self::NoToolCall => "The model did not choose an action. Try rephrasing the request",

            Self::ToolNotFound(_) => "The requested tool is not available",
            Self::InvalidInvocation(_) => "Tool call was malformed. Check the tool arguments",
            Self::ToolError(_) => "Tool operation failed",
            Self::CommandNotAllowed(_) => "This command is not permitted",

            Self::History(_) => "History file could not be written",
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        !matches!(self, Self::MissingApiKey(_) | Self::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_loop_errors_render_their_reason() {
        assert_eq!(
            EngineError::MaxIterationsExceeded.to_string(),
            "max iterations reached"
        );
        assert_eq!(EngineError::NoToolCall.to_string(), "no tool call returned");
    }

    #[test]
    fn test_recoverability() {
        assert!(EngineError::ToolNotFound("x".into()).is_recoverable());
        assert!(EngineError::PathOutsideWorkspace(PathBuf::from("/")).is_recoverable());
        assert!(!EngineError::Config("bad".into()).is_recoverable());
        assert!(!EngineError::MissingApiKey("GEMINI_API_KEY".into()).is_recoverable());
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: EngineError = io.into();
        assert!(matches!(err, EngineError::Io(_)));
        assert_eq!(err.user_hint(), "File system operation failed");
    }
}
