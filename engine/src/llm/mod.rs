//! LLM collaborator layer
//!
//! The agent loop talks to the model through the [`LLMProvider`] trait. A
//! provider receives the conversation plus the tool schemas and answers with
//! one [`LLMResponse`]: a structured tool call, free text, or nothing.
//!
//! Models that ignore native function calling often reply with a JSON tool
//! call embedded in prose. [`parse_tool_payload`] recovers those.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use sdk::{EngineError, ToolSchema};

pub mod gemini;

pub use gemini::GeminiProvider;

/// Result type for LLM operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// Phrases in provider error text that mean "slow down"
const RATE_LIMIT_PHRASES: &[&str] = &[
    "429",
    "rate limit",
    "ratelimit",
    "too many requests",
    "resource exhausted",
    "resource_exhausted",
];

const QUOTA_PHRASES: &[&str] = &["quota"];

/// Errors that can occur during LLM operations
#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl LLMError {
    /// Reclassify a free-form error message, recognizing rate-limit and quota
    /// phrases. Anything else stays [`LLMError::Unknown`].
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if QUOTA_PHRASES.iter().any(|p| lower.contains(p)) {
            Self::QuotaExceeded(message)
        } else if RATE_LIMIT_PHRASES.iter().any(|p| lower.contains(p)) {
            Self::RateLimitExceeded(message)
        } else {
            Self::Unknown(message)
        }
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimitExceeded(_) | Self::QuotaExceeded(_))
    }
}

impl From<LLMError> for EngineError {
    fn from(err: LLMError) -> Self {
        match err {
            LLMError::RateLimitExceeded(m) | LLMError::QuotaExceeded(m) => Self::RateLimited(m),
            LLMError::Timeout => Self::LLMTimeout,
            other => Self::LLMProvider(other.to_string()),
        }
    }
}

/// Message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::System => write!(f, "system"),
        }
    }
}

/// One decision from the model
#[derive(Debug, Clone, PartialEq)]
pub enum LLMResponse {
    /// Native function call. `arguments` is the kwargs object as sent.
    ToolCall { name: String, arguments: Value },

    /// Free text. May still carry a JSON tool payload; see [`parse_tool_payload`].
    Text(String),

    /// The model produced no usable output
    Empty,
}

/// LLM provider trait that all providers must implement
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Provider name for logs (e.g. "gemini")
    fn name(&self) -> &str;

    /// Ask the model for its next decision.
    ///
    /// `tools` are rendered into the provider's function-declaration format.
    async fn generate(&self, messages: &[Message], tools: &[ToolSchema]) -> Result<LLMResponse>;
}

/// Recover a JSON tool payload from model text.
///
/// Accepted shapes, in order of preference:
/// 1. The whole text is a JSON object
/// 2. The first fenced code block holds a JSON object
/// 3. A balanced JSON object starting at the first `{"tool"`, `{"function"`
///    or `{"name"` anywhere in the prose
///
/// The object must carry a `tool` key, or a `function`/`name` key paired with
/// `arguments`. The latter is rewritten to `{"tool", "kwargs"}` so the
/// normalizer sees one shape. Returns `None` when nothing qualifies.
pub fn parse_tool_payload(content: &str) -> Option<Value> {
    let trimmed = content.trim();

    if let Some(payload) = try_parse_payload(trimmed) {
        return Some(payload);
    }

    if let Some(inner) = extract_fenced_json(trimmed) {
        if let Some(payload) = try_parse_payload(inner.trim()) {
            return Some(payload);
        }
    }

    for marker in ["{\"tool\"", "{\"function\"", "{\"name\""] {
        if let Some(pos) = trimmed.find(marker) {
            if let Some(json_str) = extract_balanced_json(&trimmed[pos..]) {
                if let Some(payload) = try_parse_payload(json_str) {
                    return Some(payload);
                }
            }
        }
    }

    None
}

fn try_parse_payload(s: &str) -> Option<Value> {
    let json: Value = serde_json::from_str(s).ok()?;
    let obj = json.as_object()?;
    if obj.contains_key("tool") {
        return Some(json);
    }
    let name = obj
        .get("function")
        .or_else(|| obj.get("name"))
        .and_then(Value::as_str)?;
    let arguments = obj.get("arguments")?;
    // Some models send arguments as an encoded JSON string
    let kwargs = match arguments {
        Value::String(encoded) => serde_json::from_str(encoded).ok()?,
        other => other.clone(),
    };
    Some(serde_json::json!({ "tool": name, "kwargs": kwargs }))
}

/// Extract the body of the first markdown code fence in the text.
///
/// Works even when there is trailing prose after the closing fence.
fn extract_fenced_json(content: &str) -> Option<&str> {
    let fence_start = content.find("```")?;
    let after_opening = &content[fence_start + 3..];

    // Skip the language tag line (e.g. "json\n")
    let body_start = fence_start + 3 + after_opening.find('\n')? + 1;
    let body_end = body_start + content[body_start..].find("```")?;

    if body_start >= body_end {
        return None;
    }
    Some(&content[body_start..body_end])
}

/// Extract a balanced JSON object starting at position 0 of `s`.
///
/// Counts brace depth, respecting string literals.
fn extract_balanced_json(s: &str) -> Option<&str> {
    if !s.starts_with('{') {
        return None;
    }
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}
