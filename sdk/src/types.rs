//! Tool invocation and result types

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Keyword arguments of a canonical invocation.
pub type Kwargs = serde_json::Map<String, Value>;

/// Canonical tool invocation: `{name, args, kwargs}`.
///
/// `name` is always the lower-cased canonical tool name once an invocation
/// leaves the normalizer; nothing downstream sees aliases or loose shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub name: String,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub kwargs: Kwargs,
}

impl ToolInvocation {
    /// Create an invocation with no arguments
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            kwargs: Kwargs::new(),
        }
    }

    /// Append a positional argument
    pub fn with_arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Add a keyword argument
    pub fn with_kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(key.into(), value.into());
        self
    }

    /// Look up a parameter by keyword first, then by position.
    pub fn param(&self, index: usize, key: &str) -> Option<&Value> {
        self.kwargs
            .get(key)
            .filter(|v| !v.is_null())
            .or_else(|| self.args.get(index))
    }

    /// Get a parameter rendered as a string. Numbers and booleans are
    /// stringified since shorthand commands carry everything as text.
    pub fn str_param(&self, index: usize, key: &str) -> Option<String> {
        match self.param(index, key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Get a required string parameter
    pub fn require_str(&self, index: usize, key: &str) -> Result<String, ToolError> {
        self.str_param(index, key)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ToolError::MissingParameter(key.to_string()))
    }

    /// Get an integer parameter, accepting numeric strings
    pub fn i64_param(&self, index: usize, key: &str) -> Result<Option<i64>, ToolError> {
        match self.param(index, key) {
            None => Ok(None),
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .map(Some)
                .ok_or_else(|| ToolError::InvalidParameter(format!("{key} must be an integer"))),
            Some(Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(Some)
                .map_err(|_| ToolError::InvalidParameter(format!("{key} must be an integer"))),
            Some(_) => Err(ToolError::InvalidParameter(format!(
                "{key} must be an integer"
            ))),
        }
    }

    /// Get a keyword-only boolean flag. The strings "true"/"yes"/"1" count as true.
    pub fn flag(&self, key: &str) -> bool {
        match self.kwargs.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => matches!(s.to_ascii_lowercase().as_str(), "true" | "yes" | "1"),
            Some(Value::Number(n)) => n.as_i64().is_some_and(|n| n != 0),
            _ => false,
        }
    }
}

/// Uniform result envelope: `{success, output, meta}`.
///
/// Every dispatch path produces exactly this shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: Value,
    #[serde(default)]
    pub meta: Kwargs,
}

impl ToolResult {
    /// Create a successful result
    pub fn ok(output: impl Into<Value>) -> Self {
        Self {
            success: true,
            output: output.into(),
            meta: Kwargs::new(),
        }
    }

    /// Create a tool-reported failure
    pub fn failure(output: impl Into<Value>) -> Self {
        Self {
            success: false,
            output: output.into(),
            meta: Kwargs::new(),
        }
    }

    /// Attach a metadata entry
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// Envelope for a name the registry does not know
    pub fn tool_not_found(name: &str) -> Self {
        Self::failure(format!("Tool not found: {name}"))
    }

    /// Envelope for a tool that errored or panicked
    pub fn runtime_error(message: impl std::fmt::Display) -> Self {
        Self::failure(format!("Tool runtime error: {message}"))
    }

    /// Envelope for a tool response that is not a valid envelope
    pub fn invalid_shape(raw: Value) -> Self {
        Self::failure("Invalid tool response shape").with_meta("raw", raw)
    }

    /// Validate a raw tool response.
    ///
    /// The response must be an object carrying a boolean `success` and an
    /// `output` key. A `meta` object is kept when present; anything else
    /// becomes the synthetic invalid-shape envelope.
    pub fn from_raw(raw: Value) -> Self {
        let Value::Object(map) = &raw else {
            return Self::invalid_shape(raw);
        };
        let (Some(Value::Bool(success)), Some(output)) = (map.get("success"), map.get("output"))
        else {
            return Self::invalid_shape(raw);
        };
        let meta = match map.get("meta") {
            Some(Value::Object(meta)) => meta.clone(),
            _ => Kwargs::new(),
        };
        Self {
            success: *success,
            output: output.clone(),
            meta,
        }
    }

    /// Render `output` as text: strings verbatim, everything else as JSON.
    pub fn output_text(&self) -> String {
        match &self.output {
            Value::String(s) => s.clone(),
            other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
        }
    }
}

impl From<ToolResult> for Value {
    fn from(result: ToolResult) -> Self {
        json!({
            "success": result.success,
            "output": result.output,
            "meta": result.meta,
        })
    }
}

/// Tool-specific errors
///
/// Returning one of these is how a tool "raises"; the dispatcher converts it
/// into a `Tool runtime error` envelope.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Path rejected: {0}")]
    PathRejected(String),

    #[error("Timed out after {0} ms")]
    Timeout(u64),

    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invocation_param_prefers_kwargs() {
        let inv = ToolInvocation::new("read_file")
            .with_arg("a.txt")
            .with_kwarg("path", "b.txt");
        assert_eq!(inv.str_param(0, "path").as_deref(), Some("b.txt"));
    }

    #[test]
    fn test_invocation_param_falls_back_to_position() {
        let inv = ToolInvocation::new("read_file").with_arg("a.txt");
        assert_eq!(inv.str_param(0, "path").as_deref(), Some("a.txt"));
        assert!(inv.str_param(1, "offset").is_none());
    }

    #[test]
    fn test_require_str_rejects_blank() {
        let inv = ToolInvocation::new("grep").with_arg("   ");
        assert!(matches!(
            inv.require_str(0, "pattern"),
            Err(ToolError::MissingParameter(_))
        ));
    }

    #[test]
    fn test_i64_param_accepts_numeric_strings() {
        let inv = ToolInvocation::new("read_file")
            .with_kwarg("offset", "10")
            .with_kwarg("limit", 5);
        assert_eq!(inv.i64_param(1, "offset").ok().flatten(), Some(10));
        assert_eq!(inv.i64_param(2, "limit").ok().flatten(), Some(5));
        let bad = ToolInvocation::new("read_file").with_kwarg("limit", "ten");
        assert!(bad.i64_param(2, "limit").is_err());
    }

    #[test]
    fn test_flag_parsing() {
        let inv = ToolInvocation::new("list_files")
            .with_kwarg("recursive", true)
            .with_kwarg("names_only", "yes")
            .with_kwarg("dirs_only", "nope");
        assert!(inv.flag("recursive"));
        assert!(inv.flag("names_only"));
        assert!(!inv.flag("dirs_only"));
        assert!(!inv.flag("files_only"));
    }

    #[test]
    fn test_from_raw_accepts_valid_envelope() {
        let result = ToolResult::from_raw(json!({
            "success": true,
            "output": "done",
            "meta": {"bytes": 4}
        }));
        assert!(result.success);
        assert_eq!(result.output, json!("done"));
        assert_eq!(result.meta.get("bytes"), Some(&json!(4)));
    }

    #[test]
    fn test_from_raw_rejects_bad_shapes() {
        for raw in [
            json!("just text"),
            json!(["success", "output"]),
            json!({"success": true}),
            json!({"output": "x"}),
            json!({"success": "yes", "output": "x"}),
        ] {
            let result = ToolResult::from_raw(raw.clone());
            assert!(!result.success);
            assert_eq!(result.output, json!("Invalid tool response shape"));
            assert_eq!(result.meta.get("raw"), Some(&raw));
        }
    }

    #[test]
    fn test_from_raw_ignores_non_object_meta() {
        let result = ToolResult::from_raw(json!({"success": false, "output": 1, "meta": 3}));
        assert!(!result.success);
        assert!(result.meta.is_empty());
    }

    #[test]
    fn test_output_text() {
        assert_eq!(ToolResult::ok("hello").output_text(), "hello");
        assert_eq!(ToolResult::ok(json!(3)).output_text(), "3");
    }

    #[test]
    fn test_envelope_constructors() {
        let nf = ToolResult::tool_not_found("frobnicate");
        assert_eq!(nf.output, json!("Tool not found: frobnicate"));
        assert!(nf.meta.is_empty());

        let rt = ToolResult::runtime_error("boom");
        assert_eq!(rt.output, json!("Tool runtime error: boom"));
    }
}
