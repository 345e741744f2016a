//! Tool invocation normalizer
//!
//! Turns a loosely shaped payload (`{tool, args?, kwargs?}` from the model or
//! from a typed command) into a canonical [`ToolInvocation`]. The function is
//! total: every malformed input yields a [`Rejection`], never a panic.
//!
//! Rules, in order:
//! 1. string `args` becomes a one-element list
//! 2. object `args` is merged into `kwargs` (args win) and cleared
//! 3. with empty `args`, a nested `kwargs.args` object is spliced into
//!    `kwargs` without overwriting
//! 4. with empty `args`, the first path-like alias in `kwargs` is promoted
//!    to the single positional argument
//!
//! `list_files` additionally coerces its string flags to booleans.

use serde_json::Value;
use thiserror::Error;

use sdk::{Kwargs, ToolInvocation, ToolResult};

use super::ToolRegistry;

/// Keys promoted to a positional argument when no positional args exist
pub const PATH_ALIASES: &[&str] = &["file_path", "file", "path", "fname", "filename"];

/// `list_files` flags coerced from text
const LS_FLAGS: &[&str] = &["names_only", "dirs_only", "recursive", "files_only"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("payload is not a JSON object")]
    NotAMapping,

    #[error("missing or non-string `tool` key")]
    MissingTool,

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("`args` must be a list, string or object, got {0}")]
    InvalidArgs(&'static str),

    #[error("`kwargs` must be an object, got {0}")]
    InvalidKwargs(&'static str),
}

impl Rejection {
    /// Rejections are consumed exactly like dispatch failures.
    pub fn into_result(self) -> ToolResult {
        match self {
            Rejection::UnknownTool(name) => ToolResult::tool_not_found(&name),
            other => ToolResult::failure(format!("Invalid tool invocation: {other}")),
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Normalize a loosely shaped payload into a canonical invocation.
pub fn normalize(payload: &Value, registry: &ToolRegistry) -> Result<ToolInvocation, Rejection> {
    let Value::Object(map) = payload else {
        return Err(Rejection::NotAMapping);
    };
    let Some(Value::String(raw_name)) = map.get("tool") else {
        return Err(Rejection::MissingTool);
    };
    let lowered = raw_name.trim().to_ascii_lowercase();
    let name = registry
        .resolve_name(&lowered)
        .ok_or(Rejection::UnknownTool(lowered))?;

    let mut kwargs = match map.get("kwargs") {
        None | Some(Value::Null) => Kwargs::new(),
        Some(Value::Object(k)) => k.clone(),
        Some(other) => return Err(Rejection::InvalidKwargs(type_name(other))),
    };

    // Rules 1 and 2
    let mut args = match map.get("args") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::String(s)) => vec![Value::String(s.clone())],
        Some(Value::Array(list)) => list.clone(),
        Some(Value::Object(obj)) => {
            for (k, v) in obj {
                kwargs.insert(k.clone(), v.clone());
            }
            Vec::new()
        }
        Some(other) => return Err(Rejection::InvalidArgs(type_name(other))),
    };

    // Rule 3
    if args.is_empty() && matches!(kwargs.get("args"), Some(Value::Object(_))) {
        if let Some(Value::Object(nested)) = kwargs.remove("args") {
            for (k, v) in nested {
                kwargs.entry(k).or_insert(v);
            }
        }
    }

    // Rule 4
    if args.is_empty() {
        if let Some(key) = PATH_ALIASES.iter().find(|k| kwargs.contains_key(**k)) {
            if let Some(value) = kwargs.remove(*key) {
                args.push(value);
            }
        }
    }

    if name == "list_files" {
        coerce_ls_flags(&mut kwargs);
    }

    Ok(ToolInvocation { name, args, kwargs })
}

/// Canonical invocation from a model function call. The shorthand rules do
/// not apply; the name is still allow-listed and the arguments must be an
/// object.
pub fn from_function_call(
    name: &str,
    arguments: &Value,
    registry: &ToolRegistry,
) -> Result<ToolInvocation, Rejection> {
    let lowered = name.trim().to_ascii_lowercase();
    let canonical = registry
        .resolve_name(&lowered)
        .ok_or(Rejection::UnknownTool(lowered))?;
    let mut kwargs = match arguments {
        Value::Null => Kwargs::new(),
        Value::Object(k) => k.clone(),
        other => return Err(Rejection::InvalidKwargs(type_name(other))),
    };
    if canonical == "list_files" {
        coerce_ls_flags(&mut kwargs);
    }
    Ok(ToolInvocation {
        name: canonical,
        args: Vec::new(),
        kwargs,
    })
}

fn coerce_ls_flags(kwargs: &mut Kwargs) {
    for flag in LS_FLAGS {
        if let Some(Value::String(s)) = kwargs.get(*flag) {
            let coerced = s == "true";
            kwargs.insert(flag.to_string(), Value::Bool(coerced));
        }
    }
}
