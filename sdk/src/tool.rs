//! The canonical tool interface
//!
//! Every built-in tool implements [`Tool`]. A tool receives an already
//! normalized [`ToolInvocation`] and returns its raw response: a JSON object
//! carrying at least `success` and `output`. Returning `Err` is the tool's
//! way of raising; the dispatcher turns both failure styles into the uniform
//! envelope.

use async_trait::async_trait;
use serde_json::Value;

use crate::schema::ToolSchema;
use crate::types::{ToolError, ToolInvocation};

#[async_trait]
pub trait Tool: Send + Sync {
    /// Canonical, lower-case tool name
    fn name(&self) -> &str;

    /// Hand-authored schema shown to the model
    fn schema(&self) -> ToolSchema;

    /// Whether the tool only reads state. Read-only tools are never gated.
    fn read_only(&self) -> bool {
        false
    }

    /// Execute the tool
    async fn call(&self, invocation: &ToolInvocation) -> Result<Value, ToolError>;
}
