//! Codegen SDK
//!
//! Shared contracts for the codegen engine: the error taxonomy, the canonical
//! tool invocation, the result envelope, the tool trait and tool schemas.

/// Error types and handling
pub mod errors;

/// Hand-authored tool schemas
pub mod schema;

/// The canonical tool trait
pub mod tool;

/// Tool invocation and result types
pub mod types;

// Re-export commonly used types
pub use errors::{CodegenErrorExt, EngineError};
pub use schema::{ParamType, ToolParameter, ToolSchema};
pub use tool::Tool;
pub use types::{Kwargs, ToolError, ToolInvocation, ToolResult};
