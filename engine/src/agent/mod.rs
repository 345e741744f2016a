//! Agent loop
//!
//! One [`AgentLoop`] drives each natural-language goal to completion or
//! failure. [`ConversationMemory`] carries short summaries between goals in
//! the same session.

pub mod conversation_memory;
pub mod core;
pub mod project;
pub mod state;

pub use conversation_memory::{ConversationMemory, TaskMemory};
pub use core::{AgentLoop, LoopSettings};
pub use project::ProjectInfo;
pub use state::{AgentState, LoopStatus, TranscriptEntry};
