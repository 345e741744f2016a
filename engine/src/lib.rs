//! CodeGen Engine Library
//!
//! This library provides the core functionality of the codegen assistant.
//! It is used by both the main binary and integration tests.

/// Configuration management module
pub mod config;

/// Workspace containment module
pub mod fs_guard;

/// Shell command execution module
pub mod command_executor;

/// Confirmation gate for destructive actions
pub mod confirmation;

/// LLM provider abstraction layer
pub mod llm;

/// Agent loop core module
pub mod agent;

/// Built-in tools, normalizer and dispatcher
pub mod tools;

/// Task history persistence
pub mod history;

/// Shared session state for the CLI and REPL
pub mod session;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;

/// Interactive shell
pub mod repl;
