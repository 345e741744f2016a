//! CLI interface for codegen
//!
//! Defines the commands and global flags using clap's derive API. With no
//! subcommand the interactive REPL starts.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Repository-aware coding assistant
///
/// Give it a goal in plain language; it reads, searches, edits and runs
/// commands in your workspace until the goal is done. Destructive steps ask
/// first.
#[derive(Parser, Debug)]
#[command(name = "codegen")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Workspace root (defaults to core.workspace from config)
    #[arg(long, global = true, value_name = "DIR")]
    pub workspace: Option<PathBuf>,

    /// Iteration budget per task
    #[arg(long, global = true, value_name = "N")]
    pub max_iterations: Option<u32>,

    /// Approve destructive actions without prompting
    #[arg(short = 'y', long = "yes", global = true)]
    pub yes: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one task and exit
    Run {
        /// The task to execute
        task: String,
    },

    /// Show task history
    History {
        /// Number of entries to show (default: core.history_limit)
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Save the Gemini API key to ~/.config/codegen/.env
    SetKey {
        /// The key; prompted for when omitted
        key: Option<String>,
    },
}
