//! Confirmation gate for destructive operations
//!
//! Tools fall into two classes:
//!
//! - **Safe**: read, list, search, edit, todos, web. Executed directly.
//! - **Destructive**: delete, overwrite-write, shell execution, multi-file
//!   edit. Every affected target needs an explicit yes before the tool
//!   touches it.
//!
//! The gate is consulted by the destructive tools themselves, once per
//! target, so a glob-expanded delete asks once per match and a decline skips
//! only that match. `auto_confirm` (config `security.auto_confirm`, env
//! `CODEGEN_AUTO_CONFIRM`, CLI `--yes`) approves everything without
//! prompting.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::io::{BufRead, Write};
use std::sync::{Arc, Mutex};
use tracing::info;

/// The kind of irreversible action a target is about to undergo
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestructiveAction {
    Delete,
    Overwrite,
    Execute,
    MultiEdit,
}

impl DestructiveAction {
    /// Classify a canonical tool name. `write_file` is only destructive when
    /// it overwrites, which the tool decides at call time.
    pub fn for_tool(name: &str) -> Option<Self> {
        match name {
            "delete_file" => Some(Self::Delete),
            "write_file" => Some(Self::Overwrite),
            "run_command" => Some(Self::Execute),
            "multi_edit" => Some(Self::MultiEdit),
            _ => None,
        }
    }

    fn verb(&self) -> &'static str {
        match self {
            Self::Delete => "Delete",
            Self::Overwrite => "Overwrite",
            Self::Execute => "Run command",
            Self::MultiEdit => "Apply edits to",
        }
    }

    /// Prompt text shown for one target
    pub fn prompt(&self, target: &str) -> String {
        format!("{} '{}'? (y/n) ", self.verb(), target)
    }
}

/// Outcome of a single confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approved,
    Declined,
}

impl Decision {
    pub fn is_approved(&self) -> bool {
        matches!(self, Decision::Approved)
    }
}

/// Source of yes/no answers.
#[async_trait]
pub trait Confirmer: Send + Sync {
    /// Ask one question. Blocks until answered; `false` on end of input.
    async fn confirm(&self, prompt: &str) -> bool;
}

/// Reads answers from the terminal.
pub struct StdinConfirmer;

#[async_trait]
impl Confirmer for StdinConfirmer {
    async fn confirm(&self, prompt: &str) -> bool {
        let prompt = prompt.to_string();
        tokio::task::spawn_blocking(move || {
            let mut stdout = std::io::stdout();
            let _ = write!(stdout, "{}", prompt);
            let _ = stdout.flush();

            let mut line = String::new();
            match std::io::stdin().lock().read_line(&mut line) {
                Ok(0) | Err(_) => false,
                Ok(_) => is_yes(&line),
            }
        })
        .await
        .unwrap_or(false)
    }
}

/// Replays a fixed list of answers. Runs out as "no".
///
/// Used for non-interactive runs with a known script and in tests.
#[derive(Default)]
pub struct ScriptedConfirmer {
    answers: Mutex<VecDeque<bool>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedConfirmer {
    pub fn new(answers: impl IntoIterator<Item = bool>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Prompts asked so far, in order
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Confirmer for ScriptedConfirmer {
    async fn confirm(&self, prompt: &str) -> bool {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        self.answers
            .lock()
            .ok()
            .and_then(|mut a| a.pop_front())
            .unwrap_or(false)
    }
}

/// `y` / `yes`, case-insensitive
pub fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Gate consulted by destructive tools before each irreversible step.
#[derive(Clone)]
pub struct ConfirmationGate {
    confirmer: Arc<dyn Confirmer>,
    auto_confirm: bool,
}

impl ConfirmationGate {
    pub fn new(confirmer: Arc<dyn Confirmer>, auto_confirm: bool) -> Self {
        Self {
            confirmer,
            auto_confirm,
        }
    }

    /// Terminal prompts, unless `auto_confirm` is set
    pub fn interactive(auto_confirm: bool) -> Self {
        Self::new(Arc::new(StdinConfirmer), auto_confirm)
    }

    /// Approves everything without asking
    pub fn auto_approve() -> Self {
        Self::new(Arc::new(ScriptedConfirmer::default()), true)
    }

    pub fn auto_confirm(&self) -> bool {
        self.auto_confirm
    }

    /// Ask for approval of `action` on one `target`.
    pub async fn confirm(&self, action: DestructiveAction, target: &str) -> Decision {
        if self.auto_confirm {
            info!(?action, target, "Auto-confirmed destructive action");
            return Decision::Approved;
        }

        let decision = if self.confirmer.confirm(&action.prompt(target)).await {
            Decision::Approved
        } else {
            Decision::Declined
        };
        info!(?action, target, ?decision, "Confirmation answered");
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_destructive_tools() {
        assert_eq!(
            DestructiveAction::for_tool("delete_file"),
            Some(DestructiveAction::Delete)
        );
        assert_eq!(
            DestructiveAction::for_tool("write_file"),
            Some(DestructiveAction::Overwrite)
        );
        assert_eq!(
            DestructiveAction::for_tool("run_command"),
            Some(DestructiveAction::Execute)
        );
        assert_eq!(
            DestructiveAction::for_tool("multi_edit"),
            Some(DestructiveAction::MultiEdit)
        );
    }

    #[test]
    fn test_classify_safe_tools() {
        for name in ["read_file", "list_files", "grep", "find_files", "edit_file"] {
            assert_eq!(DestructiveAction::for_tool(name), None, "{name} is safe");
        }
    }

    #[test]
    fn test_is_yes() {
        assert!(is_yes("y"));
        assert!(is_yes(" YES\n"));
        assert!(!is_yes("n"));
        assert!(!is_yes(""));
        assert!(!is_yes("yeah"));
    }

    #[tokio::test]
    async fn test_auto_confirm_skips_prompting() {
        let confirmer = Arc::new(ScriptedConfirmer::new([false]));
        let gate = ConfirmationGate::new(Arc::clone(&confirmer) as Arc<dyn Confirmer>, true);

        let decision = gate.confirm(DestructiveAction::Delete, "a.txt").await;
        assert_eq!(decision, Decision::Approved);
        assert!(confirmer.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_scripted_answers_in_order() {
        let confirmer = Arc::new(ScriptedConfirmer::new([true, false]));
        let gate = ConfirmationGate::new(Arc::clone(&confirmer) as Arc<dyn Confirmer>, false);

        assert!(gate
            .confirm(DestructiveAction::Delete, "a.txt")
            .await
            .is_approved());
        assert!(!gate
            .confirm(DestructiveAction::Delete, "b.txt")
            .await
            .is_approved());
        // exhausted script answers no
        assert!(!gate
            .confirm(DestructiveAction::Execute, "ls")
            .await
            .is_approved());

        assert_eq!(
            confirmer.prompts(),
            vec![
                "Delete 'a.txt'? (y/n) ".to_string(),
                "Delete 'b.txt'? (y/n) ".to_string(),
                "Run command 'ls'? (y/n) ".to_string(),
            ]
        );
    }
}
