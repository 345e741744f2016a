//! Session-level tests: a task runs through the loop, lands in history and
//! in conversation memory, and the next task sees it.

use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use codegen_engine::config::Config;
use codegen_engine::confirmation::ConfirmationGate;
use codegen_engine::handlers::{render_state, OutputFormat};
use codegen_engine::history::HistoryStore;
use codegen_engine::llm::{LLMError, LLMProvider, LLMResponse, Message};
use codegen_engine::session::Session;
use sdk::{EngineError, ToolSchema};

#[derive(Default)]
struct Recording {
    responses: Mutex<VecDeque<LLMResponse>>,
    system_prompts: Mutex<Vec<String>>,
}

impl Recording {
    fn push_call(&self, name: &str, arguments: serde_json::Value) {
        self.responses.lock().unwrap().push_back(LLMResponse::ToolCall {
            name: name.to_string(),
            arguments,
        });
    }
}

#[async_trait]
impl LLMProvider for Recording {
    fn name(&self) -> &str {
        "recording"
    }

    async fn generate(
        &self,
        messages: &[Message],
        _tools: &[ToolSchema],
    ) -> Result<LLMResponse, LLMError> {
        if let Some(system) = messages.first() {
            self.system_prompts.lock().unwrap().push(system.content.clone());
        }
        Ok(self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(LLMResponse::Empty))
    }
}

fn config_in(temp: &TempDir) -> Config {
    let mut config = Config::default();
    config.core.history_path = temp.path().join("state").join("history.json");
    config.tools.todos_path = temp.path().join(".todos.json");
    config.set_workspace(temp.path()).unwrap();
    config
}

#[tokio::test]
async fn test_task_is_recorded_and_remembered() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("Cargo.toml"), "[package]\nname = \"x\"\n").unwrap();

    let provider = Arc::new(Recording::default());
    provider.push_call("write_file", json!({"path": "notes.txt", "content": "hello"}));
    provider.push_call("task_complete", json!({"summary": "Created notes.txt"}));
    provider.push_call("task_complete", json!({"summary": "Nothing to do"}));

    let mut session = Session::with_provider(
        config_in(&temp),
        ConfirmationGate::auto_approve(),
        Some(Arc::clone(&provider) as Arc<dyn LLMProvider>),
    )
    .unwrap();
    assert!(session.has_provider());
    assert_eq!(session.project().language.as_deref(), Some("rust"));

    let state = session.run_task("create notes.txt").await.unwrap();
    assert!(state.is_completed());
    assert!(render_state(&state, OutputFormat::Text)
        .unwrap()
        .contains("completed after 2 iteration(s)"));

    assert_eq!(session.memory().len(), 1);
    let task = session.memory().tasks().next().unwrap();
    assert_eq!(task.files_created, vec!["notes.txt".to_string()]);

    let entries = HistoryStore::new(&session.config().core.history_path)
        .load(10)
        .await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].user, "create notes.txt");
    assert_eq!(entries[0].agent_plan["status"], json!("COMPLETED"));
    assert_eq!(entries[0].agent_plan["iterations"], json!(2));

    // The next task's framing carries the project and the previous task
    session.run_task("anything else?").await.unwrap();
    let prompts = provider.system_prompts.lock().unwrap();
    let last = prompts.last().unwrap();
    assert!(last.contains("Project type: rust (cargo)"));
    assert!(last.contains("## Previous Conversation (Recent Tasks)"));
    assert!(last.contains("notes.txt"));
}

#[tokio::test]
async fn test_failed_task_is_recorded_with_error() {
    let temp = TempDir::new().unwrap();
    let provider: Arc<dyn LLMProvider> = Arc::new(Recording::default());

    let mut session = Session::with_provider(
        config_in(&temp),
        ConfirmationGate::auto_approve(),
        Some(provider),
    )
    .unwrap();

    let state = session.run_task("do something").await.unwrap();
    assert!(!state.is_completed());
    assert_eq!(state.error(), Some("no tool call returned"));

    let entries = session.history().load(10).await;
    assert_eq!(entries[0].agent_plan["status"], json!("FAILED"));
    assert_eq!(entries[0].agent_plan["error"], json!("no tool call returned"));
}

#[tokio::test]
async fn test_session_without_provider_reports_missing_key() {
    let temp = TempDir::new().unwrap();
    let mut session =
        Session::with_provider(config_in(&temp), ConfirmationGate::auto_approve(), None).unwrap();

    let err = session.run_task("anything").await.unwrap_err();
    assert!(matches!(err, EngineError::MissingApiKey(ref var) if var == "GEMINI_API_KEY"));

    // Typed tool commands still work and are recorded
    std::fs::write(temp.path().join("a.txt"), "alpha").unwrap();
    let result = session
        .run_direct("read a.txt", &json!({"tool": "read", "args": ["a.txt"]}))
        .await;
    assert!(result.success);
    assert_eq!(session.history().load(5).await.len(), 1);
}

#[tokio::test]
async fn test_history_keeps_trailing_entries() {
    let temp = TempDir::new().unwrap();
    let store = HistoryStore::new(temp.path().join("history.json"));

    for i in 0..5 {
        store
            .append(&format!("task {i}"), json!({}), json!([]))
            .await
            .unwrap();
    }

    let last_two = store.load(2).await;
    assert_eq!(last_two.len(), 2);
    assert_eq!(last_two[0].user, "task 3");
    assert_eq!(last_two[1].user, "task 4");

    std::fs::write(store.path(), "{ corrupt").unwrap();
    assert!(store.load(10).await.is_empty());
}
