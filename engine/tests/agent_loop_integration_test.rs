//! Integration tests for the agent loop
//!
//! Drives `AgentLoop` against a mocked Gemini endpoint with the real built-in
//! tools rooted in a temp workspace:
//! - budget exhaustion
//! - clean completion
//! - destructive decline
//! - unknown tools
//! - rate limiting

use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::{
    matchers::{method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

use codegen_engine::agent::{AgentLoop, LoopSettings, LoopStatus, TranscriptEntry};
use codegen_engine::config::LLMConfig;
use codegen_engine::confirmation::{ConfirmationGate, Confirmer, ScriptedConfirmer};
use codegen_engine::fs_guard::WorkspaceGuard;
use codegen_engine::llm::{GeminiProvider, LLMProvider};
use codegen_engine::tools::{Dispatcher, ToolContext, ToolRegistry, ToolSettings};

const MODEL: &str = "gemini-test";
const ENDPOINT: &str = "/models/gemini-test:generateContent";

fn function_call(name: &str, args: Value) -> Value {
    json!({
        "candidates": [{
            "content": {
                "role": "model",
                "parts": [{"functionCall": {"name": name, "args": args}}]
            }
        }]
    })
}

fn text_reply(text: &str) -> Value {
    json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": text}]}
        }]
    })
}

/// Queue one response; earlier mounts are used first.
async fn respond_once(server: &MockServer, body: Value) {
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .and(query_param("key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .up_to_n_times(1)
        .mount(server)
        .await;
}

fn dispatcher_in(workspace: &TempDir, answers: &[bool]) -> (Arc<Dispatcher>, Arc<ScriptedConfirmer>) {
    let guard = WorkspaceGuard::new(workspace.path()).unwrap();
    let confirmer = Arc::new(ScriptedConfirmer::new(answers.iter().copied()));
    let gate = ConfirmationGate::new(Arc::clone(&confirmer) as Arc<dyn Confirmer>, false);
    let settings = ToolSettings {
        todos_path: workspace.path().join(".todos.json"),
        ..ToolSettings::default()
    };
    let ctx = ToolContext::new(guard, gate, settings);
    let registry = Arc::new(ToolRegistry::builtin(&ctx));
    (Arc::new(Dispatcher::new(registry)), confirmer)
}

fn agent(server: &MockServer, dispatcher: Arc<Dispatcher>, max_iterations: u32) -> AgentLoop {
    let config = LLMConfig {
        model: MODEL.to_string(),
        base_url: server.uri(),
        timeout_secs: 5,
        ..LLMConfig::default()
    };
    let provider: Arc<dyn LLMProvider> = Arc::new(GeminiProvider::new(&config, "test-key").unwrap());
    AgentLoop::new(
        provider,
        dispatcher,
        LoopSettings {
            max_iterations,
            ..LoopSettings::default()
        },
    )
}

#[tokio::test]
async fn test_budget_exhaustion_stops_at_max_iterations() {
    let server = MockServer::start().await;
    let workspace = TempDir::new().unwrap();
    std::fs::write(workspace.path().join("main.rs"), "fn main() {}\n").unwrap();

    // Always a valid, non-completing call
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(function_call("list_files", json!({"path": "."}))),
        )
        .mount(&server)
        .await;

    let (dispatcher, _) = dispatcher_in(&workspace, &[]);
    let state = agent(&server, dispatcher, 2)
        .run("refactor every file in the repository", "")
        .await;

    assert_eq!(state.status(), LoopStatus::Failed);
    assert!(!state.is_completed());
    assert_eq!(state.iteration(), 2);
    assert_eq!(state.error(), Some("max iterations reached"));
    assert_eq!(state.tool_result_count(), 2);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_clean_completion_writes_file() {
    let server = MockServer::start().await;
    let workspace = TempDir::new().unwrap();

    respond_once(
        &server,
        function_call("write_file", json!({"path": "notes.txt", "content": "hello"})),
    )
    .await;
    respond_once(
        &server,
        function_call("task_complete", json!({"summary": "Created notes.txt"})),
    )
    .await;

    let (dispatcher, confirmer) = dispatcher_in(&workspace, &[]);
    let state = agent(&server, dispatcher, 10)
        .run("create file notes.txt with content hello", "")
        .await;

    assert_eq!(state.status(), LoopStatus::Completed);
    assert_eq!(state.iteration(), 2);
    assert_eq!(state.summary().as_deref(), Some("Created notes.txt"));
    assert_eq!(
        std::fs::read_to_string(workspace.path().join("notes.txt")).unwrap(),
        "hello"
    );
    // Creating a new file is not an overwrite
    assert!(confirmer.prompts().is_empty());

    // The second prompt carries the first observation
    let requests = server.received_requests().await.unwrap();
    let second: Value = serde_json::from_slice(&requests[1].body).unwrap();
    let prompt = second["contents"][0]["parts"][0]["text"].as_str().unwrap();
    assert!(prompt.contains("Wrote to notes.txt"));
    assert!(second["systemInstruction"]["parts"][0]["text"]
        .as_str()
        .unwrap()
        .contains("task_complete"));
}

#[tokio::test]
async fn test_text_payload_fallback_is_normalized() {
    let server = MockServer::start().await;
    let workspace = TempDir::new().unwrap();

    respond_once(
        &server,
        text_reply("```json\n{\"tool\": \"write\", \"args\": [\"a.txt\", \"x\"]}\n```"),
    )
    .await;
    respond_once(&server, text_reply(r#"{"tool": "task_complete", "args": ["done"]}"#)).await;

    let (dispatcher, _) = dispatcher_in(&workspace, &[]);
    let state = agent(&server, dispatcher, 5).run("write a.txt", "").await;

    assert!(state.is_completed());
    assert_eq!(
        std::fs::read_to_string(workspace.path().join("a.txt")).unwrap(),
        "x"
    );
}

#[tokio::test]
async fn test_unknown_tool_is_observed_and_loop_recovers() {
    let server = MockServer::start().await;
    let workspace = TempDir::new().unwrap();

    respond_once(&server, function_call("frobnicate", json!({}))).await;
    respond_once(
        &server,
        function_call("task_complete", json!({"summary": "gave up on frobnicate"})),
    )
    .await;

    let (dispatcher, _) = dispatcher_in(&workspace, &[]);
    let state = agent(&server, dispatcher, 5).run("frobnicate things", "").await;

    assert!(state.is_completed());
    let first = state
        .transcript()
        .iter()
        .find_map(|entry| match entry {
            TranscriptEntry::ToolResult { tool, result, .. } if tool == "frobnicate" => {
                Some(result.clone())
            }
            _ => None,
        })
        .unwrap();
    assert!(!first.success);
    assert_eq!(first.output, json!("Tool not found: frobnicate"));

    // A reflection thought precedes the second decision
    assert!(state
        .transcript()
        .iter()
        .any(|entry| matches!(entry, TranscriptEntry::Thought { iteration: 2, .. })));
}

#[tokio::test]
async fn test_rate_limit_fails_task_with_flag() {
    let server = MockServer::start().await;
    let workspace = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {"code": 429, "message": "Resource has been exhausted", "status": "RESOURCE_EXHAUSTED"}
        })))
        .mount(&server)
        .await;

    let (dispatcher, _) = dispatcher_in(&workspace, &[]);
    let state = agent(&server, dispatcher, 5).run("anything", "").await;

    assert_eq!(state.status(), LoopStatus::Failed);
    assert!(state.rate_limited());
    assert_eq!(state.iteration(), 1);
    assert!(state.error().unwrap().starts_with("no tool call returned"));
    assert_eq!(state.tool_result_count(), 0);
}

#[tokio::test]
async fn test_destructive_decline_keeps_file() {
    let workspace = TempDir::new().unwrap();
    std::fs::write(workspace.path().join("keep.txt"), "precious").unwrap();

    let (dispatcher, confirmer) = dispatcher_in(&workspace, &[false]);
    let result = dispatcher
        .dispatch_payload(&json!({"tool": "delete", "args": ["keep.txt"]}))
        .await;

    assert!(!result.success);
    assert_eq!(result.output, json!("Deletion cancelled."));
    assert!(workspace.path().join("keep.txt").exists());
    assert_eq!(confirmer.prompts().len(), 1);
}

#[tokio::test]
async fn test_dispatch_unknown_tool_envelope() {
    let workspace = TempDir::new().unwrap();
    let (dispatcher, _) = dispatcher_in(&workspace, &[]);

    let result = dispatcher
        .dispatch_payload(&json!({"tool": "frobnicate"}))
        .await;

    assert!(!result.success);
    assert_eq!(result.output, json!("Tool not found: frobnicate"));
    assert!(result.meta.is_empty());
}
