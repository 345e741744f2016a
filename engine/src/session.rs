//! A working session: every component built once from config and shared by
//! the CLI handlers and the REPL.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{info, warn};

use sdk::{EngineError, ToolResult};

use crate::agent::{AgentLoop, AgentState, ConversationMemory, ProjectInfo, TaskMemory};
use crate::config::Config;
use crate::confirmation::ConfirmationGate;
use crate::fs_guard::WorkspaceGuard;
use crate::history::HistoryStore;
use crate::llm::{GeminiProvider, LLMProvider};
use crate::tools::{Dispatcher, ToolContext, ToolRegistry};

/// Tasks from conversation memory included in each new task framing
const MEMORY_CONTEXT_TASKS: usize = 5;

pub struct Session {
    config: Config,
    dispatcher: Arc<Dispatcher>,
    agent: Option<AgentLoop>,
    history: HistoryStore,
    memory: ConversationMemory,
    project: ProjectInfo,
}

impl Session {
    /// Build a session talking to Gemini. A missing API key is not fatal:
    /// tool commands still work, goals report the missing key.
    pub fn new(config: Config, gate: ConfirmationGate) -> Result<Self, EngineError> {
        let provider: Option<Arc<dyn LLMProvider>> = match config.api_key() {
            Ok(key) => Some(Arc::new(GeminiProvider::new(&config.llm, key)?)),
            Err(e) => {
                warn!("{}", e);
                None
            }
        };
        Self::with_provider(config, gate, provider)
    }

    /// Build a session around an explicit provider (or none).
    pub fn with_provider(
        config: Config,
        gate: ConfirmationGate,
        provider: Option<Arc<dyn LLMProvider>>,
    ) -> Result<Self, EngineError> {
        let guard = WorkspaceGuard::new(&config.core.workspace)?;
        let ctx = ToolContext::new(guard, gate, config.tool_settings());
        let registry = Arc::new(ToolRegistry::builtin(&ctx));
        let dispatcher = Arc::new(Dispatcher::new(registry));

        let agent = provider.map(|p| {
            AgentLoop::new(p, Arc::clone(&dispatcher), config.loop_settings())
        });

        Ok(Self {
            history: HistoryStore::new(&config.core.history_path),
            memory: ConversationMemory::new(config.core.memory_capacity),
            project: ProjectInfo::detect(&config.core.workspace),
            config,
            dispatcher,
            agent,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    pub fn project(&self) -> &ProjectInfo {
        &self.project
    }

    pub fn has_provider(&self) -> bool {
        self.agent.is_some()
    }

    /// Run one goal through the agent loop, remember it, and record it in
    /// history.
    pub async fn run_task(&mut self, goal: &str) -> Result<AgentState, EngineError> {
        let Some(agent) = &self.agent else {
            return Err(EngineError::MissingApiKey(self.config.llm.api_key_env.clone()));
        };

        let mut context = format!(
            "## Workspace\nProject type: {}",
            self.project.summary()
        );
        let recent = self.memory.recent_context(MEMORY_CONTEXT_TASKS);
        if !recent.is_empty() {
            context.push_str("\n\n");
            context.push_str(&recent);
        }

        let state = agent.run(goal, &context).await;
        info!(
            status = ?state.status(),
            iterations = state.iteration(),
            "Task finished"
        );

        self.memory.add_task(TaskMemory::from_state(&state));

        let plan = json!({
            "status": state.status(),
            "iterations": state.iteration(),
            "summary": state.summary(),
            "error": state.error(),
        });
        self.record(goal, plan, state.transcript_json()).await;

        Ok(state)
    }

    /// Normalize and dispatch a typed tool command, recording it in history.
    pub async fn run_direct(&self, line: &str, payload: &Value) -> ToolResult {
        let result = self.dispatcher.dispatch_payload(payload).await;
        self.record(line, payload.clone(), json!([result.clone()])).await;
        result
    }

    /// Append to history; a failed write is logged, never fatal.
    pub async fn record(&self, user: &str, agent_plan: Value, results: Value) {
        if let Err(e) = self.history.append(user, agent_plan, results).await {
            warn!("Could not record history: {}", e);
        }
    }
}
