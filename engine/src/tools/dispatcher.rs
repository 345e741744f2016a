//! Tool dispatcher
//!
//! Looks up the canonical tool and runs it. Whatever happens (unknown name,
//! returned error, panic, malformed response) the caller gets a
//! [`ToolResult`] envelope back.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, warn};

use sdk::{ToolInvocation, ToolResult};

use super::normalizer::normalize;
use super::{ToolRegistry, TASK_COMPLETE};

pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run one canonical invocation.
    pub async fn dispatch(&self, invocation: &ToolInvocation) -> ToolResult {
        let Some(tool) = self
            .registry
            .get(&invocation.name)
            .filter(|_| invocation.name != TASK_COMPLETE)
        else {
            warn!(tool = %invocation.name, "Dispatch of unknown tool");
            return ToolResult::tool_not_found(&invocation.name);
        };

        debug!(tool = %invocation.name, args = invocation.args.len(), "Dispatching tool");
        let outcome = AssertUnwindSafe(tool.call(invocation)).catch_unwind().await;

        match outcome {
            Ok(Ok(raw)) => ToolResult::from_raw(raw),
            Ok(Err(e)) => {
                warn!(tool = %invocation.name, error = %e, "Tool returned an error");
                ToolResult::runtime_error(e)
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!(tool = %invocation.name, %message, "Tool panicked");
                ToolResult::runtime_error(message)
            }
        }
    }

    /// Normalize a loose payload, then dispatch it.
    pub async fn dispatch_payload(&self, payload: &Value) -> ToolResult {
        match normalize(payload, &self.registry) {
            Ok(invocation) => self.dispatch(&invocation).await,
            Err(rejection) => rejection.into_result(),
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "tool panicked".to_string()
    }
}
