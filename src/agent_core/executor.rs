//! AgentExecutor: per-task orchestration.
//!
//! Records the task in memory, asks the router for a brain, dispatches to the
//! local inference adapter or a tool provider, streams progress logs, and
//! records the answer. Dispatch failures are absorbed here: the caller always
//! gets a result string.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::errors::AgentError;
use super::memory::ConversationMemory;
use super::router::{RouteTarget, TaskRouter};
use super::types::{ConversationMessage, LogEntry, LogSink, LogType};
use crate::inference::types::Role;
use crate::inference::StreamingAdapter;
use crate::tool_host::ToolHost;

/// Returned when the routed brain cannot be resolved to a call strategy.
pub const FALLBACK_RESPONSE: &str = "I cannot handle this request locally.";

/// Returned when dispatch to a brain fails.
pub const FAILURE_RESPONSE: &str = "I encountered an error while processing your request.";

/// Runs one task to completion, streaming progress to `on_log`.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task: &str, on_log: LogSink) -> String;
}

pub struct AgentExecutor {
    memory: Mutex<ConversationMemory>,
    router: TaskRouter,
    tools: Arc<RwLock<ToolHost>>,
    inference: StreamingAdapter,
    stream_thoughts: bool,
}

impl AgentExecutor {
    pub fn new(
        memory: ConversationMemory,
        router: TaskRouter,
        tools: Arc<RwLock<ToolHost>>,
        inference: StreamingAdapter,
    ) -> Self {
        Self {
            memory: Mutex::new(memory),
            router,
            tools,
            inference,
            stream_thoughts: false,
        }
    }

    /// Forward local-model tokens to the client as `thought` logs.
    pub fn with_stream_thoughts(mut self, enabled: bool) -> Self {
        self.stream_thoughts = enabled;
        self
    }

    /// Copy of the current conversation window.
    pub fn history(&self) -> Vec<ConversationMessage> {
        self.memory().snapshot()
    }

    fn memory(&self) -> MutexGuard<'_, ConversationMemory> {
        // Never held across an await; a poisoned lock still holds valid data.
        self.memory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn dispatch(
        &self,
        target: RouteTarget,
        task: &str,
        history: &[ConversationMessage],
        on_log: &mut LogSink,
    ) -> Result<String, AgentError> {
        match target {
            RouteTarget::Default => {
                let reply = if self.stream_thoughts {
                    self.inference
                        .chat_with(history, |chunk| {
                            on_log(LogEntry::new(LogType::Thought, chunk))
                        })
                        .await?
                } else {
                    self.inference.chat(history).await?
                };
                Ok(reply.content)
            }
            RouteTarget::Provider {
                provider_id,
                tool_name,
            } => {
                on_log(LogEntry::new(
                    LogType::Tool,
                    format!("Calling {provider_id}.{tool_name}..."),
                ));
                let tools = self.tools.read().await;
                let result = tools
                    .call_tool(
                        &provider_id,
                        &tool_name,
                        serde_json::json!({ "prompt": task }),
                    )
                    .await?;
                Ok(result.text())
            }
        }
    }
}

#[async_trait]
impl TaskExecutor for AgentExecutor {
    async fn execute(&self, task: &str, mut on_log: LogSink) -> String {
        let history = {
            let mut memory = self.memory();
            memory.add(Role::User, task);
            memory.snapshot()
        };
        let context = &history[..history.len().saturating_sub(1)];

        on_log(LogEntry::new(LogType::Thought, "Analyzing request..."));

        let decision = self.router.route(task, Some(context));
        tracing::info!(brain = %decision.brain_id, reason = %decision.reason, "task routed");
        on_log(LogEntry::new(LogType::Info, decision.reason.clone()));

        let result = match self.router.resolve(&decision) {
            None => {
                tracing::warn!(brain = %decision.brain_id, "routed brain has no binding");
                FALLBACK_RESPONSE.to_string()
            }
            Some(target) => match self.dispatch(target, task, &history, &mut on_log).await {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(brain = %decision.brain_id, error = %e, "task dispatch failed");
                    on_log(LogEntry::new(LogType::Error, format!("Error: {e}")));
                    FAILURE_RESPONSE.to_string()
                }
            },
        };

        self.memory().add(Role::Assistant, result.as_str());
        result
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
