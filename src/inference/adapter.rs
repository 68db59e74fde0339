//! Streaming inference adapter.
//!
//! Turns a callback-driven [`InferenceBridge`] into a single awaitable
//! generation with an optional per-chunk observer. The repeated callback is
//! adapted into a finite channel of events that ends on the bridge's terminal
//! signal.

use std::sync::Arc;

use tokio::sync::mpsc;

use super::bridge::InferenceBridge;
use super::errors::InferenceError;
use super::types::ChatReply;
use crate::agent_core::types::ConversationMessage;

enum BridgeEvent {
    Chunk(String),
    Failed(String),
    Done,
}

/// Awaitable facade over an optional local inference bridge.
#[derive(Clone, Default)]
pub struct StreamingAdapter {
    bridge: Option<Arc<dyn InferenceBridge>>,
}

impl StreamingAdapter {
    pub fn new(bridge: Option<Arc<dyn InferenceBridge>>) -> Self {
        Self { bridge }
    }

    /// Whether an inference capability was supplied.
    pub fn is_available(&self) -> bool {
        self.bridge.is_some()
    }

    /// Generate the full text for `prompt`.
    pub async fn generate(&self, prompt: &str) -> Result<String, InferenceError> {
        self.generate_with(prompt, |_| {}).await
    }

    /// Generate the full text for `prompt`, passing each chunk to `on_chunk`
    /// in the order the bridge emits them.
    ///
    /// The first error reported by the bridge fails the call; anything the
    /// bridge sends after that (or after `done`) is discarded.
    pub async fn generate_with<F>(&self, prompt: &str, mut on_chunk: F) -> Result<String, InferenceError>
    where
        F: FnMut(&str) + Send,
    {
        let bridge = self.bridge.as_ref().ok_or(InferenceError::BridgeUnavailable)?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut finished = false;
        bridge.inference(
            prompt.to_string(),
            Box::new(move |error, chunk, done| {
                if finished {
                    return;
                }
                if let Some(reason) = error {
                    finished = true;
                    let _ = tx.send(BridgeEvent::Failed(reason));
                    return;
                }
                if let Some(chunk) = chunk {
                    let _ = tx.send(BridgeEvent::Chunk(chunk));
                }
                if done {
                    finished = true;
                    let _ = tx.send(BridgeEvent::Done);
                }
            }),
        );

        let mut text = String::new();
        while let Some(event) = rx.recv().await {
            match event {
                BridgeEvent::Chunk(chunk) => {
                    on_chunk(&chunk);
                    text.push_str(&chunk);
                }
                BridgeEvent::Failed(reason) => {
                    tracing::warn!(error = %reason, "local inference failed");
                    return Err(InferenceError::Inference { reason });
                }
                BridgeEvent::Done => return Ok(text),
            }
        }

        // Sender dropped without a terminal signal.
        Err(InferenceError::StreamClosed)
    }

    /// Generate a reply to a conversation.
    pub async fn chat(&self, messages: &[ConversationMessage]) -> Result<ChatReply, InferenceError> {
        self.chat_with(messages, |_| {}).await
    }

    /// [`chat`](Self::chat) with a per-chunk observer.
    pub async fn chat_with<F>(
        &self,
        messages: &[ConversationMessage],
        on_chunk: F,
    ) -> Result<ChatReply, InferenceError>
    where
        F: FnMut(&str) + Send,
    {
        let prompt = flatten_prompt(messages);
        let content = self.generate_with(&prompt, on_chunk).await?;
        Ok(ChatReply { content })
    }
}

/// Flatten a conversation into one prompt: `role: content` lines followed by
/// an `assistant:` cue.
pub fn flatten_prompt(messages: &[ConversationMessage]) -> String {
    let mut prompt = messages
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n");
    prompt.push_str("\nassistant:");
    prompt
}

// ─── Tests ───────────────────────────────────────────────────────────────────
