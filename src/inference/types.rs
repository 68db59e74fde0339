//! Shared types for local inference.
//!
//! The request/chunk types mirror the OpenAI Chat Completions API, which is
//! what local runtimes (llama.cpp server, Ollama) speak.

use serde::{Deserialize, Serialize};

// ─── Conversation Types ──────────────────────────────────────────────────────

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a chat-style generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatReply {
    pub content: String,
}

// ─── Request Types ───────────────────────────────────────────────────────────

/// A single message in a completion request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// Request body for `POST /v1/chat/completions`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stream: bool,
}

// ─── Response Types ──────────────────────────────────────────────────────────

/// Raw SSE chunk from the OpenAI API.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

/// A single choice within a streaming chunk.
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkChoice {
    pub delta: ChunkDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// The delta (incremental update) within a chunk choice.
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkDelta {
    #[serde(default)]
    pub content: Option<String>,
    /// Chain-of-thought from reasoning models. Parsed so it doesn't trip
    /// deserialization, never surfaced.
    #[serde(default)]
    #[allow(dead_code)]
    pub reasoning: Option<String>,
}

/// One parsed stream event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamChunk {
    /// Incremental text token (if this chunk carries text).
    pub token: Option<String>,
    /// Why the model stopped: `"stop"`, `"length"`, or `None` (still going).
    pub finish_reason: Option<String>,
}

// ─── Tests ───────────────────────────────────────────────────────────────────
