//! Tool Host error types.

use thiserror::Error;

/// Errors that can occur while hosting tool providers.
#[derive(Debug, Error)]
pub enum ToolHostError {
    /// A provider failed to spawn or to complete the capability handshake.
    #[error("failed to connect provider '{provider}': {reason}")]
    ProviderConnect { provider: String, reason: String },

    /// The addressed provider is not connected.
    #[error("unknown provider: '{provider}'")]
    UnknownProvider { provider: String },

    /// The provider answered with an error envelope (`isError: true`).
    #[error("tool '{provider}.{tool}' failed: {reason}")]
    ToolInvocation {
        provider: String,
        tool: String,
        reason: String,
    },

    /// A tool call did not complete in time.
    #[error("tool '{provider}.{tool}' timed out after {timeout_ms}ms")]
    Timeout {
        provider: String,
        tool: String,
        timeout_ms: u64,
    },

    /// Framing or I/O failure on the provider channel.
    #[error("transport error for provider '{provider}': {reason}")]
    Transport { provider: String, reason: String },

    /// Provider returned a JSON-RPC error response.
    #[error("provider error [{code}]: {message}")]
    Rpc {
        code: i32,
        message: String,
        data: Option<serde_json::Value>,
    },
}
