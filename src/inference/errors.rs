//! Inference error types.
//!
//! Structured logging is the caller's responsibility; these types carry the
//! context needed to build meaningful log entries.

use thiserror::Error;

/// Errors that can occur during local inference.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// The adapter was constructed without an inference capability.
    #[error("local inference bridge is not available")]
    BridgeUnavailable,

    /// The bridge callback reported a failure.
    #[error("inference failed: {reason}")]
    Inference { reason: String },

    /// The bridge dropped its callback without signalling completion.
    #[error("inference stream closed before completion")]
    StreamClosed,

    /// TCP/HTTP connection to the model endpoint failed.
    #[error("connection failed to {endpoint}: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    /// Non-2xx HTTP response from the model endpoint.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// SSE stream parsing or chunk-level error.
    #[error("stream error: {reason}")]
    StreamError { reason: String },
}
