//! Local inference: the default brain.
//!
//! This module handles:
//! - The callback-style inference capability (`bridge`)
//! - Adapting it into awaitable generate/chat calls (`adapter`)
//! - A concrete bridge to an OpenAI-compatible local server (`http_bridge`)
//! - SSE stream parsing for that server (`streaming`)

pub mod adapter;
pub mod bridge;
pub mod errors;
pub mod http_bridge;
pub mod streaming;
pub mod types;

// Re-exports for convenience
pub use adapter::StreamingAdapter;
pub use bridge::{BridgeCallback, InferenceBridge};
pub use errors::InferenceError;
pub use http_bridge::HttpInferenceBridge;
pub use types::{ChatReply, Role};
