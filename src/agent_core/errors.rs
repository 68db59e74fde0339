//! Agent Core error types.

use thiserror::Error;

use crate::inference::InferenceError;
use crate::tool_host::ToolHostError;

/// Errors raised while dispatching a task to a brain.
///
/// These never leave the executor; they are logged, reported to the client as
/// a LOG error line and replaced by a fixed failure text.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Local inference failed.
    #[error(transparent)]
    Inference(#[from] InferenceError),

    /// A tool-provider brain failed.
    #[error(transparent)]
    Tool(#[from] ToolHostError),
}
