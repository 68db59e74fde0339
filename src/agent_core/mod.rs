//! Agent Core: per-task orchestration.
//!
//! Submodules:
//! - `memory`: Bounded rolling conversation window
//! - `router`: Keyword classifier choosing a brain per task
//! - `executor`: Routes, dispatches, and records each task
//! - `types`: Shared types across the agent core
//! - `errors`: Agent-level error types

pub mod errors;
pub mod executor;
pub mod memory;
pub mod router;
pub mod types;

// Re-exports for convenience
pub use errors::AgentError;
pub use executor::{AgentExecutor, TaskExecutor, FAILURE_RESPONSE, FALLBACK_RESPONSE};
pub use memory::ConversationMemory;
pub use router::{BrainBinding, Category, RouteDecision, RouteTarget, TaskRouter, LOCAL_BRAIN};
pub use types::{ConversationMessage, LogEntry, LogSink, LogType};
