//! Tool Host: JSON-RPC over stdio to external tool providers.
//!
//! This module handles:
//! - Spawning provider processes and the capability handshake
//! - Request/response correlation over each provider's stdio
//! - Tool discovery and aggregation across all providers
//! - Forwarding tool calls with a per-call timeout
//! - Graceful shutdown of every provider
//!
//! The agent executor reaches remote brains exclusively through [`ToolHost`].

pub mod errors;
pub mod host;
pub mod lifecycle;
pub mod registry;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use errors::ToolHostError;
pub use host::ToolHost;
pub use registry::ToolCatalog;
pub use transport::{ProviderTransport, StdioTransport};
pub use types::{LaunchSpec, ToolDescriptor, ToolResult};
