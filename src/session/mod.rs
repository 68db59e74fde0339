//! Session: the authenticated client connection.
//!
//! - `protocol`: JSON frame types in both directions
//! - `manager`: token check, single active session, task state machine
//! - `server`: Axum WebSocket + health endpoints

pub mod errors;
pub mod manager;
pub mod protocol;
pub mod server;

// Re-exports for convenience
pub use errors::SessionError;
pub use manager::{SessionEnd, SessionManager, SessionState};
pub use protocol::{ClientEvent, ServerEvent, Status};
pub use server::{build_router, AppState};
