//! Session error types.

use thiserror::Error;

/// Errors handled at the session boundary.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The connection presented a missing or wrong token.
    #[error("unauthorized connection")]
    Unauthorized,

    /// A task arrived while another is executing.
    #[error("Agent is busy.")]
    Busy,

    /// An inbound frame could not be decoded.
    #[error("malformed frame: {reason}")]
    MalformedFrame { reason: String },
}
