//! Shared types for the agent core.

use serde::{Deserialize, Serialize};

use crate::inference::types::Role;

// ─── Conversation Messages ──────────────────────────────────────────────────

/// A single message stored in conversation memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
    /// ISO 8601 timestamp.
    pub timestamp: String,
}

impl ConversationMessage {
    /// Create a message stamped with the current time.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

// ─── Progress Logs ──────────────────────────────────────────────────────────

/// Kind of a progress log line streamed to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogType {
    Thought,
    Tool,
    Info,
    Error,
}

/// One progress log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub text: String,
    #[serde(rename = "type")]
    pub kind: LogType,
}

impl LogEntry {
    pub fn new(kind: LogType, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind,
        }
    }
}

/// Receives progress logs while a task executes.
pub type LogSink = Box<dyn FnMut(LogEntry) + Send>;

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_entry_wire_shape() {
        let entry = LogEntry::new(LogType::Tool, "Calling jules.create_coding_session...");
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "tool");
        assert_eq!(json["text"], "Calling jules.create_coding_session...");
    }

    #[test]
    fn test_message_timestamp_is_rfc3339() {
        let msg = ConversationMessage::new(Role::User, "hello");
        assert!(chrono::DateTime::parse_from_rfc3339(&msg.timestamp).is_ok());
        assert_eq!(msg.content, "hello");
    }
}
