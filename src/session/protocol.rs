//! Session wire protocol.
//!
//! Every frame is a JSON object `{ "type": <EVENT>, "payload": {...} }`.

use serde::{Deserialize, Serialize};

use super::errors::SessionError;
use crate::agent_core::types::LogEntry;

// ─── Inbound ────────────────────────────────────────────────────────────────

/// Events the client sends.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    ExecuteTask { task: String },
    StopTask,
    ProvideInput { input: serde_json::Value },
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: serde_json::Value,
}

#[derive(Deserialize)]
struct ExecuteTaskPayload {
    task: String,
}

impl ClientEvent {
    /// Decode one text frame.
    pub fn parse(text: &str) -> Result<Self, SessionError> {
        let malformed = |reason: String| SessionError::MalformedFrame { reason };

        let frame: RawFrame =
            serde_json::from_str(text).map_err(|e| malformed(format!("invalid JSON frame: {e}")))?;

        match frame.kind.as_str() {
            "EXECUTE_TASK" => {
                let payload: ExecuteTaskPayload = serde_json::from_value(frame.payload)
                    .map_err(|e| malformed(format!("EXECUTE_TASK payload: {e}")))?;
                if payload.task.trim().is_empty() {
                    return Err(malformed("EXECUTE_TASK with empty task".into()));
                }
                Ok(ClientEvent::ExecuteTask { task: payload.task })
            }
            "STOP_TASK" => Ok(ClientEvent::StopTask),
            "PROVIDE_INPUT" => {
                let input = match frame.payload {
                    serde_json::Value::Object(mut map) if map.contains_key("input") => {
                        map.remove("input").unwrap_or_default()
                    }
                    other => other,
                };
                Ok(ClientEvent::ProvideInput { input })
            }
            other => Err(malformed(format!("unknown event type '{other}'"))),
        }
    }
}

// ─── Outbound ───────────────────────────────────────────────────────────────

/// Session status reported to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Ready,
    Working,
    Idle,
}

/// Events the broker sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerEvent {
    StatusUpdate {
        status: Status,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        task: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Log(LogEntry),
    Result {
        result: String,
    },
    Error {
        message: String,
    },
}

impl ServerEvent {
    pub fn status(status: Status) -> Self {
        ServerEvent::StatusUpdate {
            status,
            task: None,
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
