//! SessionManager: the single live client session.
//!
//! Validates the connection token, keeps track of which connection is active,
//! and drives the per-session state machine `READY ⇄ WORKING`. Only the
//! driver changes state; a finished task reports back and the driver emits
//! IDLE after it is ready for the next task.
//!
//! The driver is transport-agnostic: it consumes raw text frames from one
//! channel and produces [`ServerEvent`]s on another. The WebSocket server only
//! pumps bytes.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::errors::SessionError;
use super::protocol::{ClientEvent, ServerEvent, Status};
use crate::agent_core::types::{LogEntry, LogSink, LogType};
use crate::agent_core::TaskExecutor;

/// Message sent with the READY status.
pub const READY_MESSAGE: &str = "Broker ready.";

/// Sent when execution fails outside the executor's own error handling.
pub const UNEXPECTED_FAILURE: &str = "Task failed unexpectedly.";

/// Task state of an authenticated session.
#[derive(Debug)]
pub enum SessionState {
    Ready,
    /// A task is in flight; `generation` tells its completion apart from
    /// a stopped predecessor's.
    Working {
        generation: u64,
        handle: JoinHandle<()>,
    },
}

impl SessionState {
    pub fn is_working(&self) -> bool {
        matches!(self, SessionState::Working { .. })
    }
}

/// Why a session driver returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client stopped sending (socket closed).
    ClientClosed,
    /// A newer connection took over.
    Superseded,
}

/// Ticket for an authenticated connection.
pub struct SessionHandle {
    id: u64,
    superseded: oneshot::Receiver<()>,
}

impl SessionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }
}

struct ActiveSession {
    id: u64,
    supersede: oneshot::Sender<()>,
}

pub struct SessionManager {
    auth_token: String,
    executor: Arc<dyn TaskExecutor>,
    active: Mutex<Option<ActiveSession>>,
    next_session_id: AtomicU64,
}

impl SessionManager {
    pub fn new(auth_token: impl Into<String>, executor: Arc<dyn TaskExecutor>) -> Self {
        Self {
            auth_token: auth_token.into(),
            executor,
            active: Mutex::new(None),
            next_session_id: AtomicU64::new(1),
        }
    }

    /// Check a presented token against the shared secret.
    pub fn authorize(&self, presented: Option<&str>) -> Result<(), SessionError> {
        match presented {
            Some(token) if constant_time_eq(token.as_bytes(), self.auth_token.as_bytes()) => Ok(()),
            _ => Err(SessionError::Unauthorized),
        }
    }

    /// Register a new authenticated connection, superseding the active one.
    pub fn open_session(&self) -> SessionHandle {
        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        let previous = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(ActiveSession { id, supersede: tx });
        if let Some(previous) = previous {
            tracing::info!(previous = previous.id, session = id, "new connection supersedes active session");
            let _ = previous.supersede.send(());
        }

        SessionHandle { id, superseded: rx }
    }

    /// Id of the active session, if any.
    pub fn active_session(&self) -> Option<u64> {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|s| s.id)
    }

    fn close_session(&self, id: u64) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if active.as_ref().is_some_and(|s| s.id == id) {
            *active = None;
        }
    }

    /// Drive one session until the client goes away or is superseded.
    ///
    /// Emits `STATUS_UPDATE{READY}` first. Any in-flight task is aborted when
    /// the driver returns.
    pub async fn run(
        &self,
        session: SessionHandle,
        mut inbound: mpsc::Receiver<String>,
        outbound: mpsc::UnboundedSender<ServerEvent>,
    ) -> SessionEnd {
        let SessionHandle { id, mut superseded } = session;
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<u64>();
        let mut state = SessionState::Ready;
        let mut generation = 0u64;

        tracing::info!(session = id, "session ready");
        let _ = outbound.send(ServerEvent::StatusUpdate {
            status: Status::Ready,
            task: None,
            message: Some(READY_MESSAGE.to_string()),
        });

        let end = loop {
            tokio::select! {
                _ = &mut superseded => break SessionEnd::Superseded,

                frame = inbound.recv() => {
                    let Some(text) = frame else {
                        break SessionEnd::ClientClosed;
                    };
                    let event = match ClientEvent::parse(&text) {
                        Ok(event) => event,
                        Err(e) => {
                            tracing::warn!(session = id, error = %e, "ignoring inbound frame");
                            continue;
                        }
                    };

                    match event {
                        ClientEvent::ExecuteTask { task } => {
                            if state.is_working() {
                                tracing::info!(session = id, "rejecting task while busy");
                                let _ = outbound.send(ServerEvent::error(SessionError::Busy.to_string()));
                                continue;
                            }

                            generation += 1;
                            tracing::info!(session = id, generation, task = %task, "task started");
                            let _ = outbound.send(ServerEvent::StatusUpdate {
                                status: Status::Working,
                                task: Some(task.clone()),
                                message: None,
                            });
                            state = SessionState::Working {
                                generation,
                                handle: spawn_execution(
                                    Arc::clone(&self.executor),
                                    task,
                                    generation,
                                    outbound.clone(),
                                    done_tx.clone(),
                                ),
                            };
                        }

                        ClientEvent::StopTask => match std::mem::replace(&mut state, SessionState::Ready) {
                            SessionState::Working { generation, handle } => {
                                handle.abort();
                                tracing::info!(session = id, generation, "task stopped by client");
                                let _ = outbound.send(ServerEvent::Log(LogEntry::new(LogType::Info, "Task stopped.")));
                                let _ = outbound.send(ServerEvent::status(Status::Idle));
                            }
                            SessionState::Ready => {
                                let _ = outbound.send(ServerEvent::Log(LogEntry::new(LogType::Info, "No task is running.")));
                            }
                        },

                        ClientEvent::ProvideInput { input } => {
                            tracing::info!(session = id, input = %input, "client input received");
                            let _ = outbound.send(ServerEvent::Log(LogEntry::new(LogType::Info, "Input received.")));
                        }
                    }
                }

                Some(finished) = done_rx.recv() => {
                    // A stopped task's completion is stale: STOP already went idle.
                    if matches!(state, SessionState::Working { generation, .. } if generation == finished) {
                        state = SessionState::Ready;
                        tracing::info!(session = id, generation = finished, "task finished");
                        let _ = outbound.send(ServerEvent::status(Status::Idle));
                    }
                }
            }
        };

        if let SessionState::Working { handle, .. } = state {
            handle.abort();
        }
        self.close_session(id);
        tracing::info!(session = id, reason = ?end, "session disconnected");
        end
    }
}

/// Run one task on its own tokio task.
///
/// Sends RESULT, or ERROR when execution panics, then reports `generation`
/// on `done`.
fn spawn_execution(
    executor: Arc<dyn TaskExecutor>,
    task: String,
    generation: u64,
    outbound: mpsc::UnboundedSender<ServerEvent>,
    done: mpsc::UnboundedSender<u64>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let log_tx = outbound.clone();
        let on_log: LogSink = Box::new(move |entry| {
            let _ = log_tx.send(ServerEvent::Log(entry));
        });

        let outcome = AssertUnwindSafe(executor.execute(&task, on_log))
            .catch_unwind()
            .await;

        match outcome {
            Ok(result) => {
                let _ = outbound.send(ServerEvent::Result { result });
            }
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(generation, reason = %reason, "task execution panicked");
                let _ = outbound.send(ServerEvent::error(UNEXPECTED_FAILURE));
            }
        }

        let _ = done.send(generation);
    })
}

/// Compare without short-circuiting on the first differing byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

// ─── Tests ───────────────────────────────────────────────────────────────────
