//! JSON-RPC transport to a tool provider.
//!
//! Line-delimited JSON (one object per line) over a byte pipe, normally the
//! provider process's stdin/stdout. A background reader task routes every
//! response to the request that owns its `id`, so concurrent calls on the same
//! provider never receive each other's results.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::errors::ToolHostError;
use super::types::{error_codes, JsonRpcRequest, JsonRpcResponse};

// ─── Request ID Generator ────────────────────────────────────────────────────

/// Global monotonic request ID counter.
static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Generate a unique request ID.
pub fn next_request_id() -> u64 {
    NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

// ─── Transport Trait ────────────────────────────────────────────────────────

/// Request/response channel to one provider.
#[async_trait]
pub trait ProviderTransport: Send + Sync {
    /// Send a request and wait for the response carrying the same id.
    async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, ToolHostError>;

    /// Send a notification (no response expected).
    async fn notify(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), ToolHostError>;
}

// ─── Stdio Transport ────────────────────────────────────────────────────────

type PendingTable = Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Bi-directional JSON-RPC transport over a provider's stdio pipes.
pub struct StdioTransport {
    provider_id: String,
    writer: tokio::sync::Mutex<BoxedWriter>,
    pending: PendingTable,
    closed: Arc<AtomicBool>,
    reader_task: JoinHandle<()>,
}

impl StdioTransport {
    /// Create a transport and start its response reader.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new<W, R>(provider_id: &str, writer: W, reader: R) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
        R: AsyncRead + Send + Unpin + 'static,
    {
        let pending: PendingTable = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));

        let reader_task = tokio::spawn(read_responses(
            provider_id.to_string(),
            BufReader::new(reader),
            Arc::clone(&pending),
            Arc::clone(&closed),
        ));

        Self {
            provider_id: provider_id.to_string(),
            writer: tokio::sync::Mutex::new(Box::new(writer)),
            pending,
            closed,
            reader_task,
        }
    }

    /// Whether the provider closed its output stream.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of requests still waiting for a response.
    pub fn in_flight(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }

    fn transport_error(&self, reason: impl Into<String>) -> ToolHostError {
        ToolHostError::Transport {
            provider: self.provider_id.clone(),
            reason: reason.into(),
        }
    }

    async fn write_line(&self, value: &impl serde::Serialize) -> Result<(), ToolHostError> {
        let mut json = serde_json::to_string(value)
            .map_err(|e| self.transport_error(format!("failed to serialize message: {e}")))?;
        json.push('\n');

        let mut writer = self.writer.lock().await;
        writer
            .write_all(json.as_bytes())
            .await
            .map_err(|e| self.transport_error(format!("failed to write to stdin: {e}")))?;
        writer
            .flush()
            .await
            .map_err(|e| self.transport_error(format!("failed to flush stdin: {e}")))
    }
}

#[async_trait]
impl ProviderTransport for StdioTransport {
    async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, ToolHostError> {
        if self.is_closed() {
            return Err(self.transport_error("provider stdout closed (process may have exited)"));
        }

        let id = next_request_id();
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .map_err(|e| self.transport_error(format!("pending table poisoned: {e}")))?
            .insert(id, tx);

        // Removes the pending slot if this future is dropped (e.g. on timeout).
        let _guard = PendingGuard {
            pending: Arc::clone(&self.pending),
            id,
        };

        self.write_line(&JsonRpcRequest::new(id, method, params))
            .await?;

        rx.await
            .map_err(|_| self.transport_error("provider stdout closed before responding"))
    }

    async fn notify(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), ToolHostError> {
        let notification = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
        });
        self.write_line(&notification).await
    }
}

impl Drop for StdioTransport {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

struct PendingGuard {
    pending: PendingTable,
    id: u64,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(&self.id);
        }
    }
}

/// Route response lines to their waiting requests until the stream ends.
async fn read_responses<R>(
    provider_id: String,
    mut reader: BufReader<R>,
    pending: PendingTable,
    closed: Arc<AtomicBool>,
) where
    R: AsyncRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(provider = %provider_id, error = %e, "provider stdout read failed");
                break;
            }
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        // Anything that isn't a response (log output, server notifications)
        // is skipped.
        let response = match serde_json::from_str::<JsonRpcResponse>(trimmed) {
            Ok(resp) => resp,
            Err(_) => {
                tracing::trace!(provider = %provider_id, line = %trimmed, "skipping non-response line");
                continue;
            }
        };

        let waiter = pending
            .lock()
            .ok()
            .and_then(|mut p| p.remove(&response.id));
        match waiter {
            Some(tx) => {
                let _ = tx.send(response);
            }
            None => {
                tracing::debug!(provider = %provider_id, id = response.id, "response with no pending request");
            }
        }
    }

    closed.store(true, Ordering::Release);
    // Dropping the senders fails every outstanding request.
    if let Ok(mut p) = pending.lock() {
        p.clear();
    }
    tracing::info!(provider = %provider_id, "provider output stream closed");
}

// ─── Response Helpers ────────────────────────────────────────────────────────

/// Extract the result from a JSON-RPC response, converting errors to `ToolHostError`.
pub fn extract_result(response: JsonRpcResponse) -> Result<serde_json::Value, ToolHostError> {
    if let Some(err) = response.error {
        return Err(ToolHostError::Rpc {
            code: err.code,
            message: err.message,
            data: err.data,
        });
    }

    response.result.ok_or(ToolHostError::Rpc {
        code: error_codes::INTERNAL_ERROR,
        message: "response missing both result and error".into(),
        data: None,
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
