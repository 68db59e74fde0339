//! Provider process lifecycle management.
//!
//! Spawns provider processes, performs the capability handshake, forwards
//! their stderr into the log, and shuts them down. Each provider runs as a
//! separate OS process speaking JSON-RPC over stdio.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};

use super::errors::ToolHostError;
use super::transport::{extract_result, ProviderTransport, StdioTransport};
use super::types::{
    InitializeResult, LaunchSpec, ListToolsResult, ToolDescriptor, PROTOCOL_VERSION,
};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Timeout for graceful shutdown before force-killing.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum stderr retained for failure diagnostics.
const STDERR_TAIL_LIMIT: usize = 2000;

// ─── Handshake ──────────────────────────────────────────────────────────────

/// What a provider reported about itself during the handshake.
#[derive(Debug, Clone, Default)]
pub struct ProviderInfo {
    pub server_name: Option<String>,
    pub server_version: Option<String>,
    pub protocol_version: Option<String>,
    pub tools: Vec<ToolDescriptor>,
}

/// Perform the capability handshake: `initialize`, the `initialized`
/// notification, then an initial `tools/list`.
pub async fn handshake(
    transport: &dyn ProviderTransport,
    provider_id: &str,
) -> Result<ProviderInfo, ToolHostError> {
    let params = serde_json::json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        },
    });

    let response = transport.request("initialize", Some(params)).await?;
    let init: InitializeResult =
        serde_json::from_value(extract_result(response)?).map_err(|e| {
            ToolHostError::ProviderConnect {
                provider: provider_id.to_string(),
                reason: format!("failed to parse initialize response: {e}"),
            }
        })?;

    transport.notify("notifications/initialized", None).await?;

    let tools = list_tools(transport, provider_id).await?;
    let server_info = init.server_info.unwrap_or_default();

    Ok(ProviderInfo {
        server_name: server_info.name,
        server_version: server_info.version,
        protocol_version: init.protocol_version,
        tools,
    })
}

/// Query a provider's advertised tools.
pub async fn list_tools(
    transport: &dyn ProviderTransport,
    provider_id: &str,
) -> Result<Vec<ToolDescriptor>, ToolHostError> {
    let response = transport.request("tools/list", None).await?;
    let listed: ListToolsResult =
        serde_json::from_value(extract_result(response)?).map_err(|e| {
            ToolHostError::Transport {
                provider: provider_id.to_string(),
                reason: format!("failed to parse tools/list response: {e}"),
            }
        })?;

    Ok(listed
        .tools
        .into_iter()
        .map(|tool| ToolDescriptor::from_advertised(provider_id, tool))
        .collect())
}

// ─── Spawning ────────────────────────────────────────────────────────────────

/// A provider process together with its transport and handshake result.
pub struct SpawnedProvider {
    pub process: Child,
    pub transport: Arc<StdioTransport>,
    pub info: ProviderInfo,
}

/// Spawn a provider process and perform the capability handshake.
pub async fn spawn_provider(
    provider_id: &str,
    spec: &LaunchSpec,
    handshake_timeout: Duration,
) -> Result<SpawnedProvider, ToolHostError> {
    let connect_err = |reason: String| ToolHostError::ProviderConnect {
        provider: provider_id.to_string(),
        reason,
    };

    let mut cmd = Command::new(&spec.command);
    cmd.args(&spec.args);
    for (key, value) in &spec.env {
        cmd.env(key, value);
    }
    if let Some(dir) = spec.cwd.as_deref() {
        cmd.current_dir(dir);
    }

    cmd.stdin(std::process::Stdio::piped());
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());
    cmd.kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|e| connect_err(format!("spawn '{}' failed: {e}", spec.command)))?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| connect_err("failed to capture stdin".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| connect_err("failed to capture stdout".into()))?;

    let stderr_tail = Arc::new(Mutex::new(String::new()));
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(forward_stderr(
            provider_id.to_string(),
            stderr,
            Arc::clone(&stderr_tail),
        ));
    }

    let transport = Arc::new(StdioTransport::new(provider_id, stdin, stdout));

    let outcome = tokio::time::timeout(
        handshake_timeout,
        handshake(transport.as_ref(), provider_id),
    )
    .await;

    let reason = match outcome {
        Ok(Ok(info)) => {
            return Ok(SpawnedProvider {
                process: child,
                transport,
                info,
            })
        }
        Ok(Err(e)) => e.to_string(),
        Err(_) => format!(
            "handshake timed out after {}ms",
            handshake_timeout.as_millis()
        ),
    };

    let _ = child.kill().await;
    // Give the stderr forwarder a moment to drain what the process printed.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let stderr_ctx = stderr_tail.lock().map(|s| s.clone()).unwrap_or_default();
    if !stderr_ctx.is_empty() {
        tracing::warn!(
            provider = provider_id,
            stderr = %stderr_ctx,
            "provider stderr captured on failure"
        );
    }

    Err(connect_err(format!("{reason}{}", format_stderr_suffix(&stderr_ctx))))
}

/// Forward provider stderr into the log, keeping a bounded tail for diagnostics.
async fn forward_stderr(provider_id: String, stderr: ChildStderr, tail: Arc<Mutex<String>>) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(provider = %provider_id, "{line}");
        if let Ok(mut buf) = tail.lock() {
            buf.push_str(&line);
            buf.push('\n');
            if buf.len() > STDERR_TAIL_LIMIT {
                let mut cut = buf.len() - STDERR_TAIL_LIMIT;
                while !buf.is_char_boundary(cut) {
                    cut += 1;
                }
                buf.drain(..cut);
            }
        }
    }
}

/// Format a stderr suffix for error messages (empty string if no stderr).
fn format_stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(" | stderr: {}", stderr.trim())
    }
}

/// Gracefully stop a provider process, killing it if it does not exit in time.
pub async fn shutdown_process(
    provider_id: &str,
    transport: &dyn ProviderTransport,
    process: &mut Child,
) {
    let _ = transport.notify("shutdown", None).await;

    match tokio::time::timeout(SHUTDOWN_TIMEOUT, process.wait()).await {
        Ok(Ok(status)) => {
            tracing::info!(provider = provider_id, %status, "provider exited");
        }
        _ => {
            let _ = process.kill().await;
            tracing::warn!(provider = provider_id, "provider killed after shutdown timeout");
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
