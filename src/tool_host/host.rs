//! Tool Host: high-level interface over every connected provider.
//!
//! Connects providers, aggregates their tool catalogs, and forwards tool
//! invocations. This is the API the agent executor uses.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;

use super::errors::ToolHostError;
use super::lifecycle;
use super::registry::{ProviderEntry, ProviderRegistry, ToolCatalog};
use super::transport::{extract_result, ProviderTransport};
use super::types::{LaunchSpec, ToolDescriptor, ToolResult};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Default timeout for a tool call (ms).
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 30_000;

/// Default timeout for the capability handshake (ms).
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 30_000;

// ─── ToolHost ───────────────────────────────────────────────────────────────

/// Manages provider lifecycles and routes tool calls.
pub struct ToolHost {
    providers: ProviderRegistry,
    call_timeout: Duration,
    handshake_timeout: Duration,
}

impl Default for ToolHost {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(DEFAULT_CALL_TIMEOUT_MS),
            Duration::from_millis(DEFAULT_HANDSHAKE_TIMEOUT_MS),
        )
    }
}

impl ToolHost {
    pub fn new(call_timeout: Duration, handshake_timeout: Duration) -> Self {
        Self {
            providers: ProviderRegistry::new(),
            call_timeout,
            handshake_timeout,
        }
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────

    /// Spawn a provider process and perform the capability handshake.
    ///
    /// On success the provider is queryable for tools. A provider already
    /// registered under `id` is shut down and replaced.
    pub async fn connect_provider(
        &mut self,
        id: &str,
        spec: &LaunchSpec,
    ) -> Result<(), ToolHostError> {
        let spawned = lifecycle::spawn_provider(id, spec, self.handshake_timeout).await?;
        let transport: Arc<dyn ProviderTransport> = spawned.transport;
        self.register(ProviderEntry::new(
            id,
            transport,
            Some(spawned.process),
            spawned.info,
        ))
        .await;
        Ok(())
    }

    /// Attach a provider reachable over an already-open channel.
    pub async fn attach_provider(
        &mut self,
        id: &str,
        transport: Arc<dyn ProviderTransport>,
    ) -> Result<(), ToolHostError> {
        let info = tokio::time::timeout(
            self.handshake_timeout,
            lifecycle::handshake(transport.as_ref(), id),
        )
        .await
        .map_err(|_| ToolHostError::ProviderConnect {
            provider: id.to_string(),
            reason: format!(
                "handshake timed out after {}ms",
                self.handshake_timeout.as_millis()
            ),
        })?
        .map_err(|e| match e {
            e @ ToolHostError::ProviderConnect { .. } => e,
            other => ToolHostError::ProviderConnect {
                provider: id.to_string(),
                reason: other.to_string(),
            },
        })?;

        self.register(ProviderEntry::new(id, transport, None, info))
            .await;
        Ok(())
    }

    async fn register(&mut self, entry: ProviderEntry) {
        tracing::info!(
            provider = %entry.id,
            server = ?entry.info.server_name,
            version = ?entry.info.server_version,
            tools = entry.info.tools.len(),
            subprocess = entry.has_process(),
            "tool provider connected"
        );
        if let Some(mut previous) = self.providers.insert(entry) {
            tracing::info!(provider = %previous.id, "replacing previously connected provider");
            previous.shutdown().await;
        }
    }

    /// Spawn several providers concurrently.
    ///
    /// Returns the providers that failed to connect; they are simply absent
    /// from the host afterwards.
    pub async fn connect_all(
        &mut self,
        specs: Vec<(String, LaunchSpec)>,
    ) -> Vec<(String, ToolHostError)> {
        let handshake_timeout = self.handshake_timeout;
        let attempts = specs.into_iter().map(|(id, spec)| async move {
            let outcome = lifecycle::spawn_provider(&id, &spec, handshake_timeout).await;
            (id, outcome)
        });

        let mut errors = Vec::new();
        for (id, outcome) in join_all(attempts).await {
            match outcome {
                Ok(spawned) => {
                    let transport: Arc<dyn ProviderTransport> = spawned.transport;
                    self.register(ProviderEntry::new(
                        &id,
                        transport,
                        Some(spawned.process),
                        spawned.info,
                    ))
                    .await;
                }
                Err(e) => errors.push((id, e)),
            }
        }
        errors
    }

    /// Shut down one provider.
    pub async fn disconnect_provider(&mut self, id: &str) -> bool {
        match self.providers.remove(id) {
            Some(mut entry) => {
                entry.shutdown().await;
                true
            }
            None => false,
        }
    }

    /// Shut down every provider.
    pub async fn shutdown_all(&mut self) {
        for mut entry in self.providers.drain() {
            entry.shutdown().await;
        }
    }

    // ─── Tools ───────────────────────────────────────────────────────────

    /// Query every provider concurrently and concatenate their tools.
    ///
    /// A provider that fails or times out contributes zero tools.
    pub async fn get_all_tools(&self) -> Vec<ToolDescriptor> {
        let timeout = self.call_timeout;
        let queries = self.providers.entries().map(|entry| async move {
            let outcome =
                tokio::time::timeout(timeout, lifecycle::list_tools(entry.transport.as_ref(), &entry.id))
                    .await;
            match outcome {
                Ok(Ok(tools)) => tools,
                Ok(Err(e)) => {
                    tracing::warn!(provider = %entry.id, error = %e, "tools/list failed, skipping provider");
                    Vec::new()
                }
                Err(_) => {
                    tracing::warn!(
                        provider = %entry.id,
                        timeout_ms = timeout.as_millis() as u64,
                        "tools/list timed out, skipping provider"
                    );
                    Vec::new()
                }
            }
        });

        let mut per_provider: Vec<(String, Vec<ToolDescriptor>)> = Vec::new();
        let ids: Vec<String> = self.providers.entries().map(|e| e.id.clone()).collect();
        for (id, tools) in ids.into_iter().zip(join_all(queries).await) {
            per_provider.push((id, tools));
        }
        // Stable order across calls.
        per_provider.sort_by(|a, b| a.0.cmp(&b.0));
        per_provider.into_iter().flat_map(|(_, tools)| tools).collect()
    }

    /// Aggregated catalog built from a fresh `get_all_tools` query.
    pub async fn catalog(&self) -> ToolCatalog {
        ToolCatalog::new(self.get_all_tools().await)
    }

    /// Forward a tool call to `provider_id`.
    pub async fn call_tool(
        &self,
        provider_id: &str,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolResult, ToolHostError> {
        let entry = self
            .providers
            .get(provider_id)
            .ok_or_else(|| ToolHostError::UnknownProvider {
                provider: provider_id.to_string(),
            })?;

        let start = Instant::now();
        let params = serde_json::json!({
            "name": tool_name,
            "arguments": arguments,
        });

        let response = tokio::time::timeout(
            self.call_timeout,
            entry.transport.request("tools/call", Some(params)),
        )
        .await
        .map_err(|_| ToolHostError::Timeout {
            provider: provider_id.to_string(),
            tool: tool_name.to_string(),
            timeout_ms: self.call_timeout.as_millis() as u64,
        })??;

        let invocation_err = |reason: String| ToolHostError::ToolInvocation {
            provider: provider_id.to_string(),
            tool: tool_name.to_string(),
            reason,
        };

        let value = extract_result(response).map_err(|e| invocation_err(e.to_string()))?;
        let result: ToolResult = serde_json::from_value(value)
            .map_err(|e| invocation_err(format!("malformed tool result: {e}")))?;

        tracing::info!(
            provider = provider_id,
            tool = tool_name,
            is_error = result.is_error,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "tool call finished"
        );

        if result.is_error {
            return Err(invocation_err(result.text()));
        }
        Ok(result)
    }

    // ─── Status ──────────────────────────────────────────────────────────

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    pub fn is_connected(&self, provider_id: &str) -> bool {
        self.providers.contains(provider_id)
    }

    /// Sorted ids of connected providers.
    pub fn provider_ids(&self) -> Vec<String> {
        self.providers.ids()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
