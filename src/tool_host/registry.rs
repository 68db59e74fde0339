//! Provider registry and aggregated tool catalog.
//!
//! Providers are keyed by id. Each entry owns its transport handle, its
//! subprocess (if any) and the capability descriptor from its handshake.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::process::Child;

use super::lifecycle::{self, ProviderInfo};
use super::transport::ProviderTransport;
use super::types::ToolDescriptor;

// ─── ProviderEntry ──────────────────────────────────────────────────────────

/// A connected provider.
pub struct ProviderEntry {
    pub id: String,
    pub transport: Arc<dyn ProviderTransport>,
    /// Owned exclusively; `None` for providers attached over an existing channel.
    process: Option<Child>,
    pub info: ProviderInfo,
}

impl ProviderEntry {
    pub fn new(
        id: &str,
        transport: Arc<dyn ProviderTransport>,
        process: Option<Child>,
        info: ProviderInfo,
    ) -> Self {
        Self {
            id: id.to_string(),
            transport,
            process,
            info,
        }
    }

    /// Whether this entry owns a subprocess.
    pub fn has_process(&self) -> bool {
        self.process.is_some()
    }

    /// Tear the provider down. Idempotent.
    pub async fn shutdown(&mut self) {
        if let Some(mut process) = self.process.take() {
            lifecycle::shutdown_process(&self.id, self.transport.as_ref(), &mut process).await;
        } else {
            let _ = self.transport.notify("shutdown", None).await;
        }
    }
}

// ─── ProviderRegistry ───────────────────────────────────────────────────────

/// Explicit registry of connected providers, keyed by provider id.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, ProviderEntry>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry, returning the one it replaced.
    pub fn insert(&mut self, entry: ProviderEntry) -> Option<ProviderEntry> {
        self.providers.insert(entry.id.clone(), entry)
    }

    pub fn remove(&mut self, id: &str) -> Option<ProviderEntry> {
        self.providers.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&ProviderEntry> {
        self.providers.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.providers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Sorted provider ids.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn entries(&self) -> impl Iterator<Item = &ProviderEntry> {
        self.providers.values()
    }

    /// Remove every entry (caller shuts them down).
    pub fn drain(&mut self) -> Vec<ProviderEntry> {
        self.providers.drain().map(|(_, entry)| entry).collect()
    }
}

// ─── ToolCatalog ────────────────────────────────────────────────────────────

/// Read-only aggregated view of every provider's tools.
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    tools: Vec<ToolDescriptor>,
}

impl ToolCatalog {
    pub fn new(tools: Vec<ToolDescriptor>) -> Self {
        Self { tools }
    }

    /// Look up a tool by provider and name.
    pub fn find(&self, provider_id: &str, name: &str) -> Option<&ToolDescriptor> {
        self.tools
            .iter()
            .find(|t| t.provider_id == provider_id && t.name == name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// One-line summary for logs, e.g. `"3 tools: jules (1), stitch (2)"`.
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return "no provider tools available".to_string();
        }

        let mut counts: Vec<(&str, usize)> = Vec::new();
        for tool in &self.tools {
            match counts.iter_mut().find(|(id, _)| *id == tool.provider_id) {
                Some((_, n)) => *n += 1,
                None => counts.push((tool.provider_id.as_str(), 1)),
            }
        }
        counts.sort_by(|a, b| a.0.cmp(b.0));

        let parts: Vec<String> = counts
            .iter()
            .map(|(id, n)| format!("{id} ({n})"))
            .collect();
        format!("{} tools: {}", self.len(), parts.join(", "))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
