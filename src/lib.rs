pub mod agent_core;
pub mod config;
pub mod inference;
pub mod session;
pub mod tool_host;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::RwLock;

use agent_core::{AgentExecutor, BrainBinding, ConversationMemory, TaskRouter};
use config::{BrokerConfig, InferenceConfig};
use inference::{HttpInferenceBridge, InferenceBridge, StreamingAdapter};
use session::{build_router, AppState, SessionManager};
use tool_host::ToolHost;

/// Return the platform-standard data directory for the broker.
///
/// - macOS: `~/Library/Application Support/com.amphibian.broker/`
/// - Linux: `$XDG_DATA_HOME/com.amphibian.broker/` (fallback `~/.local/share/...`)
///
/// Falls back to `~/.amphibian/` only if none of the above can be resolved.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = dirs::data_dir() {
        return dir.join("com.amphibian.broker");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".amphibian")
}

/// Initialize the tracing subscriber.
///
/// By default logs go to `<data_dir>/broker.log`:
/// 1. Rotates existing logs (broker.log → broker.log.1 → .2 → .3, keeps last 3).
/// 2. Opens a fresh broker.log with a line-flushing writer.
/// 3. Logs a startup banner with the log path.
///
/// With `log_stderr`, or when the log file cannot be opened, logs go to stderr.
pub fn init_tracing(log_stderr: bool) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("amphibian_broker=info,warn"));

    let log_dir = data_dir();
    let log_path = log_dir.join("broker.log");

    let log_file = if log_stderr {
        None
    } else {
        let _ = std::fs::create_dir_all(&log_dir);
        rotate_log_file(&log_path, 3);
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(|e| eprintln!("failed to open {}: {e}; logging to stderr", log_path.display()))
            .ok()
    };

    let log_target = match log_file {
        Some(file) => {
            fmt::fmt()
                .with_env_filter(filter)
                .with_writer(FlushingWriter::new(file))
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(false)
                .init();
            log_path.display().to_string()
        }
        None => {
            fmt::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(true)
                .init();
            "stderr".to_string()
        }
    };

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        data_dir = %log_dir.display(),
        log = %log_target,
        pid = std::process::id(),
        "=== Amphibian broker starting ==="
    );
}

/// Rotate log files: `broker.log` → `broker.log.1` → `.2` → … → `.{keep}`.
///
/// Oldest file beyond `keep` is deleted. Missing files in the chain are skipped.
fn rotate_log_file(base_path: &Path, keep: u32) {
    let oldest = format!("{}.{keep}", base_path.display());
    let _ = std::fs::remove_file(&oldest);

    for i in (1..keep).rev() {
        let from = format!("{}.{i}", base_path.display());
        let to = format!("{}.{}", base_path.display(), i + 1);
        let _ = std::fs::rename(&from, &to);
    }

    if base_path.exists() {
        let to = format!("{}.1", base_path.display());
        let _ = std::fs::rename(base_path, &to);
    }
}

/// A writer that wraps `std::fs::File` and flushes after every write,
/// so each log line is on disk even if the process is killed.
#[derive(Clone)]
struct FlushingWriter {
    file: Arc<std::sync::Mutex<std::fs::File>>,
}

impl FlushingWriter {
    fn new(file: std::fs::File) -> Self {
        Self {
            file: Arc::new(std::sync::Mutex::new(file)),
        }
    }
}

impl std::io::Write for FlushingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        let n = std::io::Write::write(&mut *f, buf)?;
        std::io::Write::flush(&mut *f)?;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        std::io::Write::flush(&mut *f)
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for FlushingWriter {
    type Writer = FlushingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

// ─── Startup ─────────────────────────────────────────────────────────────────

/// Run the broker until Ctrl-C.
///
/// Connects the configured tool providers, binds their brains in the router,
/// wires the local inference bridge, and serves the session socket.
pub async fn run(mut config: BrokerConfig) -> anyhow::Result<()> {
    if config.resolve_auth_token() {
        tracing::warn!(
            token = %config.auth_token,
            "no auth_token configured, generated one for this run"
        );
    }

    let mut host = ToolHost::new(
        Duration::from_millis(config.tool_call_timeout_ms),
        Duration::from_millis(config.handshake_timeout_ms),
    );
    let router = connect_providers(&mut host, &config).await;
    let tools = Arc::new(RwLock::new(host));

    let inference = build_inference(&config.inference).await?;
    let executor = AgentExecutor::new(
        ConversationMemory::new(config.memory_capacity),
        router,
        tools.clone(),
        inference,
    )
    .with_stream_thoughts(config.stream_thoughts);

    let manager = Arc::new(SessionManager::new(config.auth_token.clone(), Arc::new(executor)));
    let app = build_router(AppState {
        manager,
        tools: tools.clone(),
    });

    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    tracing::info!(addr = %listener.local_addr()?, "session server listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    tracing::info!("shutting down tool providers");
    tools.write().await.shutdown_all().await;

    served.context("session server failed")
}

/// Connect every eligible provider and build the router from their bindings.
///
/// Providers missing `required_env` are skipped; connection failures are
/// logged and leave the broker running without that provider.
pub async fn connect_providers(host: &mut ToolHost, config: &BrokerConfig) -> TaskRouter {
    let mut launches = Vec::new();
    for (id, provider) in &config.providers {
        let missing = provider.missing_env();
        if !missing.is_empty() {
            tracing::info!(provider = %id, missing = ?missing, "skipping provider: required env not set");
            continue;
        }
        launches.push((id.clone(), provider.launch_spec()));
    }

    for (id, error) in host.connect_all(launches).await {
        tracing::error!(provider = %id, error = %error, "provider failed to connect");
    }

    let catalog = host.catalog().await;
    tracing::info!(
        providers = host.provider_count(),
        tools = catalog.len(),
        summary = %catalog.summary(),
        "tool host ready"
    );

    let mut router = TaskRouter::new();
    for (id, provider) in &config.providers {
        let (Some(category), Some(tool)) = (provider.brain, provider.tool.as_ref()) else {
            continue;
        };
        if !host.is_connected(id) {
            continue;
        }
        if catalog.find(id, tool).is_none() {
            tracing::warn!(provider = %id, tool = %tool, "bound tool not advertised by provider");
        }
        let binding = BrainBinding::Tool {
            provider_id: id.clone(),
            tool_name: tool.clone(),
        };
        if router.register(category, id, binding) {
            tracing::info!(brain = %id, category = category.as_str(), tool = %tool, "brain registered");
        }
    }
    tracing::info!(brains = ?router.brain_ids(), "router ready");
    router
}

/// Build the local inference adapter; disabled inference yields a bridgeless adapter.
async fn build_inference(config: &InferenceConfig) -> anyhow::Result<StreamingAdapter> {
    if !config.enabled {
        tracing::info!("local inference disabled");
        return Ok(StreamingAdapter::new(None));
    }

    let bridge = HttpInferenceBridge::new(config.clone()).context("failed to build inference bridge")?;
    if bridge.health_check().await {
        tracing::info!(endpoint = bridge.base_url(), model = %config.model, "local model reachable");
    } else {
        tracing::warn!(
            endpoint = bridge.base_url(),
            "local model not reachable yet; local requests will fail until it is up"
        );
    }
    let bridge: Arc<dyn InferenceBridge> = Arc::new(bridge);
    Ok(StreamingAdapter::new(Some(bridge)))
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("received Ctrl-C"),
        Err(e) => tracing::error!(error = %e, "failed to listen for Ctrl-C"),
    }
}
