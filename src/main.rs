use std::path::PathBuf;

use clap::Parser;

use amphibian_broker::config::BrokerConfig;

/// Local agent-orchestration broker.
#[derive(Debug, Parser)]
#[command(name = "amphibian-broker", version, about)]
struct Cli {
    /// Path to broker.yaml (default: $AMPHIBIAN_CONFIG, then upward search)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the listen address from the config
    #[arg(long)]
    bind: Option<String>,

    /// Log to stderr instead of the data-dir log file
    #[arg(long)]
    log_stderr: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    amphibian_broker::init_tracing(cli.log_stderr);

    let (mut config, path) = BrokerConfig::discover(cli.config.as_deref())?;
    match &path {
        Some(path) => tracing::info!(path = %path.display(), "loaded config"),
        None => tracing::info!("no broker.yaml found, using defaults"),
    }
    if let Some(bind) = cli.bind {
        config.bind = bind;
    }

    if let Err(e) = amphibian_broker::run(config).await {
        tracing::error!(error = %e, "broker exited with error");
        return Err(e);
    }
    Ok(())
}
