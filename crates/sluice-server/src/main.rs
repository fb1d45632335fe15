use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use sluice_config::ConfigManager;
use sluice_observability::{LogManager, MetricsCollector};
use sluice_server::reload::Overrides;
use sluice_server::{serve, shutdown_signal, AppState};
use tokio::net::TcpListener;

#[derive(Parser, Debug, Clone)]
#[command(name = "sluice-server")]
#[command(about = "Rate-limited real-time chat gateway")]
#[command(version)]
struct Cli {
    /// Config file path (default ~/.sluice/config.json)
    #[arg(long, env = "SLUICE_CONFIG")]
    config: Option<String>,

    /// Server port (overrides config)
    #[arg(long, env = "SLUICE_PORT")]
    port: Option<u16>,

    /// Log level (overrides config)
    #[arg(long, env = "SLUICE_LOG")]
    log_level: Option<String>,

    /// Default stream provider (overrides config)
    #[arg(long, env = "SLUICE_PROVIDER")]
    provider: Option<String>,

    /// Any other setting as key=value, e.g. --set server.host=0.0.0.0
    #[arg(long = "set", value_name = "KEY=VALUE")]
    settings: Vec<String>,
}

impl Cli {
    fn config_path(&self) -> anyhow::Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(sluice_config::expand_tilde(path).unwrap_or_else(|| PathBuf::from(path))),
            None => sluice_config::default_config_path().context("could not find home directory"),
        }
    }

    fn overrides(&self) -> Overrides {
        Overrides {
            port: self.port,
            log_level: self.log_level.clone(),
            provider: self.provider.clone(),
            settings: self.settings.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config_path()?;
    let manager = ConfigManager::load(&config_path)
        .await
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    // Overrides apply to this run only; the file is left untouched.
    let overrides = cli.overrides();
    let mut config = manager.snapshot().await;
    overrides
        .apply(&mut config)
        .context("invalid command line override")?;

    let logs = LogManager::init(&config.logging).context("failed to initialise logging")?;
    tracing::info!(path = %config_path.display(), overridden = !overrides.is_empty(), "config loaded");

    #[cfg(unix)]
    tokio::spawn(sluice_server::reload::reload_on_hangup(
        manager.clone(),
        overrides,
        logs,
    ));
    #[cfg(not(unix))]
    let _logs = (logs, overrides);

    let metrics = Arc::new(MetricsCollector::install().context("failed to install metrics")?);

    let bind = config.server.bind_address();
    let (state, registry_task) = AppState::build(config, metrics).await?;

    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {}", bind))?;
    serve(listener, state, registry_task, shutdown_signal()).await?;

    Ok(())
}
