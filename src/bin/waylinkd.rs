use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Parser};
use tracing::info;
use waylink::IntentBridge;
use waylink::config::{Settings, default_config_path};
use waylink::gateway::GatewayDaemon;
use waylink::telemetry;

#[derive(Parser, Debug)]
#[command(name = "waylinkd", version, about = "Waylink intent resolver gateway", long_about = None)]
struct Args {
    /// Override path to the Waylink settings file (waylink.json).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override path to the mapping registry (registry.toml).
    #[arg(long, value_name = "PATH")]
    registry: Option<PathBuf>,

    /// Override the gateway listen address.
    #[arg(long, value_name = "ADDR")]
    listen: Option<String>,

    /// Increase logging verbosity.
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

fn resolve_config_path(override_path: Option<PathBuf>) -> Result<PathBuf> {
    match override_path {
        Some(path) => Ok(path),
        None => default_config_path(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    telemetry::init_tracing(args.verbose);

    let config_path = resolve_config_path(args.config)?;
    let mut settings = Settings::load_or_default(&config_path)?;

    if let Some(path) = args.registry {
        settings.registry.config_path = Some(path);
    }
    if let Some(listen) = args.listen {
        settings.gateway.listen_addr = listen;
    }

    let gateway_settings = settings.gateway.clone();
    let bridge = IntentBridge::from_settings(settings)?;
    info!(config = %config_path.display(), "Starting Waylink daemon");

    let daemon = GatewayDaemon::new(gateway_settings, bridge)?;
    daemon.run().await
}
