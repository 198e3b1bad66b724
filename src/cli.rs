use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser};
use serde_json::json;
use tracing::info;

use crate::IntentBridge;
use crate::config::{Settings, default_config_path};
use crate::registry;
use crate::resolver::Resolution;
use crate::telemetry;

#[derive(Parser, Debug)]
#[command(name = "waylink", version, about = "Intent URI deep-link resolver", long_about = None)]
pub struct Cli {
    /// Intent URI to resolve (e.g. beckn://webapi.magicpin.in/oms_partner/ondc?...).
    #[arg(value_name = "URI")]
    pub uri: Option<String>,

    /// Target application identifier (defaults to the configured app).
    #[arg(long, value_name = "APP")]
    pub target: Option<String>,

    /// Emit the resolution as JSON instead of plain text.
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Custom settings path (waylink.json).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override path to the mapping registry (registry.toml).
    #[arg(long, value_name = "PATH")]
    pub registry: Option<PathBuf>,

    /// Generate the default mapping registry and exit.
    #[arg(long, action = ArgAction::SetTrue)]
    pub write_registry_config: bool,

    /// Overwrite existing configuration files when writing defaults.
    #[arg(long, action = ArgAction::SetTrue)]
    pub force: bool,

    /// Print settings paths and a registry summary, then exit.
    #[arg(long, action = ArgAction::SetTrue)]
    pub diagnostics: bool,

    /// Increase logging verbosity.
    #[arg(long, action = ArgAction::SetTrue)]
    pub verbose: bool,
}

fn resolve_config_path(override_path: Option<PathBuf>) -> Result<PathBuf> {
    match override_path {
        Some(path) => Ok(path),
        None => default_config_path(),
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing(cli.verbose);

    let config_path = resolve_config_path(cli.config.clone())?;
    let mut settings = Settings::load_or_default(&config_path)
        .with_context(|| format!("Failed to load settings from {}", config_path.display()))?;
    if let Some(path) = &cli.registry {
        settings.registry.config_path = Some(path.clone());
    }

    if cli.write_registry_config {
        let path = settings.resolve_registry_path()?;
        let outcome = registry::write_default_config(&path, cli.force)?;
        info!(path = %outcome.path.display(), action = ?outcome.action, "wrote mapping registry");
        println!("{}", outcome.path.display());
        return Ok(());
    }

    let bridge = IntentBridge::from_settings(settings)?;

    if cli.diagnostics {
        print_diagnostics(&bridge, &config_path);
        return Ok(());
    }

    let Some(raw) = cli.uri.as_deref() else {
        bail!("provide an intent URI to resolve, or pass --diagnostics");
    };

    match bridge.resolve_raw(raw, cli.target.as_deref()) {
        Ok(resolution) => {
            if cli.json {
                let payload = json!({
                    "kind": resolution.kind(),
                    "uri": resolution.uri(),
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                match &resolution {
                    Resolution::Resolved(uri) => println!("{uri}"),
                    Resolution::Fallback(uri) => {
                        println!("no mapping registered for this domain/app pair");
                        println!("discovery-store fallback: {uri}");
                    }
                }
            }
            Ok(())
        }
        Err(err) => bail!("invalid intent URI: {err}"),
    }
}

fn print_diagnostics(bridge: &IntentBridge, config_path: &std::path::Path) {
    let report = bridge.diagnostics();
    println!("settings:        {}", config_path.display());
    match &report.registry_path {
        Some(path) => println!("registry:        {}", path.display()),
        None => println!("registry:        (in-memory)"),
    }
    println!("gateway listen:  {}", report.listen_addr);
    println!("default target:  {}", report.default_target_app);
    println!("fallback:        {}", report.fallback_uri);
    println!(
        "mappings:        {} across {} domain(s)",
        report.mapping_count,
        report.domains.len()
    );
    for domain in &report.domains {
        println!("  - {domain}");
    }
}
