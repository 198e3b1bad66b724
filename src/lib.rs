pub mod cli;
pub mod config;
pub mod gateway;
pub mod intent;
pub mod registry;
pub mod resolver;
pub mod telemetry;

use std::{path::PathBuf, sync::Arc};

use anyhow::Result;

use crate::config::{Settings, default_config_path};
use crate::intent::ParseError;
use crate::registry::Registry;
use crate::resolver::{MappingResolver, Resolution, StoreFallback};

/// Primary orchestrator tying settings, the mapping registry and the
/// resolver together. Hosts (CLI, gateway) construct one of these and route
/// every resolution through it.
pub struct IntentBridge {
    settings: Settings,
    registry_path: Option<PathBuf>,
    resolver: MappingResolver,
}

impl IntentBridge {
    /// Construct a bridge using explicit settings, loading the registry from
    /// its configured path and seeding the default registry file if missing.
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let registry_path = settings.resolve_registry_path()?;
        registry::ensure_default_config(&registry_path)?;
        let registry = Registry::load_file(&registry_path)?;
        Ok(Self::assemble(settings, registry, Some(registry_path)))
    }

    /// Construct a bridge around an already-built registry. The registry is
    /// an injected value, so tests can run several bridges with different
    /// registries in one process.
    pub fn with_registry(settings: Settings, registry: Registry) -> Self {
        Self::assemble(settings, registry, None)
    }

    fn assemble(settings: Settings, registry: Registry, registry_path: Option<PathBuf>) -> Self {
        let fallback = StoreFallback::from_settings(&settings.fallback);
        let resolver = MappingResolver::new(Arc::new(registry), fallback);
        Self {
            settings,
            registry_path,
            resolver,
        }
    }

    /// Load configuration from the default path and bootstrap the bridge.
    pub fn bootstrap(config_path_override: Option<PathBuf>) -> Result<Self> {
        let config_path = match config_path_override {
            Some(path) => path,
            None => default_config_path()?,
        };
        let settings = Settings::load_or_default(&config_path)?;
        Self::from_settings(settings)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn resolver(&self) -> &MappingResolver {
        &self.resolver
    }

    pub fn registry(&self) -> &Registry {
        self.resolver.registry()
    }

    pub fn default_target_app(&self) -> &str {
        &self.settings.default_target_app
    }

    pub fn fallback_uri(&self) -> String {
        self.resolver.fallback_uri()
    }

    /// Parse a raw intent URI and resolve it in one step. A parse failure is
    /// returned to the caller; `resolve` is never reached in that case.
    pub fn resolve_raw(
        &self,
        raw: &str,
        target_app: Option<&str>,
    ) -> Result<Resolution, ParseError> {
        let parsed = intent::parse(raw)?;
        let target = target_app.unwrap_or(&self.settings.default_target_app);
        Ok(self.resolver.resolve_intent(&parsed, target))
    }

    /// Produce a high-level diagnostics report without mutating state.
    pub fn diagnostics(&self) -> DiagnosticsReport {
        let registry = self.registry();
        let mut domains: Vec<String> = registry.domains().map(str::to_string).collect();
        domains.sort();
        DiagnosticsReport {
            registry_path: self.registry_path.clone(),
            domains,
            mapping_count: registry.mapping_count(),
            default_target_app: self.settings.default_target_app.clone(),
            fallback_uri: self.fallback_uri(),
            listen_addr: self.settings.gateway.listen_addr.clone(),
        }
    }
}

/// Summary of the bridge's environment for `--diagnostics` output.
#[derive(Debug, Clone)]
pub struct DiagnosticsReport {
    pub registry_path: Option<PathBuf>,
    pub domains: Vec<String>,
    pub mapping_count: usize,
    pub default_target_app: String,
    pub fallback_uri: String,
    pub listen_addr: String,
}
