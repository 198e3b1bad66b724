use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::registry::default_registry_path;
use crate::resolver::{FALLBACK_CATEGORY, FALLBACK_SEARCH_TERM, FALLBACK_STORE_BASE};

/// User configuration for the Waylink resolver and its hosts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Target application assumed when a caller does not name one.
    #[serde(default = "default_target_app")]
    pub default_target_app: String,
    #[serde(default)]
    pub gateway: GatewaySettings,
    #[serde(default)]
    pub registry: RegistrySettings,
    #[serde(default)]
    pub fallback: FallbackSettings,
}

fn default_target_app() -> String {
    "magicpin".into()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_target_app: default_target_app(),
            gateway: GatewaySettings::default(),
            registry: RegistrySettings::default(),
            fallback: FallbackSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from disk, writing defaults if missing.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("Unable to read config at {}", path.display()))?;
            let parsed: Self = serde_json::from_str(&raw)
                .with_context(|| format!("Malformed config at {}", path.display()))?;
            Ok(parsed)
        } else {
            let settings = Self::default();
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create config directory {}", parent.display())
                })?;
            }
            let serialised = serde_json::to_string_pretty(&settings)?;
            fs::write(path, serialised)
                .with_context(|| format!("Failed to write default config to {}", path.display()))?;
            Ok(settings)
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory {}", parent.display())
            })?;
        }
        let serialised = serde_json::to_string_pretty(self)?;
        fs::write(path, serialised)
            .with_context(|| format!("Failed to persist config to {}", path.display()))
    }

    /// Resolve the path of the mapping registry file.
    pub fn resolve_registry_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.registry.config_path {
            return Ok(path.clone());
        }
        default_registry_path()
    }
}

/// HTTP gateway listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySettings {
    #[serde(default = "GatewaySettings::default_listen_addr")]
    pub listen_addr: String,
    /// Optional dedicated Prometheus listener.
    #[serde(default)]
    pub metrics_listen: Option<String>,
}

impl GatewaySettings {
    fn default_listen_addr() -> String {
        "127.0.0.1:3000".into()
    }
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            listen_addr: Self::default_listen_addr(),
            metrics_listen: None,
        }
    }
}

/// Location of the mapping registry file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistrySettings {
    /// Optional override for the registry.toml location.
    #[serde(default)]
    pub config_path: Option<PathBuf>,
}

/// Discovery-store link offered when no mapping matches. Defaults reproduce
/// the Play Store search for Beckn-capable applications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackSettings {
    #[serde(default = "FallbackSettings::default_store_base")]
    pub store_base: String,
    #[serde(default = "FallbackSettings::default_search_term")]
    pub search_term: String,
    #[serde(default = "FallbackSettings::default_category")]
    pub category: String,
}

impl FallbackSettings {
    fn default_store_base() -> String {
        FALLBACK_STORE_BASE.into()
    }

    fn default_search_term() -> String {
        FALLBACK_SEARCH_TERM.into()
    }

    fn default_category() -> String {
        FALLBACK_CATEGORY.into()
    }
}

impl Default for FallbackSettings {
    fn default() -> Self {
        Self {
            store_base: Self::default_store_base(),
            search_term: Self::default_search_term(),
            category: Self::default_category(),
        }
    }
}

/// Default path of `waylink.json` under the platform config directory.
pub fn default_config_path() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("io", "waylink", "Waylink")
        .context("Unable to resolve platform config directory")?;
    Ok(dirs.config_dir().join("waylink.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_or_default_writes_defaults_once() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("waylink.json");

        let settings = Settings::load_or_default(&path).expect("load ok");
        assert!(path.exists());
        assert_eq!(settings.default_target_app, "magicpin");
        assert_eq!(settings.gateway.listen_addr, "127.0.0.1:3000");

        let reloaded = Settings::load_or_default(&path).expect("reload ok");
        assert_eq!(reloaded.fallback.search_term, "beckn");
    }

    #[test]
    fn partial_config_fills_missing_sections() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("waylink.json");
        fs::write(&path, r#"{"default_target_app": "shopapp"}"#).expect("write ok");

        let settings = Settings::load_or_default(&path).expect("load ok");
        assert_eq!(settings.default_target_app, "shopapp");
        assert_eq!(settings.fallback.category, "apps");
        assert!(settings.gateway.metrics_listen.is_none());
    }

    #[test]
    fn registry_path_override_wins() {
        let mut settings = Settings::default();
        settings.registry.config_path = Some(PathBuf::from("/tmp/custom-registry.toml"));
        let resolved = settings.resolve_registry_path().expect("resolve ok");
        assert_eq!(resolved, PathBuf::from("/tmp/custom-registry.toml"));
    }

    #[test]
    fn malformed_config_is_rejected() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("waylink.json");
        fs::write(&path, "{not json").expect("write ok");
        assert!(Settings::load_or_default(&path).is_err());
    }
}
