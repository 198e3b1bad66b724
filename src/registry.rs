use std::{
    collections::{HashMap, HashSet},
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// Structural problems in the mapping registry. Detected eagerly at load so a
/// bad deployment fails at startup instead of resolving incorrectly later.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("registry contains a domain entry with an empty name")]
    EmptyDomain,
    #[error("duplicate domain entry '{0}'")]
    DuplicateDomain(String),
    #[error("domain '{0}' declares a mapping with an empty target app")]
    EmptyTarget(String),
    #[error("duplicate target app '{target}' under domain '{domain}'")]
    DuplicateTarget { domain: String, target: String },
    #[error("mapping '{domain}' -> '{target}' has an empty base URI")]
    EmptyBaseUri { domain: String, target: String },
    #[error("mapping '{domain}' -> '{target}' declares an empty source field")]
    EmptySourceField { domain: String, target: String },
    #[error("duplicate source field '{field}' in mapping '{domain}' -> '{target}'")]
    DuplicateSourceField {
        domain: String,
        target: String,
        field: String,
    },
}

/// One `source -> dest` query-field rename inside a mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRename {
    pub source: String,
    pub dest: String,
}

/// A registered rule translating one domain's fields into one target
/// application's deep-link scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolMapping {
    pub target_app: String,
    pub base_uri: String,
    /// Declaration order is significant: output fields follow this order.
    pub field_map: Vec<FieldRename>,
}

/// Read-only mapping registry, keyed by domain then target app. Built once at
/// startup from `registry.toml` and shared behind an `Arc`; runtime reload is
/// a wholesale swap of the whole value.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    domains: HashMap<String, HashMap<String, ProtocolMapping>>,
}

impl Registry {
    /// Validate a parsed configuration and build the lookup tables.
    pub fn from_config(config: RegistryConfig) -> Result<Self, ConfigError> {
        let mut domains: HashMap<String, HashMap<String, ProtocolMapping>> = HashMap::new();

        for domain in config.domains {
            let name = domain.name.trim().to_string();
            if name.is_empty() {
                return Err(ConfigError::EmptyDomain);
            }
            if domains.contains_key(&name) {
                return Err(ConfigError::DuplicateDomain(name));
            }

            let mut apps = HashMap::new();
            for app in domain.apps {
                let target = app.target.trim().to_string();
                if target.is_empty() {
                    return Err(ConfigError::EmptyTarget(name));
                }
                if apps.contains_key(&target) {
                    return Err(ConfigError::DuplicateTarget {
                        domain: name,
                        target,
                    });
                }
                if app.base_uri.trim().is_empty() {
                    return Err(ConfigError::EmptyBaseUri {
                        domain: name,
                        target,
                    });
                }

                let mut seen_sources = HashSet::new();
                let mut field_map = Vec::with_capacity(app.fields.len());
                for field in app.fields {
                    if field.source.is_empty() {
                        return Err(ConfigError::EmptySourceField {
                            domain: name,
                            target,
                        });
                    }
                    if !seen_sources.insert(field.source.clone()) {
                        return Err(ConfigError::DuplicateSourceField {
                            domain: name,
                            target,
                            field: field.source,
                        });
                    }
                    let dest = field.dest.unwrap_or_else(|| field.source.clone());
                    field_map.push(FieldRename {
                        source: field.source,
                        dest,
                    });
                }

                apps.insert(
                    target.clone(),
                    ProtocolMapping {
                        target_app: target,
                        base_uri: app.base_uri,
                        field_map,
                    },
                );
            }

            domains.insert(name, apps);
        }

        Ok(Self { domains })
    }

    /// Read and validate a registry file.
    pub fn load_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Unable to read mapping registry at {}", path.display()))?;
        let config: RegistryConfig = toml::from_str(&raw)
            .with_context(|| format!("Malformed mapping registry at {}", path.display()))?;
        Self::from_config(config)
            .with_context(|| format!("Invalid mapping registry at {}", path.display()))
    }

    /// Find the mapping registered for `domain` and `target_app`, if any.
    /// Both lookups are exact string matches.
    pub fn lookup(&self, domain: &str, target_app: &str) -> Option<&ProtocolMapping> {
        self.domains.get(domain)?.get(target_app)
    }

    pub fn domain_count(&self) -> usize {
        self.domains.len()
    }

    pub fn mapping_count(&self) -> usize {
        self.domains.values().map(HashMap::len).sum()
    }

    pub fn domains(&self) -> impl Iterator<Item = &str> + '_ {
        self.domains.keys().map(String::as_str)
    }
}

/// Serde shape of `registry.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default, rename = "domain")]
    pub domains: Vec<DomainSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainSection {
    pub name: String,
    #[serde(default, rename = "app")]
    pub apps: Vec<AppSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSection {
    pub target: String,
    pub base_uri: String,
    #[serde(default, rename = "field")]
    pub fields: Vec<FieldSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSection {
    pub source: String,
    /// Destination field name; defaults to `source` when omitted.
    #[serde(default)]
    pub dest: Option<String>,
}

/// Outcome of writing a managed configuration file to disk.
#[derive(Debug, Clone)]
pub struct ConfigWriteOutcome {
    pub path: PathBuf,
    pub action: ConfigWriteAction,
}

/// Classification of configuration writer actions (created/updated/skipped).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigWriteAction {
    Created,
    Updated,
    Skipped,
}

const DEFAULT_REGISTRY_TEMPLATE: &str = r#"# Waylink mapping registry.
# This file is auto-generated by `waylink --write-registry-config`.
#
# Each [[domain]] block names an intent authority; each [[domain.app]] block
# maps it onto one target application's deep-link scheme. Omitting `dest` on
# a field keeps the source name.

[[domain]]
name = "webapi.magicpin.in/oms_partner/ondc"

[[domain.app]]
target = "magicpin"
base_uri = "magicpin://ondc"

[[domain.app.field]]
source = "context.bpp_id"

[[domain.app.field]]
source = "context.domain"

[[domain.app.field]]
source = "message.intent.provider.id"

[[domain.app.field]]
source = "context.action"
"#;

/// Default location of `registry.toml` under the platform config directory.
pub fn default_registry_path() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("io", "waylink", "Waylink")
        .context("Unable to resolve platform config directory")?;
    Ok(dirs.config_dir().join("registry.toml"))
}

/// Write the seeded registry template to disk.
pub fn write_default_config(path: &Path, overwrite: bool) -> Result<ConfigWriteOutcome> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create registry directory {}", parent.display())
        })?;
    }

    let existed = path.exists();
    if existed {
        if !overwrite {
            return Ok(ConfigWriteOutcome {
                path: path.to_path_buf(),
                action: ConfigWriteAction::Skipped,
            });
        }

        let current = fs::read_to_string(path).unwrap_or_default();
        if current == DEFAULT_REGISTRY_TEMPLATE {
            return Ok(ConfigWriteOutcome {
                path: path.to_path_buf(),
                action: ConfigWriteAction::Skipped,
            });
        }

        fs::write(path, DEFAULT_REGISTRY_TEMPLATE)
            .with_context(|| format!("Failed to update registry at {}", path.display()))?;
        return Ok(ConfigWriteOutcome {
            path: path.to_path_buf(),
            action: ConfigWriteAction::Updated,
        });
    }

    fs::write(path, DEFAULT_REGISTRY_TEMPLATE)
        .with_context(|| format!("Failed to write registry to {}", path.display()))?;
    Ok(ConfigWriteOutcome {
        path: path.to_path_buf(),
        action: ConfigWriteAction::Created,
    })
}

/// Seed the registry file if it does not exist yet.
pub fn ensure_default_config(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    warn!(
        "Mapping registry missing at {}. Writing defaults.",
        path.display()
    );
    let outcome = write_default_config(path, false)?;
    info!(path = %outcome.path.display(), action = ?outcome.action, "generated default mapping registry");
    Ok(())
}
