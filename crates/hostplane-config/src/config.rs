//! `hostplane.kdl` model and parser
//!
//! ```kdl
//! state-dir "/var/lib/hostplane"
//! encryption-key "base64..."
//! timeouts { command 120; provisioning 300; metadata 2 }
//! provider "aws" { region "us-east-1"; cluster "prod"; profile "default" }
//! provider "ovh" { endpoint "ovh-eu"; service-name "..."; kube-id "..." }
//! ```

use crate::error::{ConfigError, Result};
use hostplane_detect::ProviderKind;
use kdl::{KdlDocument, KdlNode};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENCRYPTION_KEY_ENV: &str = "HOSTPLANE_ENCRYPTION_KEY";
pub const STATE_DIR_ENV: &str = "HOSTPLANE_STATE_DIR";

/// External call timeouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Any single CLI or API call
    pub command: Duration,
    /// Waiting for a database to become available
    pub provisioning: Duration,
    /// Cloud metadata probe
    pub metadata: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            command: Duration::from_secs(120),
            provisioning: Duration::from_secs(300),
            metadata: Duration::from_secs(2),
        }
    }
}

/// One `provider` block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub region: Option<String>,
    pub cluster: Option<String>,
    /// kube context used for scaling commands
    pub context: Option<String>,
    pub kubeconfig: Option<PathBuf>,
    /// Provider-specific keys (`profile`, `resource-group`, `token-env`, ...)
    pub settings: BTreeMap<String, String>,
}

impl ProviderConfig {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            region: None,
            cluster: None,
            context: None,
            kubeconfig: None,
            settings: BTreeMap::new(),
        }
    }

    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings.get(key).map(String::as_str)
    }
}

/// Parsed `hostplane.kdl`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PanelConfig {
    pub state_dir: Option<PathBuf>,
    /// base64 AES-256 key for stored database passwords
    pub encryption_key: Option<String>,
    pub timeouts: Timeouts,
    pub providers: BTreeMap<ProviderKind, ProviderConfig>,
    /// File the config was read from
    pub source: Option<PathBuf>,
}

impl PanelConfig {
    /// Config from the first file found, defaults when there is none, with
    /// environment overrides applied
    pub fn from_env_and_file() -> Result<Self> {
        let config = match crate::find_config_file() {
            Ok(path) => Self::load(&path)?,
            Err(ConfigError::ConfigFileNotFound) => Self::default(),
            Err(e) => return Err(e),
        };
        Ok(config.with_env_overrides())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&content)?;
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let doc: KdlDocument = content.parse()?;
        let mut config = Self::default();

        for node in doc.nodes() {
            match node.name().value() {
                "state-dir" | "state_dir" => {
                    config.state_dir = first_string(node).map(PathBuf::from);
                }
                "encryption-key" | "encryption_key" => {
                    config.encryption_key = first_string(node).map(str::to_string);
                }
                "timeouts" => config.timeouts = parse_timeouts(node)?,
                "provider" => {
                    let provider = parse_provider(node)?;
                    if config.providers.contains_key(&provider.kind) {
                        return Err(ConfigError::Invalid(format!(
                            "provider \"{}\" is configured twice",
                            provider.kind
                        )));
                    }
                    config.providers.insert(provider.kind, provider);
                }
                other => {
                    return Err(ConfigError::Invalid(format!("unknown node: {}", other)));
                }
            }
        }

        Ok(config)
    }

    /// Applies `HOSTPLANE_ENCRYPTION_KEY` and `HOSTPLANE_STATE_DIR`
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(key) = non_empty_env(ENCRYPTION_KEY_ENV) {
            self.encryption_key = Some(key);
        }
        if let Some(dir) = non_empty_env(STATE_DIR_ENV) {
            self.state_dir = Some(PathBuf::from(dir));
        }
        self
    }

    /// Configured state dir, or `.hostplane/` in the config dir
    pub fn state_dir(&self) -> Result<PathBuf> {
        match &self.state_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(crate::get_config_dir()?.join(".hostplane")),
        }
    }

    pub fn provider(&self, kind: ProviderKind) -> Option<&ProviderConfig> {
        self.providers.get(&kind)
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn first_string(node: &KdlNode) -> Option<&str> {
    node.entries().first().and_then(|e| e.value().as_string())
}

fn parse_timeouts(node: &KdlNode) -> Result<Timeouts> {
    let mut timeouts = Timeouts::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            let name = child.name().value();
            let seconds = child
                .entries()
                .first()
                .and_then(|e| e.value().as_integer())
                .filter(|v| *v > 0)
                .and_then(|v| u64::try_from(v).ok())
                .ok_or_else(|| {
                    ConfigError::Invalid(format!("timeout \"{}\" must be a positive integer", name))
                })?;
            let duration = Duration::from_secs(seconds);
            match name {
                "command" => timeouts.command = duration,
                "provisioning" => timeouts.provisioning = duration,
                "metadata" => timeouts.metadata = duration,
                other => {
                    return Err(ConfigError::Invalid(format!("unknown timeout: {}", other)));
                }
            }
        }
    }

    Ok(timeouts)
}

fn parse_provider(node: &KdlNode) -> Result<ProviderConfig> {
    let name = first_string(node)
        .ok_or_else(|| ConfigError::Invalid("provider requires a name".to_string()))?;
    let kind: ProviderKind = name
        .parse()
        .map_err(|e| ConfigError::Invalid(format!("{}", e)))?;

    let mut provider = ProviderConfig::new(kind);

    if let Some(children) = node.children() {
        for child in children.nodes() {
            let value = first_string(child).map(str::to_string);
            match child.name().value() {
                "region" => provider.region = value,
                "cluster" => provider.cluster = value,
                "context" => provider.context = value,
                "kubeconfig" => provider.kubeconfig = value.map(PathBuf::from),
                other => {
                    if let Some(value) = value {
                        provider.settings.insert(other.to_string(), value);
                    }
                }
            }
        }
    }

    Ok(provider)
}
