//! Deployment snapshot types

use crate::error::DetectError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Execution substrate the panel is running on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentMode {
    Kubernetes,
    Docker,
    Standalone,
}

impl std::fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeploymentMode::Kubernetes => write!(f, "kubernetes"),
            DeploymentMode::Docker => write!(f, "docker"),
            DeploymentMode::Standalone => write!(f, "standalone"),
        }
    }
}

impl FromStr for DeploymentMode {
    type Err = DetectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kubernetes" | "k8s" => Ok(DeploymentMode::Kubernetes),
            "docker" => Ok(DeploymentMode::Docker),
            "standalone" => Ok(DeploymentMode::Standalone),
            other => Err(DetectError::UnknownMode(other.to_string())),
        }
    }
}

/// A cloud vendor with a registered adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Aws,
    Azure,
    Gcp,
    #[serde(rename = "digitalocean")]
    DigitalOcean,
    Ovh,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 5] = [
        ProviderKind::Aws,
        ProviderKind::Azure,
        ProviderKind::Gcp,
        ProviderKind::DigitalOcean,
        ProviderKind::Ovh,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Aws => "aws",
            ProviderKind::Azure => "azure",
            ProviderKind::Gcp => "gcp",
            ProviderKind::DigitalOcean => "digitalocean",
            ProviderKind::Ovh => "ovh",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = DetectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aws" | "amazon" => Ok(ProviderKind::Aws),
            "azure" => Ok(ProviderKind::Azure),
            "gcp" | "google" => Ok(ProviderKind::Gcp),
            "digitalocean" | "do" => Ok(ProviderKind::DigitalOcean),
            "ovh" | "ovhcloud" => Ok(ProviderKind::Ovh),
            other => Err(DetectError::UnknownProvider(other.to_string())),
        }
    }
}

/// Result of cloud identification
///
/// `None` means no metadata endpoint answered. `Unknown` means something
/// answered but it matched no known vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudProvider {
    Aws,
    Azure,
    Gcp,
    #[serde(rename = "digitalocean")]
    DigitalOcean,
    Ovh,
    None,
    Unknown,
}

impl CloudProvider {
    /// The adapter kind for a recognized provider
    pub fn kind(&self) -> Option<ProviderKind> {
        match self {
            CloudProvider::Aws => Some(ProviderKind::Aws),
            CloudProvider::Azure => Some(ProviderKind::Azure),
            CloudProvider::Gcp => Some(ProviderKind::Gcp),
            CloudProvider::DigitalOcean => Some(ProviderKind::DigitalOcean),
            CloudProvider::Ovh => Some(ProviderKind::Ovh),
            CloudProvider::None | CloudProvider::Unknown => None,
        }
    }

    pub fn is_recognized(&self) -> bool {
        self.kind().is_some()
    }
}

impl From<ProviderKind> for CloudProvider {
    fn from(kind: ProviderKind) -> Self {
        match kind {
            ProviderKind::Aws => CloudProvider::Aws,
            ProviderKind::Azure => CloudProvider::Azure,
            ProviderKind::Gcp => CloudProvider::Gcp,
            ProviderKind::DigitalOcean => CloudProvider::DigitalOcean,
            ProviderKind::Ovh => CloudProvider::Ovh,
        }
    }
}

impl std::fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self, self.kind()) {
            (_, Some(kind)) => write!(f, "{}", kind),
            (CloudProvider::None, None) => write!(f, "none"),
            _ => write!(f, "unknown"),
        }
    }
}

impl FromStr for CloudProvider {
    type Err = DetectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Ok(CloudProvider::None),
            "unknown" => Ok(CloudProvider::Unknown),
            other => other.parse::<ProviderKind>().map(CloudProvider::from),
        }
    }
}

/// Snapshot of the execution environment
///
/// Built only through [`DeploymentInfo::new`], which keeps the mode flags and
/// `supports_auto_scaling` consistent with `mode` and `cloud_provider`.
/// Deserializing recomputes the flags and ignores the stored ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredDeployment")]
pub struct DeploymentInfo {
    pub mode: DeploymentMode,
    pub cloud_provider: CloudProvider,
    pub is_kubernetes: bool,
    pub is_docker: bool,
    pub is_standalone: bool,
    pub supports_auto_scaling: bool,
}

impl DeploymentInfo {
    pub fn new(mode: DeploymentMode, cloud_provider: CloudProvider) -> Self {
        let is_kubernetes = mode == DeploymentMode::Kubernetes;
        Self {
            mode,
            cloud_provider,
            is_kubernetes,
            is_docker: mode == DeploymentMode::Docker,
            is_standalone: mode == DeploymentMode::Standalone,
            supports_auto_scaling: is_kubernetes && cloud_provider.is_recognized(),
        }
    }

    /// The most conservative snapshot
    pub fn standalone() -> Self {
        Self::new(DeploymentMode::Standalone, CloudProvider::None)
    }
}

#[derive(Deserialize)]
struct StoredDeployment {
    mode: DeploymentMode,
    cloud_provider: CloudProvider,
}

impl From<StoredDeployment> for DeploymentInfo {
    fn from(stored: StoredDeployment) -> Self {
        Self::new(stored.mode, stored.cloud_provider)
    }
}

impl Default for DeploymentInfo {
    fn default() -> Self {
        Self::standalone()
    }
}
