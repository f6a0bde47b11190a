//! Installation settings
//!
//! Key/value metadata persisted at `<state_dir>/settings.json`. The
//! deployment keys are a denormalized copy of the last detection result, kept
//! for display only.

use crate::error::{CloudError, Result};
use hostplane_detect::DeploymentInfo;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

const SETTINGS_FILE: &str = "settings.json";

pub const DEPLOYMENT_MODE: &str = "deployment_mode";
pub const CLOUD_PROVIDER: &str = "cloud_provider";
pub const AUTO_SCALING_ENABLED: &str = "auto_scaling_enabled";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingType {
    String,
    Boolean,
    Integer,
}

impl SettingType {
    /// Infers the type of a user-supplied value
    pub fn infer(value: &str) -> Self {
        if value.parse::<bool>().is_ok() {
            SettingType::Boolean
        } else if value.parse::<i64>().is_ok() {
            SettingType::Integer
        } else {
            SettingType::String
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Setting {
    pub value: String,
    #[serde(rename = "type")]
    pub setting_type: SettingType,
    pub description: String,
    pub is_editable: bool,
}

impl Setting {
    pub fn new(value: impl Into<String>, setting_type: SettingType, description: &str) -> Self {
        Self {
            value: value.into(),
            setting_type,
            description: description.to_string(),
            is_editable: true,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.is_editable = false;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstallationSettings {
    entries: BTreeMap<String, Setting>,
}

impl InstallationSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Detection snapshot as read-only settings
    pub fn from_deployment(info: &DeploymentInfo) -> Self {
        let mut settings = Self::new();
        settings.record_deployment(info);
        settings
    }

    /// Overwrites the deployment keys with a fresh snapshot
    pub fn record_deployment(&mut self, info: &DeploymentInfo) {
        self.entries.insert(
            DEPLOYMENT_MODE.to_string(),
            Setting::new(
                info.mode.to_string(),
                SettingType::String,
                "Detected execution substrate",
            )
            .read_only(),
        );
        self.entries.insert(
            CLOUD_PROVIDER.to_string(),
            Setting::new(
                info.cloud_provider.to_string(),
                SettingType::String,
                "Detected cloud provider",
            )
            .read_only(),
        );
        self.entries.insert(
            AUTO_SCALING_ENABLED.to_string(),
            Setting::new(
                info.supports_auto_scaling.to_string(),
                SettingType::Boolean,
                "Whether workloads can be auto-scaled",
            )
            .read_only(),
        );
    }

    pub fn get(&self, key: &str) -> Option<&Setting> {
        self.entries.get(key)
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|s| s.value.as_str())
    }

    /// Sets a user value; read-only keys are rejected
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        if let Some(existing) = self.entries.get_mut(key) {
            if !existing.is_editable {
                return Err(CloudError::InvalidConfig(format!(
                    "setting '{}' is not editable",
                    key
                )));
            }
            existing.value = value.to_string();
            existing.setting_type = SettingType::infer(value);
            return Ok(());
        }

        self.entries.insert(
            key.to_string(),
            Setting::new(value, SettingType::infer(value), ""),
        );
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Setting)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Reads and writes `settings.json`
#[derive(Debug, Clone)]
pub struct SettingsStore {
    state_dir: PathBuf,
}

impl SettingsStore {
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        Self {
            state_dir: state_dir.as_ref().to_path_buf(),
        }
    }

    fn path(&self) -> PathBuf {
        self.state_dir.join(SETTINGS_FILE)
    }

    pub async fn load(&self) -> Result<InstallationSettings> {
        let path = self.path();
        if !path.exists() {
            return Ok(InstallationSettings::new());
        }
        let content = fs::read_to_string(&path).await?;
        Ok(serde_json::from_str(&content)?)
    }

    pub async fn save(&self, settings: &InstallationSettings) -> Result<()> {
        fs::create_dir_all(&self.state_dir).await?;
        let content = serde_json::to_string_pretty(settings)?;
        fs::write(self.path(), content).await?;
        tracing::debug!("Saved {} installation settings", settings.len());
        Ok(())
    }
}
