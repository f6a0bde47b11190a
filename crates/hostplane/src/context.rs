use crate::registry;
use anyhow::{Context, anyhow};
use hostplane_cloud::{
    CloudProviderManager, DatabaseOrchestrator, InstanceStore, ManagedDatabaseManager,
    SecretCipher, SettingsStore, TokioCommandRunner,
};
use hostplane_config::PanelConfig;
use hostplane_detect::{DeploymentCache, DeploymentDetector, DetectorConfig};
use std::path::PathBuf;
use std::sync::Arc;

/// Everything a command needs, built once per invocation
pub struct AppContext {
    pub config: PanelConfig,
    pub state_dir: PathBuf,
    pub deployment: DeploymentCache,
    pub scaling: CloudProviderManager,
    pub databases: ManagedDatabaseManager,
}

impl AppContext {
    pub fn load() -> anyhow::Result<Self> {
        let config = PanelConfig::from_env_and_file().context("failed to load hostplane.kdl")?;
        if let Some(source) = &config.source {
            tracing::debug!(path = %source.display(), "Loaded configuration");
        }

        let state_dir = config.state_dir()?;
        let detector = DeploymentDetector::new(
            DetectorConfig::default().with_metadata_timeout(config.timeouts.metadata),
        );
        let (scaling, databases) =
            registry::build(&config, Arc::new(TokioCommandRunner::new()))?;

        Ok(Self {
            config,
            state_dir,
            deployment: DeploymentCache::new(detector),
            scaling,
            databases,
        })
    }

    pub fn settings_store(&self) -> SettingsStore {
        SettingsStore::new(&self.state_dir)
    }

    pub fn instance_store(&self) -> InstanceStore {
        InstanceStore::new(&self.state_dir)
    }

    /// Database orchestrator; requires the encryption key
    pub fn database_orchestrator(&self) -> anyhow::Result<DatabaseOrchestrator<'_>> {
        let key = self.config.encryption_key.as_deref().ok_or_else(|| {
            anyhow!(
                "no encryption key configured\n  Set HOSTPLANE_ENCRYPTION_KEY or add to hostplane.kdl:\n  encryption-key \"{}\"",
                SecretCipher::generate_key()
            )
        })?;
        let cipher = SecretCipher::from_base64_key(key).context("invalid encryption key")?;
        Ok(DatabaseOrchestrator::new(
            &self.databases,
            self.instance_store(),
            cipher,
        ))
    }
}
