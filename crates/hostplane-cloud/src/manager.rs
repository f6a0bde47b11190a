//! Provider registries
//!
//! Both registries are filled once at startup and passed by reference to
//! their consumers. Lookups take `&self` only, so a fully built registry can
//! be shared across tasks without locking.

use crate::error::{CloudError, Result};
use crate::provider::{ManagedDatabaseProvider, ScalingProvider};
use crate::scaling::ScalingTarget;
use hostplane_detect::{DeploymentInfo, ProviderKind};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Registry of scaling adapters
#[derive(Default)]
pub struct CloudProviderManager {
    providers: BTreeMap<ProviderKind, Arc<dyn ScalingProvider>>,
}

impl CloudProviderManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an adapter, replacing any previous one for the same kind
    pub fn register(&mut self, provider: Arc<dyn ScalingProvider>) {
        let kind = provider.kind();
        if self.providers.insert(kind, provider).is_some() {
            debug!(%kind, "Replaced scaling provider");
        }
    }

    /// Adapter for a target in the current environment
    ///
    /// The target's provider hint wins over the detected cloud. Returns `None`
    /// when auto-scaling is unavailable or nothing is registered for the
    /// resolved provider.
    pub fn get_provider(
        &self,
        target: &ScalingTarget,
        info: &DeploymentInfo,
    ) -> Option<Arc<dyn ScalingProvider>> {
        if !info.supports_auto_scaling {
            debug!(%target, mode = %info.mode, cloud = %info.cloud_provider, "Auto-scaling unavailable");
            return None;
        }

        let kind = target.provider_hint.or(info.cloud_provider.kind())?;
        self.get_provider_by_kind(kind)
    }

    pub fn get_provider_by_kind(&self, kind: ProviderKind) -> Option<Arc<dyn ScalingProvider>> {
        self.providers.get(&kind).cloned()
    }

    /// Registered provider kinds, sorted
    pub fn registered(&self) -> Vec<ProviderKind> {
        self.providers.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ProviderKind, &Arc<dyn ScalingProvider>)> {
        self.providers.iter()
    }
}

/// Registry of managed database adapters
#[derive(Default)]
pub struct ManagedDatabaseManager {
    providers: BTreeMap<ProviderKind, Arc<dyn ManagedDatabaseProvider>>,
}

impl ManagedDatabaseManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an adapter; one without offerings is a configuration error
    pub fn register(&mut self, provider: Arc<dyn ManagedDatabaseProvider>) -> Result<()> {
        let kind = provider.kind();
        if provider.instance_types().is_empty() {
            return Err(CloudError::InvalidConfig(format!(
                "{} offers no database instance types",
                kind
            )));
        }
        if provider.regions().is_empty() {
            return Err(CloudError::InvalidConfig(format!(
                "{} offers no database regions",
                kind
            )));
        }
        self.providers.insert(kind, provider);
        Ok(())
    }

    pub fn get_providers(&self) -> &BTreeMap<ProviderKind, Arc<dyn ManagedDatabaseProvider>> {
        &self.providers
    }

    /// Lookup by user-supplied name; unknown names yield `None`
    pub fn get_provider_by_name(&self, name: &str) -> Option<Arc<dyn ManagedDatabaseProvider>> {
        let kind = name.parse::<ProviderKind>().ok()?;
        self.get_provider(kind)
    }

    pub fn get_provider(&self, kind: ProviderKind) -> Option<Arc<dyn ManagedDatabaseProvider>> {
        self.providers.get(&kind).cloned()
    }

    pub fn is_provider_supported(&self, name: &str) -> bool {
        self.get_provider_by_name(name).is_some()
    }

    pub fn get_available_instance_types(&self, name: &str) -> BTreeMap<String, String> {
        self.get_provider_by_name(name)
            .map(|p| p.instance_types())
            .unwrap_or_default()
    }

    pub fn get_available_regions(&self, name: &str) -> BTreeMap<String, String> {
        self.get_provider_by_name(name)
            .map(|p| p.regions())
            .unwrap_or_default()
    }
}
