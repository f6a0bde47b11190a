//! Form submissions translated into provider calls
//!
//! Scaling toggles are logically independent: each one is attempted even if
//! an earlier one failed, and nothing is retried. Database provisioning keeps
//! a persisted record so an in-flight instance is never provisioned twice.

use crate::action::ApplyResult;
use crate::database::{
    InstanceStatus, ManagedDatabaseInstance, ManagedDatabaseRequest, ProvisionResult,
};
use crate::error::{CloudError, Result};
use crate::manager::{CloudProviderManager, ManagedDatabaseManager};
use crate::provider::{ManagedDatabaseProvider, ScalingProvider};
use crate::scaling::{HorizontalScaling, ScalingConfig, ScalingTarget, VerticalScaling};
use crate::secret::SecretCipher;
use crate::state::InstanceStore;
use hostplane_detect::{DeploymentInfo, ProviderKind};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HorizontalToggle {
    Enable(HorizontalScaling),
    Disable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerticalToggle {
    Enable(VerticalScaling),
    Disable,
}

/// A scaling form submission; unset fields are left untouched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalingForm {
    pub horizontal: Option<HorizontalToggle>,
    pub vertical: Option<VerticalToggle>,
    pub replicas: Option<u32>,
}

impl ScalingForm {
    pub fn is_empty(&self) -> bool {
        self.horizontal.is_none() && self.vertical.is_none() && self.replicas.is_none()
    }
}

/// Current scaling state as shown to the user
#[derive(Debug, Clone, Serialize)]
pub struct ScalingStatus {
    pub provider: ProviderKind,
    pub config: ScalingConfig,
    pub replicas: u32,
    pub supports_vertical_scaling: bool,
}

pub struct ScalingOrchestrator<'a> {
    manager: &'a CloudProviderManager,
    info: DeploymentInfo,
}

impl<'a> ScalingOrchestrator<'a> {
    pub fn new(manager: &'a CloudProviderManager, info: DeploymentInfo) -> Self {
        Self { manager, info }
    }

    fn resolve(&self, target: &ScalingTarget) -> Result<Arc<dyn ScalingProvider>> {
        self.manager.get_provider(target, &self.info).ok_or_else(|| {
            let reason = if !self.info.supports_auto_scaling {
                format!(
                    "auto-scaling is unavailable ({} on {})",
                    self.info.mode, self.info.cloud_provider
                )
            } else {
                let name = target
                    .provider_hint
                    .map(|k| k.to_string())
                    .unwrap_or_else(|| self.info.cloud_provider.to_string());
                format!("no scaling adapter registered for {}", name)
            };
            CloudError::ProviderNotSupported(reason)
        })
    }

    pub async fn status(&self, target: &ScalingTarget) -> Result<ScalingStatus> {
        let provider = self.resolve(target)?;
        let config = provider.get_scaling_config(target).await?;
        let replicas = provider.get_current_replicas(target).await?;
        Ok(ScalingStatus {
            provider: provider.kind(),
            config,
            replicas,
            supports_vertical_scaling: provider.supports_vertical_scaling(),
        })
    }

    #[instrument(skip_all, fields(workload = %target))]
    pub async fn apply(&self, target: &ScalingTarget, form: &ScalingForm) -> ApplyResult {
        let started = Instant::now();
        let mut result = ApplyResult::new();

        let provider = match self.resolve(target) {
            Ok(provider) => provider,
            Err(e) => {
                warn!(error = %e, "No scaling provider");
                result.add_failure("provider", &e);
                return result;
            }
        };

        if let Some(toggle) = form.horizontal {
            let outcome = match toggle {
                HorizontalToggle::Enable(policy) => provider
                    .enable_horizontal_scaling(target, &policy)
                    .await
                    .map(|_| {
                        format!(
                            "HPA {}-{} replicas at {}% CPU",
                            policy.min_replicas, policy.max_replicas, policy.target_cpu_percent
                        )
                    }),
                HorizontalToggle::Disable => provider
                    .disable_horizontal_scaling(target)
                    .await
                    .map(|_| "HPA removed".to_string()),
            };
            record(&mut result, "horizontal", outcome);
        }

        if let Some(toggle) = form.vertical {
            let outcome = match toggle {
                VerticalToggle::Enable(policy) => provider
                    .enable_vertical_scaling(target, &policy)
                    .await
                    .map(|_| format!("VPA in {} mode", policy.update_mode)),
                VerticalToggle::Disable => provider
                    .disable_vertical_scaling(target)
                    .await
                    .map(|_| "VPA removed".to_string()),
            };
            record(&mut result, "vertical", outcome);
        }

        if let Some(replicas) = form.replicas {
            let outcome = provider
                .scale_to_replicas(target, replicas)
                .await
                .map(|_| format!("scaled to {} replicas", replicas));
            record(&mut result, "replicas", outcome);
        }

        result.duration_ms = started.elapsed().as_millis() as u64;
        result
    }
}

fn record(result: &mut ApplyResult, action: &str, outcome: Result<String>) {
    match outcome {
        Ok(message) => {
            info!(action, %message, "Scaling change applied");
            result.add_success(action, message);
        }
        Err(e) => {
            warn!(action, error = %e, "Scaling change failed");
            result.add_failure(action, &e);
        }
    }
}

pub struct DatabaseOrchestrator<'a> {
    manager: &'a ManagedDatabaseManager,
    store: InstanceStore,
    cipher: SecretCipher,
}

impl<'a> DatabaseOrchestrator<'a> {
    pub fn new(manager: &'a ManagedDatabaseManager, store: InstanceStore, cipher: SecretCipher) -> Self {
        Self {
            manager,
            store,
            cipher,
        }
    }

    pub fn store(&self) -> &InstanceStore {
        &self.store
    }

    fn adapter(&self, kind: ProviderKind) -> Result<Arc<dyn ManagedDatabaseProvider>> {
        self.manager.get_provider(kind).ok_or_else(|| {
            CloudError::ProviderNotSupported(format!("no managed database adapter for {}", kind))
        })
    }

    async fn record(&self, id: &str) -> Result<ManagedDatabaseInstance> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| CloudError::StateError(format!("No database instance '{}'", id)))
    }

    /// Provisions an instance and persists its record
    ///
    /// A provider failure is persisted as `failed` and returned as an error. A
    /// timeout is persisted as `timed_out`; the instance may exist remotely.
    /// The `provisioning` record is claimed before the provider is called, so
    /// concurrent submissions for one name issue a single provider call.
    #[instrument(skip(self, request), fields(provider = %request.provider, name = %request.name))]
    pub async fn provision(&self, request: &ManagedDatabaseRequest) -> Result<ManagedDatabaseInstance> {
        let adapter = self.adapter(request.provider)?;
        request.validate(&adapter.instance_types(), &adapter.regions())?;

        let mut instance =
            ManagedDatabaseInstance::from_request(request).with_status(InstanceStatus::Provisioning);
        self.store.claim(instance.clone()).await?;
        info!("Provisioning managed database");

        match adapter.provision(request).await {
            Ok(ProvisionResult {
                success: true,
                endpoint: Some(endpoint),
                ..
            }) => {
                let password = endpoint
                    .generated_password
                    .clone()
                    .unwrap_or_else(|| request.credentials.password.clone());
                match self.cipher.encrypt(&password) {
                    Ok(encrypted) => instance.encrypted_password = Some(encrypted),
                    Err(e) => {
                        warn!(error = %e, "Could not store database password");
                        instance.last_error = Some(e.to_string());
                    }
                }
                if endpoint.instance_id != instance.id {
                    instance.provider_id = Some(endpoint.instance_id);
                }
                instance.host = Some(endpoint.host);
                instance.port = Some(endpoint.port);
                instance.database = endpoint.database;
                instance.set_status(InstanceStatus::Available);
                self.store.put(instance.clone()).await?;
                info!(host = ?instance.host, "Managed database available");
                Ok(instance)
            }
            Ok(result) => {
                if let Some(instance_id) = result.instance_id {
                    if instance_id != instance.id {
                        instance.provider_id = Some(instance_id);
                    }
                }
                let cause = result
                    .error
                    .unwrap_or_else(|| "provider returned no endpoint".to_string());
                instance.last_error = Some(cause.clone());
                instance.set_status(InstanceStatus::Failed);
                self.store.put(instance).await?;
                warn!(%cause, "Managed database provisioning failed");
                Err(CloudError::operation_failed(request.provider.as_str(), cause))
            }
            Err(e) => {
                let status = match &e {
                    CloudError::ProvisioningTimedOut { instance_id, .. } => {
                        if *instance_id != instance.id {
                            instance.provider_id = Some(instance_id.clone());
                        }
                        InstanceStatus::TimedOut
                    }
                    _ => InstanceStatus::Failed,
                };
                instance.last_error = Some(e.to_string());
                instance.set_status(status);
                self.store.put(instance).await?;
                warn!(error = %e, %status, "Managed database provisioning did not complete");
                Err(e)
            }
        }
    }

    /// Tears an instance down; on failure the previous status is restored
    #[instrument(skip(self))]
    pub async fn deprovision(&self, id: &str) -> Result<()> {
        let instance = self.record(id).await?;
        if instance.status == InstanceStatus::Deleted {
            return Err(CloudError::InvalidConfig(format!(
                "database '{}' is already deleted",
                id
            )));
        }
        let adapter = self.adapter(instance.provider)?;
        let previous = instance.status;

        self.store.set_status(id, InstanceStatus::Deleting).await?;
        match adapter.deprovision(instance.provider_ref()).await {
            Ok(()) => {
                self.store.set_status(id, InstanceStatus::Deleted).await?;
                info!("Managed database deleted");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Managed database deletion failed");
                self.store.set_status(id, previous).await?;
                Err(e)
            }
        }
    }

    /// Queries the provider and records the answer
    ///
    /// This is the explicit re-check for `timed_out` records.
    pub async fn refresh_status(&self, id: &str) -> Result<InstanceStatus> {
        let instance = self.record(id).await?;
        let adapter = self.adapter(instance.provider)?;
        let status = adapter.instance_status(instance.provider_ref()).await?;
        if status != instance.status {
            info!(id, from = %instance.status, to = %status, "Database status changed");
            self.store.set_status(id, status).await?;
        }
        Ok(status)
    }

    pub async fn test_connection(&self, id: &str) -> Result<bool> {
        let instance = self.record(id).await?;
        let endpoint = instance.endpoint().ok_or_else(|| {
            CloudError::InvalidConfig(format!("database '{}' has no endpoint yet", id))
        })?;
        self.adapter(instance.provider)?
            .test_connection(&endpoint)
            .await
    }

    /// Decrypted password for an authorized caller
    pub async fn connection_password(&self, id: &str) -> Result<String> {
        self.record(id).await?.decrypt_password(&self.cipher)
    }

    pub async fn list(&self) -> Result<Vec<ManagedDatabaseInstance>> {
        self.store.list().await
    }
}
