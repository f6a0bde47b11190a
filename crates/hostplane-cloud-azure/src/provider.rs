//! Azure provider implementation

use crate::az::{AzCli, FlexibleService};
use crate::error::AzureError;
use async_trait::async_trait;
use hostplane_cloud::{
    AuthStatus, CloudError, CommandRunner, DatabaseEndpoint, HorizontalScaling, InstanceStatus,
    KubernetesScaler, ManagedDatabaseProvider, ManagedDatabaseRequest, ProviderKind,
    ProvisionResult, ScalingConfig, ScalingProvider, ScalingTarget, VerticalScaling,
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const SKUS: &[(&str, &str)] = &[
    ("Standard_B1ms", "Burstable B1ms (1 vCore, 2 GiB)"),
    ("Standard_B2s", "Burstable B2s (2 vCores, 4 GiB)"),
    ("Standard_D2ds_v5", "General Purpose D2ds_v5 (2 vCores, 8 GiB)"),
    ("Standard_D4ds_v5", "General Purpose D4ds_v5 (4 vCores, 16 GiB)"),
    ("Standard_E2ds_v5", "Memory Optimized E2ds_v5 (2 vCores, 16 GiB)"),
];

const LOCATIONS: &[(&str, &str)] = &[
    ("eastus", "East US"),
    ("eastus2", "East US 2"),
    ("westus2", "West US 2"),
    ("westeurope", "West Europe"),
    ("northeurope", "North Europe"),
    ("uksouth", "UK South"),
    ("southeastasia", "Southeast Asia"),
];

/// Server parameter that enforces TLS client connections
const SECURE_TRANSPORT: &str = "require_secure_transport";

/// Azure adapter settings
#[derive(Debug, Clone)]
pub struct AzureSettings {
    /// Resource group holding the AKS cluster and database servers
    pub resource_group: Option<String>,
    /// AKS cluster name
    pub cluster: Option<String>,
    pub subscription: Option<String>,
    pub context: Option<String>,
    pub kubeconfig: Option<PathBuf>,
    pub command_timeout: Duration,
    pub provisioning_timeout: Duration,
}

impl Default for AzureSettings {
    fn default() -> Self {
        Self {
            resource_group: None,
            cluster: None,
            subscription: None,
            context: None,
            kubeconfig: None,
            command_timeout: Duration::from_secs(120),
            provisioning_timeout: Duration::from_secs(300),
        }
    }
}

/// Azure provider
pub struct AzureProvider {
    cli: AzCli,
    scaler: KubernetesScaler,
    settings: AzureSettings,
}

impl AzureProvider {
    pub fn new(settings: AzureSettings, runner: Arc<dyn CommandRunner>) -> Self {
        let cli = AzCli::new(
            runner.clone(),
            settings.subscription.clone(),
            settings.command_timeout,
        );
        let scaler = KubernetesScaler::new(ProviderKind::Azure, runner)
            .with_context(settings.context.clone())
            .with_kubeconfig(settings.kubeconfig.clone())
            .with_timeout(settings.command_timeout)
            .with_vertical_support(true);
        Self {
            cli,
            scaler,
            settings,
        }
    }

    fn resource_group(&self) -> hostplane_cloud::Result<&str> {
        self.settings
            .resource_group
            .as_deref()
            .ok_or_else(|| CloudError::InvalidConfig("azure: no resource group configured".into()))
    }
}

fn instance_status(state: &str) -> InstanceStatus {
    match state {
        "Ready" | "Starting" | "Stopping" | "Stopped" | "Updating" => InstanceStatus::Available,
        "Dropping" => InstanceStatus::Deleting,
        "Disabled" => InstanceStatus::Failed,
        _ => InstanceStatus::Provisioning,
    }
}

fn offerings(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|(code, label)| (code.to_string(), label.to_string()))
        .collect()
}

#[async_trait]
impl ScalingProvider for AzureProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Azure
    }

    fn display_name(&self) -> &str {
        "Microsoft Azure"
    }

    async fn check_auth(&self) -> hostplane_cloud::Result<AuthStatus> {
        match self.cli.account_show().await {
            Ok(account) => {
                let user = account
                    .user
                    .map(|u| u.name)
                    .unwrap_or_else(|| "unknown user".to_string());
                Ok(AuthStatus::ok(format!("{} on {} ({})", user, account.name, account.id)))
            }
            Err(AzureError::CliNotFound) => Ok(AuthStatus::failed("az CLI is not installed")),
            Err(e) => Ok(AuthStatus::failed(e.to_string())),
        }
    }

    async fn update_kubeconfig(&self) -> hostplane_cloud::Result<()> {
        let resource_group = self.resource_group()?;
        let cluster = self
            .settings
            .cluster
            .as_deref()
            .ok_or_else(|| CloudError::InvalidConfig("azure: no AKS cluster configured".into()))?;
        self.cli
            .aks_get_credentials(
                resource_group,
                cluster,
                self.settings.context.as_deref(),
                self.settings.kubeconfig.as_deref(),
            )
            .await?;
        info!(cluster, "Updated kubeconfig for AKS cluster");
        Ok(())
    }

    async fn get_scaling_config(
        &self,
        target: &ScalingTarget,
    ) -> hostplane_cloud::Result<ScalingConfig> {
        self.scaler.get_scaling_config(target).await
    }

    async fn get_current_replicas(&self, target: &ScalingTarget) -> hostplane_cloud::Result<u32> {
        self.scaler.get_current_replicas(target).await
    }

    async fn enable_horizontal_scaling(
        &self,
        target: &ScalingTarget,
        policy: &HorizontalScaling,
    ) -> hostplane_cloud::Result<()> {
        self.scaler.enable_horizontal_scaling(target, policy).await
    }

    async fn disable_horizontal_scaling(&self, target: &ScalingTarget) -> hostplane_cloud::Result<()> {
        self.scaler.disable_horizontal_scaling(target).await
    }

    fn supports_vertical_scaling(&self) -> bool {
        self.scaler.supports_vertical_scaling()
    }

    async fn enable_vertical_scaling(
        &self,
        target: &ScalingTarget,
        policy: &VerticalScaling,
    ) -> hostplane_cloud::Result<()> {
        self.scaler.enable_vertical_scaling(target, policy).await
    }

    async fn disable_vertical_scaling(&self, target: &ScalingTarget) -> hostplane_cloud::Result<()> {
        self.scaler.disable_vertical_scaling(target).await
    }

    async fn scale_to_replicas(
        &self,
        target: &ScalingTarget,
        replicas: u32,
    ) -> hostplane_cloud::Result<()> {
        self.scaler.scale_to_replicas(target, replicas).await
    }
}

#[async_trait]
impl ManagedDatabaseProvider for AzureProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Azure
    }

    fn display_name(&self) -> &str {
        "Azure Database Flexible Server"
    }

    fn instance_types(&self) -> BTreeMap<String, String> {
        offerings(SKUS)
    }

    fn regions(&self) -> BTreeMap<String, String> {
        offerings(LOCATIONS)
    }

    fn connect_timeout(&self) -> Duration {
        self.settings.command_timeout
    }

    async fn provision(
        &self,
        request: &ManagedDatabaseRequest,
    ) -> hostplane_cloud::Result<ProvisionResult> {
        request.validate(&self.instance_types(), &self.regions())?;
        let resource_group = self.resource_group()?;
        let service = FlexibleService::from(request.engine);
        let server_id = service.server_id(&request.name);

        match self
            .cli
            .flexible_server_create(resource_group, request, self.settings.provisioning_timeout)
            .await
        {
            Ok(()) => {}
            Err(AzureError::TimedOut(_)) => {
                return Err(CloudError::ProvisioningTimedOut {
                    provider: ProviderKind::Azure.to_string(),
                    instance_id: server_id,
                });
            }
            Err(e) => {
                warn!(error = %e, "Flexible server creation failed");
                return Ok(ProvisionResult::failed(e.to_string()));
            }
        }

        if !request.ssl_required {
            if let Err(e) = self
                .cli
                .flexible_server_parameter_set(
                    resource_group,
                    service,
                    &request.name,
                    SECURE_TRANSPORT,
                    "off",
                )
                .await
            {
                return Ok(ProvisionResult::failed_after_create(
                    server_id,
                    format!(
                        "server {} was created but {} could not be disabled: {}",
                        request.name, SECURE_TRANSPORT, e
                    ),
                ));
            }
        }

        let host = match self
            .cli
            .flexible_server_show(resource_group, service, &request.name)
            .await
        {
            Ok(Some(server)) => server.fully_qualified_domain_name,
            Ok(None) => None,
            Err(e) => return Ok(ProvisionResult::failed_after_create(server_id, e.to_string())),
        };
        let Some(host) = host else {
            return Ok(ProvisionResult::failed_after_create(
                server_id,
                format!("{} has no FQDN after creation", request.name),
            ));
        };

        Ok(ProvisionResult::ok(DatabaseEndpoint::new(
            server_id,
            host,
            request.engine.default_port(),
        )))
    }

    async fn deprovision(&self, instance_id: &str) -> hostplane_cloud::Result<()> {
        let resource_group = self.resource_group()?;
        let (service, name) = FlexibleService::parse_id(instance_id);
        self.cli
            .flexible_server_delete(resource_group, service, name)
            .await?;
        info!(instance_id, "Deleted flexible server");
        Ok(())
    }

    async fn instance_status(&self, instance_id: &str) -> hostplane_cloud::Result<InstanceStatus> {
        let resource_group = self.resource_group()?;
        let (service, name) = FlexibleService::parse_id(instance_id);
        let server = self
            .cli
            .flexible_server_show(resource_group, service, name)
            .await?;
        Ok(match server {
            Some(server) => instance_status(server.state.as_deref().unwrap_or_default()),
            None => InstanceStatus::Deleted,
        })
    }
}
