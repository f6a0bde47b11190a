//! Google Cloud provider implementation

use crate::error::GcpError;
use crate::gcloud::Gcloud;
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

const TIERS: &[(&str, &str)] = &[
    ("db-f1-micro", "Shared core, 0.6 GB"),
    ("db-g1-small", "Shared core, 1.7 GB"),
    ("db-custom-1-3840", "1 vCPU, 3.75 GB"),
    ("db-custom-2-7680", "2 vCPUs, 7.5 GB"),
    ("db-custom-4-15360", "4 vCPUs, 15 GB"),
];

const REGIONS: &[(&str, &str)] = &[
    ("us-central1", "Iowa"),
    ("us-east1", "South Carolina"),
    ("europe-west1", "Belgium"),
    ("europe-west3", "Frankfurt"),
    ("asia-southeast1", "Singapore"),
    ("asia-northeast1", "Tokyo"),
];

/// GCP adapter settings
#[derive(Debug, Clone)]
pub struct GcpSettings {
    pub project: Option<String>,
    /// GKE cluster location (region or zone)
    pub region: Option<String>,
    /// GKE cluster name
    pub cluster: Option<String>,
    pub context: Option<String>,
    pub kubeconfig: Option<PathBuf>,
    pub command_timeout: Duration,
    pub provisioning_timeout: Duration,
}

impl Default for GcpSettings {
    fn default() -> Self {
        Self {
            project: None,
            region: None,
            cluster: None,
            context: None,
            kubeconfig: None,
            command_timeout: Duration::from_secs(120),
            provisioning_timeout: Duration::from_secs(300),
        }
    }
}

/// Google Cloud provider
pub struct GcpProvider {
    gcloud: Gcloud,
    scaler: KubernetesScaler,
    settings: GcpSettings,
}

impl GcpProvider {
    pub fn new(settings: GcpSettings, runner: Arc<dyn CommandRunner>) -> Self {
        let gcloud = Gcloud::new(
            runner.clone(),
            settings.project.clone(),
            settings.command_timeout,
        );
        let scaler = KubernetesScaler::new(ProviderKind::Gcp, runner)
            .with_context(settings.context.clone())
            .with_kubeconfig(settings.kubeconfig.clone())
            .with_timeout(settings.command_timeout)
            .with_vertical_support(true);
        Self {
            gcloud,
            scaler,
            settings,
        }
    }
}

fn instance_status(state: &str) -> InstanceStatus {
    match state {
        "RUNNABLE" | "MAINTENANCE" | "STOPPED" => InstanceStatus::Available,
        "PENDING_CREATE" => InstanceStatus::Provisioning,
        "PENDING_DELETE" => InstanceStatus::Deleting,
        "FAILED" | "SUSPENDED" => InstanceStatus::Failed,
        _ => InstanceStatus::Pending,
    }
}

fn offerings(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|(code, label)| (code.to_string(), label.to_string()))
        .collect()
}

#[async_trait]
impl ScalingProvider for GcpProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gcp
    }

    fn display_name(&self) -> &str {
        "Google Cloud"
    }

    async fn check_auth(&self) -> hostplane_cloud::Result<AuthStatus> {
        match self.gcloud.active_accounts().await {
            Ok(accounts) => match accounts.into_iter().next() {
                Some(account) => Ok(AuthStatus::ok(account.account)),
                None => Ok(AuthStatus::failed(
                    "No active gcloud account. Run: gcloud auth login",
                )),
            },
            Err(GcpError::GcloudNotFound) => Ok(AuthStatus::failed("gcloud is not installed")),
            Err(e) => Ok(AuthStatus::failed(e.to_string())),
        }
    }

    async fn update_kubeconfig(&self) -> hostplane_cloud::Result<()> {
        let (Some(cluster), Some(location)) = (
            self.settings.cluster.as_deref(),
            self.settings.region.as_deref(),
        ) else {
            return Err(CloudError::InvalidConfig(
                "gcp: cluster and region must be configured".into(),
            ));
        };
        self.gcloud
            .get_credentials(cluster, location, self.settings.kubeconfig.as_deref())
            .await?;
        info!(cluster, "Updated kubeconfig for GKE cluster");
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
impl ManagedDatabaseProvider for GcpProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gcp
    }

    fn display_name(&self) -> &str {
        "Cloud SQL"
    }

    fn instance_types(&self) -> BTreeMap<String, String> {
        offerings(TIERS)
    }

    fn regions(&self) -> BTreeMap<String, String> {
        offerings(REGIONS)
    }

    fn connect_timeout(&self) -> Duration {
        self.settings.command_timeout
    }

    async fn provision(
        &self,
        request: &ManagedDatabaseRequest,
    ) -> hostplane_cloud::Result<ProvisionResult> {
        request.validate(&self.instance_types(), &self.regions())?;

        match self
            .gcloud
            .sql_instances_create(request, self.settings.provisioning_timeout)
            .await
        {
            Ok(()) => {}
            Err(GcpError::TimedOut(_)) => {
                return Err(CloudError::ProvisioningTimedOut {
                    provider: ProviderKind::Gcp.to_string(),
                    instance_id: request.name.clone(),
                });
            }
            Err(e) => {
                warn!(error = %e, "Cloud SQL instance creation failed");
                return Ok(ProvisionResult::failed(e.to_string()));
            }
        }

        if let Err(e) = self
            .gcloud
            .sql_users_create(
                &request.name,
                &request.credentials.username,
                &request.credentials.password,
            )
            .await
        {
            return Ok(ProvisionResult::failed_after_create(
                &request.name,
                format!(
                    "instance {} was created but user {} could not be: {}",
                    request.name, request.credentials.username, e
                ),
            ));
        }

        let host = match self.gcloud.sql_instances_describe(&request.name).await {
            Ok(Some(instance)) => instance.primary_address().map(str::to_string),
            Ok(None) => None,
            Err(e) => {
                return Ok(ProvisionResult::failed_after_create(
                    &request.name,
                    e.to_string(),
                ));
            }
        };
        let Some(host) = host else {
            return Ok(ProvisionResult::failed_after_create(
                &request.name,
                format!("{} has no IP address after creation", request.name),
            ));
        };

        Ok(ProvisionResult::ok(DatabaseEndpoint::new(
            &request.name,
            host,
            request.engine.default_port(),
        )))
    }

    async fn deprovision(&self, instance_id: &str) -> hostplane_cloud::Result<()> {
        self.gcloud.sql_instances_delete(instance_id).await?;
        info!(instance_id, "Deleted Cloud SQL instance");
        Ok(())
    }

    async fn instance_status(&self, instance_id: &str) -> hostplane_cloud::Result<InstanceStatus> {
        let instance = self.gcloud.sql_instances_describe(instance_id).await?;
        Ok(instance
            .map(|i| instance_status(&i.state))
            .unwrap_or(InstanceStatus::Deleted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostplane_cloud::testing::RecordingRunner;
    use hostplane_cloud::{DatabaseCredentials, DatabaseEngine};

    const DESCRIBE: &str = r#"{
        "name": "shop-db",
        "state": "RUNNABLE",
        "ipAddresses": [{"ipAddress": "34.76.10.2", "type": "PRIMARY"}]
    }"#;

    fn provider(runner: &Arc<RecordingRunner>) -> GcpProvider {
        GcpProvider::new(
            GcpSettings {
                project: Some("acme-hosting".into()),
                region: Some("europe-west1".into()),
                cluster: Some("gke-main".into()),
                ..GcpSettings::default()
            },
            runner.clone(),
        )
    }

    fn request() -> ManagedDatabaseRequest {
        ManagedDatabaseRequest {
            name: "shop-db".into(),
            provider: ProviderKind::Gcp,
            region: "europe-west1".into(),
            instance_type: "db-custom-1-3840".into(),
            storage_gb: 10,
            engine: DatabaseEngine::Postgresql,
            engine_version: None,
            credentials: DatabaseCredentials {
                username: "shop".into(),
                password: "pa55word".into(),
            },
            ssl_required: true,
        }
    }

    #[tokio::test]
    async fn test_provision() {
        let runner = Arc::new(RecordingRunner::new());
        runner.push_success("[]").push_success("").push_success(DESCRIBE);

        let result = provider(&runner).provision(&request()).await.unwrap();
        let endpoint = result.endpoint.unwrap();
        assert_eq!(endpoint.host, "34.76.10.2");
        assert_eq!(endpoint.port, 5432);

        let lines = runner.command_lines();
        assert_eq!(
            lines[0],
            "gcloud sql instances create shop-db --database-version POSTGRES_16 --tier db-custom-1-3840 --region europe-west1 --storage-size 10GB --ssl-mode ENCRYPTED_ONLY --project acme-hosting --format=json"
        );
        assert_eq!(
            lines[1],
            "gcloud sql users create shop --instance shop-db --password **** --project acme-hosting --format=json"
        );
    }

    #[tokio::test]
    async fn test_user_creation_failure_is_reported() {
        let runner = Arc::new(RecordingRunner::new());
        runner
            .push_success("[]")
            .push_failure(1, "ERROR: (gcloud.sql.users.create) Invalid password");

        let result = provider(&runner).provision(&request()).await.unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("Invalid password"));
        assert_eq!(result.instance_id.as_deref(), Some("shop-db"));
        assert_eq!(runner.call_count(), 2);
    }

    #[tokio::test]
    async fn test_long_running_operation_times_out() {
        let runner = Arc::new(RecordingRunner::new());
        runner.push_failure(
            1,
            "ERROR: (gcloud.sql.instances.create) Operation https://sqladmin.googleapis.com/... is taking longer than expected.",
        );

        assert!(matches!(
            provider(&runner).provision(&request()).await,
            Err(CloudError::ProvisioningTimedOut { .. })
        ));
    }

    #[tokio::test]
    async fn test_check_auth_without_active_account() {
        let runner = Arc::new(RecordingRunner::new());
        runner.push_success("[]");
        let auth = provider(&runner).check_auth().await.unwrap();
        assert!(!auth.authenticated);

        runner.push_success(r#"[{"account": "ops@acme.dev", "status": "ACTIVE"}]"#);
        let auth = provider(&runner).check_auth().await.unwrap();
        assert_eq!(auth.account_info.as_deref(), Some("ops@acme.dev"));
    }

    #[tokio::test]
    async fn test_update_kubeconfig_and_delete() {
        let runner = Arc::new(RecordingRunner::new());
        let gcp = provider(&runner);

        gcp.update_kubeconfig().await.unwrap();
        gcp.deprovision("shop-db").await.unwrap();

        let lines = runner.command_lines();
        assert!(lines[0].starts_with(
            "gcloud container clusters get-credentials gke-main --location europe-west1"
        ));
        assert!(lines[1].starts_with("gcloud sql instances delete shop-db --quiet"));
    }

    #[tokio::test]
    async fn test_status_of_missing_instance() {
        let runner = Arc::new(RecordingRunner::new());
        runner.push_failure(
            1,
            "ERROR: (gcloud.sql.instances.describe) HTTPError 404: The Cloud SQL instance does not exist.",
        );
        assert_eq!(
            provider(&runner).instance_status("gone").await.unwrap(),
            InstanceStatus::Deleted
        );
    }
}
