//! DigitalOcean provider implementation

use crate::doctl::{Database, Doctl};
use crate::error::DigitalOceanError;
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

/// Administrator every new cluster is created with
const ADMIN_USER: &str = "doadmin";

const SIZES: &[(&str, &str)] = &[
    ("db-s-1vcpu-1gb", "Basic 1 vCPU, 1 GB"),
    ("db-s-1vcpu-2gb", "Basic 1 vCPU, 2 GB"),
    ("db-s-2vcpu-4gb", "Basic 2 vCPUs, 4 GB"),
    ("db-s-4vcpu-8gb", "Basic 4 vCPUs, 8 GB"),
    ("gd-2vcpu-8gb", "General Purpose 2 vCPUs, 8 GB"),
];

const REGIONS: &[(&str, &str)] = &[
    ("nyc1", "New York 1"),
    ("nyc3", "New York 3"),
    ("sfo3", "San Francisco 3"),
    ("tor1", "Toronto 1"),
    ("ams3", "Amsterdam 3"),
    ("fra1", "Frankfurt 1"),
    ("lon1", "London 1"),
    ("sgp1", "Singapore 1"),
    ("blr1", "Bangalore 1"),
    ("syd1", "Sydney 1"),
];

/// DigitalOcean adapter settings
#[derive(Clone)]
pub struct DigitalOceanSettings {
    /// DOKS cluster name or id
    pub cluster: Option<String>,
    pub access_token: Option<String>,
    /// doctl auth context
    pub auth_context: Option<String>,
    /// kube context for scaling commands
    pub context: Option<String>,
    pub kubeconfig: Option<PathBuf>,
    pub command_timeout: Duration,
    pub provisioning_timeout: Duration,
}

impl std::fmt::Debug for DigitalOceanSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DigitalOceanSettings")
            .field("cluster", &self.cluster)
            .field("access_token", &self.access_token.as_ref().map(|_| "****"))
            .field("auth_context", &self.auth_context)
            .field("context", &self.context)
            .field("kubeconfig", &self.kubeconfig)
            .field("command_timeout", &self.command_timeout)
            .field("provisioning_timeout", &self.provisioning_timeout)
            .finish()
    }
}

impl Default for DigitalOceanSettings {
    fn default() -> Self {
        Self {
            cluster: None,
            access_token: None,
            auth_context: None,
            context: None,
            kubeconfig: None,
            command_timeout: Duration::from_secs(120),
            provisioning_timeout: Duration::from_secs(300),
        }
    }
}

/// DigitalOcean provider
pub struct DigitalOceanProvider {
    doctl: Doctl,
    scaler: KubernetesScaler,
    settings: DigitalOceanSettings,
}

impl DigitalOceanProvider {
    pub fn new(settings: DigitalOceanSettings, runner: Arc<dyn CommandRunner>) -> Self {
        let doctl = Doctl::new(
            runner.clone(),
            settings.access_token.clone(),
            settings.auth_context.clone(),
            settings.command_timeout,
        );
        let scaler = KubernetesScaler::new(ProviderKind::DigitalOcean, runner)
            .with_context(settings.context.clone())
            .with_kubeconfig(settings.kubeconfig.clone())
            .with_timeout(settings.command_timeout);
        Self {
            doctl,
            scaler,
            settings,
        }
    }

    fn endpoint(
        &self,
        database: &Database,
        password: Option<String>,
    ) -> Result<DatabaseEndpoint, DigitalOceanError> {
        let connection = database.connection.as_ref().ok_or_else(|| {
            DigitalOceanError::UnexpectedOutput(format!("{} has no connection info", database.name))
        })?;
        let mut endpoint = DatabaseEndpoint::new(&database.id, &connection.host, connection.port);
        endpoint.database = connection.database.clone();
        endpoint.generated_password = password;
        Ok(endpoint)
    }
}

/// Unrecognized states are `failed` so the record never stays in flight
fn instance_status(status: &str) -> InstanceStatus {
    match status {
        "online" | "resizing" | "migrating" | "forking" => InstanceStatus::Available,
        "creating" => InstanceStatus::Provisioning,
        other => {
            warn!(status = other, "Unrecognized DigitalOcean database status");
            InstanceStatus::Failed
        }
    }
}

fn offerings(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|(code, label)| (code.to_string(), label.to_string()))
        .collect()
}

#[async_trait]
impl ScalingProvider for DigitalOceanProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::DigitalOcean
    }

    fn display_name(&self) -> &str {
        "DigitalOcean"
    }

    async fn check_auth(&self) -> hostplane_cloud::Result<AuthStatus> {
        match self.doctl.account_get().await {
            Ok(account) => Ok(AuthStatus::ok(match account.team {
                Some(team) => format!("{} ({})", account.email, team.name),
                None => account.email,
            })),
            Err(DigitalOceanError::CliNotFound) => Ok(AuthStatus::failed("doctl is not installed")),
            Err(e) => Ok(AuthStatus::failed(e.to_string())),
        }
    }

    async fn update_kubeconfig(&self) -> hostplane_cloud::Result<()> {
        let cluster = self.settings.cluster.as_deref().ok_or_else(|| {
            CloudError::InvalidConfig("digitalocean: no DOKS cluster configured".into())
        })?;
        self.doctl
            .kubeconfig_save(cluster, self.settings.kubeconfig.as_deref())
            .await?;
        info!(cluster, "Updated kubeconfig for DOKS cluster");
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
impl ManagedDatabaseProvider for DigitalOceanProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::DigitalOcean
    }

    fn display_name(&self) -> &str {
        "DigitalOcean Managed Databases"
    }

    fn instance_types(&self) -> BTreeMap<String, String> {
        offerings(SIZES)
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

        let database = match self
            .doctl
            .databases_create(request, self.settings.provisioning_timeout)
            .await
        {
            Ok(database) => database,
            Err(DigitalOceanError::TimedOut(_)) => {
                return Err(CloudError::ProvisioningTimedOut {
                    provider: ProviderKind::DigitalOcean.to_string(),
                    instance_id: request.name.clone(),
                });
            }
            Err(e) => {
                warn!(error = %e, "DigitalOcean database creation failed");
                return Ok(ProvisionResult::failed(e.to_string()));
            }
        };

        // The requested password is not used: DigitalOcean generates one per user
        let password = if request.credentials.username == ADMIN_USER {
            database.connection.as_ref().and_then(|c| c.password.clone())
        } else {
            match self
                .doctl
                .databases_user_create(&database.id, &request.credentials.username)
                .await
            {
                Ok(user) => user.password,
                Err(e) => {
                    return Ok(ProvisionResult::failed_after_create(
                        &database.id,
                        format!(
                            "cluster {} was created but user {} could not be: {}",
                            database.id, request.credentials.username, e
                        ),
                    ));
                }
            }
        };

        match self.endpoint(&database, password) {
            Ok(endpoint) => Ok(ProvisionResult::ok(endpoint)),
            Err(e) => Ok(ProvisionResult::failed_after_create(&database.id, e.to_string())),
        }
    }

    async fn deprovision(&self, instance_id: &str) -> hostplane_cloud::Result<()> {
        self.doctl.databases_delete(instance_id).await?;
        info!(instance_id, "Deleted DigitalOcean database cluster");
        Ok(())
    }

    async fn instance_status(&self, instance_id: &str) -> hostplane_cloud::Result<InstanceStatus> {
        let database = self.doctl.databases_get(instance_id).await?;
        Ok(match database {
            Some(db) => db
                .status
                .as_deref()
                .map(instance_status)
                .unwrap_or(InstanceStatus::Failed),
            None => InstanceStatus::Deleted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostplane_cloud::testing::RecordingRunner;
    use hostplane_cloud::{DatabaseCredentials, DatabaseEngine, VerticalScaling};

    const CLUSTER_ID: &str = "9cc10173-e9ea-4176-9dbc-a4cee4c4ff30";

    const CREATED: &str = r#"[{
        "id": "9cc10173-e9ea-4176-9dbc-a4cee4c4ff30",
        "name": "shop-db",
        "engine": "pg",
        "status": "online",
        "connection": {
            "database": "defaultdb",
            "host": "shop-db-do-user-1.db.ondigitalocean.com",
            "port": 25060,
            "user": "doadmin",
            "password": "admin-generated"
        }
    }]"#;

    fn provider(runner: &Arc<RecordingRunner>) -> DigitalOceanProvider {
        DigitalOceanProvider::new(
            DigitalOceanSettings {
                cluster: Some("doks-main".into()),
                access_token: Some("dop_v1_token".into()),
                ..DigitalOceanSettings::default()
            },
            runner.clone(),
        )
    }

    fn request(username: &str) -> ManagedDatabaseRequest {
        ManagedDatabaseRequest {
            name: "shop-db".into(),
            provider: ProviderKind::DigitalOcean,
            region: "fra1".into(),
            instance_type: "db-s-1vcpu-1gb".into(),
            storage_gb: 10,
            engine: DatabaseEngine::Postgresql,
            engine_version: None,
            credentials: DatabaseCredentials {
                username: username.into(),
                password: String::new(),
            },
            ssl_required: true,
        }
    }

    #[tokio::test]
    async fn test_provision_as_admin() {
        let runner = Arc::new(RecordingRunner::new());
        runner.push_success(CREATED);

        let result = provider(&runner).provision(&request("doadmin")).await.unwrap();
        let endpoint = result.endpoint.unwrap();
        assert_eq!(endpoint.instance_id, CLUSTER_ID);
        assert_eq!(endpoint.port, 25060);
        assert_eq!(endpoint.database.as_deref(), Some("defaultdb"));
        assert_eq!(endpoint.generated_password.as_deref(), Some("admin-generated"));

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            runner.command_lines()[0],
            "doctl databases create shop-db --engine pg --region fra1 --size db-s-1vcpu-1gb --num-nodes 1 --storage-size-mib 10240 --wait --output json"
        );
        assert!(
            calls[0]
                .envs
                .contains(&(crate::doctl::TOKEN_ENV.to_string(), "dop_v1_token".to_string()))
        );
    }

    #[tokio::test]
    async fn test_provision_creates_requested_user() {
        let runner = Arc::new(RecordingRunner::new());
        runner
            .push_success(CREATED)
            .push_success(r#"[{"name": "shop", "role": "normal", "password": "user-generated"}]"#);

        let result = provider(&runner).provision(&request("shop")).await.unwrap();
        assert_eq!(
            result.endpoint.unwrap().generated_password.as_deref(),
            Some("user-generated")
        );
        assert!(runner.command_lines()[1].starts_with(&format!(
            "doctl databases user create {} shop",
            CLUSTER_ID
        )));
    }

    #[tokio::test]
    async fn test_failed_user_creation_keeps_cluster_id() {
        let runner = Arc::new(RecordingRunner::new());
        runner
            .push_success(CREATED)
            .push_failure(1, "Error: POST https://api.digitalocean.com/v2/databases: 422");

        let result = provider(&runner).provision(&request("shop")).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.instance_id.as_deref(), Some(CLUSTER_ID));
        assert!(result.error.unwrap().contains("could not be"));
    }

    #[tokio::test]
    async fn test_provision_timeout() {
        let runner = Arc::new(RecordingRunner::new());
        runner.push_timeout();

        match provider(&runner).provision(&request("doadmin")).await {
            Err(CloudError::ProvisioningTimedOut { instance_id, .. }) => {
                assert_eq!(instance_id, "shop-db")
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_size_is_rejected_before_doctl() {
        let runner = Arc::new(RecordingRunner::new());
        let mut request = request("doadmin");
        request.instance_type = "db-s-64vcpu".into();

        assert!(matches!(
            provider(&runner).provision(&request).await,
            Err(CloudError::InvalidConfig(_))
        ));
        assert_eq!(runner.call_count(), 0);
    }

    #[tokio::test]
    async fn test_delete_by_name_resolves_cluster_id() {
        let runner = Arc::new(RecordingRunner::new());
        runner.push_success(CREATED).push_success("");

        provider(&runner).deprovision("shop-db").await.unwrap();

        let lines = runner.command_lines();
        assert!(lines[0].starts_with("doctl databases list"));
        assert!(lines[1].starts_with(&format!("doctl databases delete {} --force", CLUSTER_ID)));
    }

    #[tokio::test]
    async fn test_status() {
        let runner = Arc::new(RecordingRunner::new());
        runner.push_success(CREATED);
        assert_eq!(
            provider(&runner).instance_status(CLUSTER_ID).await.unwrap(),
            InstanceStatus::Available
        );

        runner.push_success("[]");
        assert_eq!(
            provider(&runner).instance_status("gone-db").await.unwrap(),
            InstanceStatus::Deleted
        );
    }

    #[test]
    fn test_unrecognized_status_is_not_in_flight() {
        assert_eq!(instance_status("creating"), InstanceStatus::Provisioning);
        let status = instance_status("decommissioned");
        assert_eq!(status, InstanceStatus::Failed);
        assert!(!status.is_in_flight());
    }

    #[tokio::test]
    async fn test_vertical_scaling_not_supported() {
        let runner = Arc::new(RecordingRunner::new());
        let doks = provider(&runner);
        assert!(!doks.supports_vertical_scaling());

        let result = doks
            .enable_vertical_scaling(
                &ScalingTarget::new("web", "default"),
                &VerticalScaling::default(),
            )
            .await;
        assert!(matches!(result, Err(CloudError::ProviderNotSupported(_))));
        assert_eq!(runner.call_count(), 0);
    }

    #[tokio::test]
    async fn test_check_auth_without_doctl() {
        let runner = Arc::new(RecordingRunner::new());
        runner.push_not_found();
        let auth = provider(&runner).check_auth().await.unwrap();
        assert!(!auth.authenticated);
        assert_eq!(auth.error.as_deref(), Some("doctl is not installed"));
    }
}
