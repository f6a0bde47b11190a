//! OVHcloud provider implementation

use crate::api::{
    ApiEndpoint, ClusterSpec, Disk, IpRestriction, NodesPattern, OvhClient, OvhCredentials,
    engine_path,
};
use async_trait::async_trait;
use hostplane_cloud::{
    AuthStatus, CloudError, CommandRunner, DatabaseEndpoint, DatabaseEngine, HorizontalScaling,
    InstanceStatus, KubernetesScaler, ManagedDatabaseProvider, ManagedDatabaseRequest,
    ProviderKind, ProvisionResult, ScalingConfig, ScalingProvider, ScalingTarget,
    VerticalScaling,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const FLAVORS: &[(&str, &str)] = &[
    ("db1-4", "1 vCore, 4 GB"),
    ("db1-7", "2 vCores, 7 GB"),
    ("db1-15", "4 vCores, 15 GB"),
    ("db1-30", "8 vCores, 30 GB"),
    ("db1-60", "16 vCores, 60 GB"),
];

const REGIONS: &[(&str, &str)] = &[
    ("GRA", "Gravelines"),
    ("SBG", "Strasbourg"),
    ("BHS", "Beauharnois"),
    ("DE", "Frankfurt"),
    ("UK", "London"),
    ("WAW", "Warsaw"),
];

const READY: &str = "READY";

/// OVHcloud adapter settings
#[derive(Debug, Clone)]
pub struct OvhSettings {
    pub endpoint: ApiEndpoint,
    pub credentials: Option<OvhCredentials>,
    /// Public Cloud project id
    pub service_name: Option<String>,
    /// Managed Kubernetes cluster id
    pub kube_id: Option<String>,
    pub context: Option<String>,
    /// Where `update_kubeconfig` writes the cluster kubeconfig
    pub kubeconfig: Option<PathBuf>,
    /// Database service plan
    pub plan: String,
    /// CIDRs allowed to reach new clusters
    pub allowed_ips: Vec<String>,
    pub command_timeout: Duration,
    pub provisioning_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for OvhSettings {
    fn default() -> Self {
        Self {
            endpoint: ApiEndpoint::default(),
            credentials: None,
            service_name: None,
            kube_id: None,
            context: None,
            kubeconfig: None,
            plan: "essential".to_string(),
            allowed_ips: Vec::new(),
            command_timeout: Duration::from_secs(120),
            provisioning_timeout: Duration::from_secs(300),
            poll_interval: Duration::from_secs(10),
        }
    }
}

/// OVHcloud provider
pub struct OvhProvider {
    client: OvhClient,
    scaler: KubernetesScaler,
    settings: OvhSettings,
}

impl OvhProvider {
    pub fn new(settings: OvhSettings, runner: Arc<dyn CommandRunner>) -> Self {
        let client = OvhClient::new(
            &settings.endpoint,
            settings.credentials.clone(),
            settings.command_timeout,
        );
        let scaler = KubernetesScaler::new(ProviderKind::Ovh, runner)
            .with_context(settings.context.clone())
            .with_kubeconfig(settings.kubeconfig.clone())
            .with_timeout(settings.command_timeout);
        Self {
            client,
            scaler,
            settings,
        }
    }

    fn service_name(&self) -> hostplane_cloud::Result<&str> {
        self.settings
            .service_name
            .as_deref()
            .ok_or_else(|| CloudError::InvalidConfig("ovh: no service-name configured".into()))
    }

    fn cluster_spec(&self, request: &ManagedDatabaseRequest) -> ClusterSpec {
        let version = request
            .engine_version
            .clone()
            .unwrap_or_else(|| default_version(request.engine).to_string());
        ClusterSpec {
            description: request.name.clone(),
            plan: self.settings.plan.clone(),
            version,
            nodes_pattern: NodesPattern {
                flavor: request.instance_type.clone(),
                number: 1,
                region: request.region.clone(),
            },
            disk: Disk {
                size: request.storage_gb,
            },
            ip_restrictions: self
                .settings
                .allowed_ips
                .iter()
                .map(|ip| IpRestriction {
                    ip: ip.clone(),
                    description: "hostplane".to_string(),
                })
                .collect(),
        }
    }
}

fn default_version(engine: DatabaseEngine) -> &'static str {
    match engine {
        DatabaseEngine::Postgresql => "16",
        DatabaseEngine::Mysql => "8",
    }
}

/// Provider id of a cluster: `<engine>/<uuid>`
pub fn cluster_ref(engine: DatabaseEngine, cluster_id: &str) -> String {
    format!("{}/{}", engine_path(engine), cluster_id)
}

/// Splits a provider id; a bare id is a PostgreSQL cluster
pub fn parse_cluster_ref(id: &str) -> (DatabaseEngine, &str) {
    match id.split_once('/') {
        Some((engine, cluster_id)) => match engine.parse::<DatabaseEngine>() {
            Ok(engine) => (engine, cluster_id),
            Err(_) => (DatabaseEngine::Postgresql, id),
        },
        None => (DatabaseEngine::Postgresql, id),
    }
}

fn instance_status(status: &str) -> InstanceStatus {
    match status {
        READY | "UPDATING" | "RESTORING_BACKUP" => InstanceStatus::Available,
        "CREATING" | "PENDING" => InstanceStatus::Provisioning,
        "DELETING" => InstanceStatus::Deleting,
        "ERROR" | "ERROR_INCONSISTENT_SPEC" | "LOCKED" => InstanceStatus::Failed,
        _ => InstanceStatus::Pending,
    }
}

fn offerings(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|(code, label)| (code.to_string(), label.to_string()))
        .collect()
}

async fn write_kubeconfig(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, content).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    }
    Ok(())
}

#[async_trait]
impl ScalingProvider for OvhProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ovh
    }

    fn display_name(&self) -> &str {
        "OVHcloud"
    }

    async fn check_auth(&self) -> hostplane_cloud::Result<AuthStatus> {
        match self.client.me().await {
            Ok(me) => Ok(AuthStatus::ok(match me.email {
                Some(email) => format!("{} ({})", me.nichandle, email),
                None => me.nichandle,
            })),
            Err(e) => Ok(AuthStatus::failed(e.to_string())),
        }
    }

    async fn update_kubeconfig(&self) -> hostplane_cloud::Result<()> {
        let service_name = self.service_name()?;
        let kube_id = self
            .settings
            .kube_id
            .as_deref()
            .ok_or_else(|| CloudError::InvalidConfig("ovh: no kube-id configured".into()))?;
        let path = self
            .settings
            .kubeconfig
            .as_deref()
            .ok_or_else(|| CloudError::InvalidConfig("ovh: no kubeconfig path configured".into()))?;

        let content = self.client.kubeconfig(service_name, kube_id).await?;
        write_kubeconfig(path, &content).await?;
        info!(kube_id, path = %path.display(), "Wrote kubeconfig for Managed Kubernetes cluster");
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
impl ManagedDatabaseProvider for OvhProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ovh
    }

    fn display_name(&self) -> &str {
        "OVHcloud Public Cloud Databases"
    }

    fn instance_types(&self) -> BTreeMap<String, String> {
        offerings(FLAVORS)
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
        let service_name = self.service_name()?;
        let engine = request.engine;

        let created = match self
            .client
            .create_cluster(service_name, engine, &self.cluster_spec(request))
            .await
        {
            Ok(cluster) => cluster,
            Err(e) => {
                warn!(error = %e, "OVH database cluster creation failed");
                return Ok(ProvisionResult::failed(e.to_string()));
            }
        };
        let provider_id = cluster_ref(engine, &created.id);
        info!(cluster_id = %created.id, "OVH database cluster requested");

        let deadline = Instant::now() + self.settings.provisioning_timeout;
        let cluster = loop {
            match self.client.get_cluster(service_name, engine, &created.id).await {
                Ok(Some(cluster)) if cluster.status == READY => break cluster,
                Ok(Some(cluster)) if instance_status(&cluster.status) == InstanceStatus::Failed => {
                    return Ok(ProvisionResult::failed_after_create(
                        provider_id,
                        format!("cluster {} entered status {}", created.id, cluster.status),
                    ));
                }
                Ok(Some(cluster)) => {
                    debug!(cluster_id = %created.id, status = %cluster.status, "Waiting for cluster");
                }
                Ok(None) => {
                    return Ok(ProvisionResult::failed(format!(
                        "cluster {} disappeared while provisioning",
                        created.id
                    )));
                }
                // Polling errors are transient until the deadline
                Err(e) => warn!(cluster_id = %created.id, error = %e, "Cluster status poll failed"),
            }

            if Instant::now() + self.settings.poll_interval > deadline {
                return Err(CloudError::ProvisioningTimedOut {
                    provider: ProviderKind::Ovh.to_string(),
                    instance_id: provider_id,
                });
            }
            tokio::time::sleep(self.settings.poll_interval).await;
        };

        let user = match self
            .client
            .create_user(service_name, engine, &cluster.id, &request.credentials.username)
            .await
        {
            Ok(user) => user,
            Err(e) => {
                return Ok(ProvisionResult::failed_after_create(
                    provider_id,
                    format!(
                        "cluster {} was created but user {} could not be: {}",
                        cluster.id, request.credentials.username, e
                    ),
                ));
            }
        };

        let Some(connection) = cluster.endpoint_for(engine) else {
            return Ok(ProvisionResult::failed_after_create(
                provider_id,
                format!("cluster {} has no {} endpoint", cluster.id, engine),
            ));
        };
        let mut endpoint = DatabaseEndpoint::new(
            provider_id,
            connection.domain.clone().unwrap_or_default(),
            connection.port.unwrap_or_else(|| engine.default_port()),
        );
        endpoint.generated_password = user.password;
        Ok(ProvisionResult::ok(endpoint))
    }

    async fn deprovision(&self, instance_id: &str) -> hostplane_cloud::Result<()> {
        let (engine, cluster_id) = parse_cluster_ref(instance_id);
        self.client
            .delete_cluster(self.service_name()?, engine, cluster_id)
            .await?;
        info!(cluster_id, "Deleted OVH database cluster");
        Ok(())
    }

    async fn instance_status(&self, instance_id: &str) -> hostplane_cloud::Result<InstanceStatus> {
        let (engine, cluster_id) = parse_cluster_ref(instance_id);
        let cluster = self
            .client
            .get_cluster(self.service_name()?, engine, cluster_id)
            .await?;
        Ok(cluster
            .map(|c| instance_status(&c.status))
            .unwrap_or(InstanceStatus::Deleted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostplane_cloud::testing::RecordingRunner;
    use hostplane_cloud::DatabaseCredentials;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CLUSTERS: &str = "/cloud/project/proj-1/database/postgresql";
    const CLUSTER: &str = "/cloud/project/proj-1/database/postgresql/3f1c9a2e";

    fn ready_cluster() -> String {
        r#"{
            "id": "3f1c9a2e",
            "status": "READY",
            "description": "shop-db",
            "endpoints": [
                {"component": "postgresql", "domain": "postgresql-3f1c9a2e.database.cloud.ovh.net", "port": 20184, "ssl": true},
                {"component": "postgresqlRead", "domain": null, "port": null}
            ]
        }"#
        .to_string()
    }

    async fn server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/time"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(chrono::Utc::now().timestamp().to_string()),
            )
            .mount(&server)
            .await;
        server
    }

    fn settings(server: &MockServer) -> OvhSettings {
        OvhSettings {
            endpoint: ApiEndpoint::Custom(server.uri()),
            credentials: Some(OvhCredentials {
                application_key: "ak".into(),
                application_secret: "as".into(),
                consumer_key: "ck".into(),
            }),
            service_name: Some("proj-1".into()),
            kube_id: Some("kube-9".into()),
            provisioning_timeout: Duration::from_millis(200),
            poll_interval: Duration::from_millis(10),
            ..OvhSettings::default()
        }
    }

    fn provider(settings: OvhSettings) -> OvhProvider {
        OvhProvider::new(settings, Arc::new(RecordingRunner::new()))
    }

    fn request() -> ManagedDatabaseRequest {
        ManagedDatabaseRequest {
            name: "shop-db".into(),
            provider: ProviderKind::Ovh,
            region: "GRA".into(),
            instance_type: "db1-4".into(),
            storage_gb: 80,
            engine: DatabaseEngine::Postgresql,
            engine_version: None,
            credentials: DatabaseCredentials {
                username: "shop".into(),
                password: String::new(),
            },
            ssl_required: true,
        }
    }

    #[test]
    fn test_cluster_refs() {
        assert_eq!(cluster_ref(DatabaseEngine::Mysql, "abc"), "mysql/abc");
        assert_eq!(
            parse_cluster_ref("mysql/abc"),
            (DatabaseEngine::Mysql, "abc")
        );
        assert_eq!(
            parse_cluster_ref("abc"),
            (DatabaseEngine::Postgresql, "abc")
        );
    }

    #[tokio::test]
    async fn test_provision_polls_until_ready() {
        let server = server().await;
        Mock::given(method("POST"))
            .and(path(CLUSTERS))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"id": "3f1c9a2e", "status": "CREATING"}"#),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(CLUSTER))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"id": "3f1c9a2e", "status": "CREATING"}"#),
            )
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(CLUSTER))
            .respond_with(ResponseTemplate::new(200).set_body_string(ready_cluster()))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("{}/user", CLUSTER)))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"id": "u-1", "username": "shop", "password": "api-generated", "status": "CREATING"}"#,
            ))
            .mount(&server)
            .await;

        let result = provider(settings(&server)).provision(&request()).await.unwrap();
        let endpoint = result.endpoint.unwrap();
        assert_eq!(endpoint.instance_id, "postgresql/3f1c9a2e");
        assert_eq!(endpoint.host, "postgresql-3f1c9a2e.database.cloud.ovh.net");
        assert_eq!(endpoint.port, 20184);
        assert_eq!(endpoint.generated_password.as_deref(), Some("api-generated"));
    }

    #[tokio::test]
    async fn test_provision_timeout_keeps_cluster_ref() {
        let server = server().await;
        Mock::given(method("POST"))
            .and(path(CLUSTERS))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"id": "3f1c9a2e", "status": "CREATING"}"#),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(CLUSTER))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"id": "3f1c9a2e", "status": "CREATING"}"#),
            )
            .mount(&server)
            .await;

        match provider(settings(&server)).provision(&request()).await {
            Err(CloudError::ProvisioningTimedOut { instance_id, .. }) => {
                assert_eq!(instance_id, "postgresql/3f1c9a2e")
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_user_creation_keeps_cluster_ref() {
        let server = server().await;
        Mock::given(method("POST"))
            .and(path(CLUSTERS))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"id": "3f1c9a2e", "status": "CREATING"}"#),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(CLUSTER))
            .respond_with(ResponseTemplate::new(200).set_body_string(ready_cluster()))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("{}/user", CLUSTER)))
            .respond_with(
                ResponseTemplate::new(409)
                    .set_body_string(r#"{"message": "User shop already exists"}"#),
            )
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(CLUSTER))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let ovh = provider(settings(&server));
        let result = ovh.provision(&request()).await.unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("already exists"));

        let instance_id = result.instance_id.unwrap();
        assert_eq!(instance_id, "postgresql/3f1c9a2e");
        ovh.deprovision(&instance_id).await.unwrap();
    }

    #[tokio::test]
    async fn test_provision_api_rejection_is_reported() {
        let server = server().await;
        Mock::given(method("POST"))
            .and(path(CLUSTERS))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_string(r#"{"message": "Quota exceeded for flavor db1-4"}"#),
            )
            .mount(&server)
            .await;

        let result = provider(settings(&server)).provision(&request()).await.unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("Quota exceeded"));
    }

    #[tokio::test]
    async fn test_unknown_region_rejected_before_api() {
        let server = MockServer::start().await;
        let mut request = request();
        request.region = "eu-west-1".into();

        assert!(matches!(
            provider(settings(&server)).provision(&request).await,
            Err(CloudError::InvalidConfig(_))
        ));
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn test_status_and_delete() {
        let server = server().await;
        Mock::given(method("GET"))
            .and(path(CLUSTER))
            .respond_with(ResponseTemplate::new(200).set_body_string(ready_cluster()))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(CLUSTER))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let ovh = provider(settings(&server));
        assert_eq!(
            ovh.instance_status("postgresql/3f1c9a2e").await.unwrap(),
            InstanceStatus::Available
        );
        ovh.deprovision("postgresql/3f1c9a2e").await.unwrap();
    }

    #[tokio::test]
    async fn test_update_kubeconfig_writes_file() {
        let server = server().await;
        Mock::given(method("POST"))
            .and(path("/cloud/project/proj-1/kube/kube-9/kubeconfig"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"content": "apiVersion: v1\nkind: Config\n"}"#),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let kubeconfig = dir.path().join("kube").join("ovh.yaml");
        let ovh = provider(OvhSettings {
            kubeconfig: Some(kubeconfig.clone()),
            ..settings(&server)
        });

        ovh.update_kubeconfig().await.unwrap();
        assert_eq!(
            std::fs::read_to_string(&kubeconfig).unwrap(),
            "apiVersion: v1\nkind: Config\n"
        );
    }

    #[tokio::test]
    async fn test_check_auth_without_credentials() {
        let server = MockServer::start().await;
        let ovh = provider(OvhSettings {
            credentials: None,
            ..settings(&server)
        });

        let auth = ovh.check_auth().await.unwrap();
        assert!(!auth.authenticated);
        assert!(auth.error.unwrap().contains("OVH_APPLICATION_KEY"));
        assert!(!ovh.supports_vertical_scaling());
    }
}
