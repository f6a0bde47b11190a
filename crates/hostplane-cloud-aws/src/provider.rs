//! AWS provider implementation

use crate::aws::{AwsCli, DbInstance};
use crate::error::AwsError;
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

const INSTANCE_CLASSES: &[(&str, &str)] = &[
    ("db.t3.micro", "db.t3.micro (2 vCPU, 1 GiB)"),
    ("db.t3.small", "db.t3.small (2 vCPU, 2 GiB)"),
    ("db.t3.medium", "db.t3.medium (2 vCPU, 4 GiB)"),
    ("db.m6g.large", "db.m6g.large (2 vCPU, 8 GiB)"),
    ("db.m6g.xlarge", "db.m6g.xlarge (4 vCPU, 16 GiB)"),
    ("db.r6g.large", "db.r6g.large (2 vCPU, 16 GiB)"),
];

const REGIONS: &[(&str, &str)] = &[
    ("us-east-1", "US East (N. Virginia)"),
    ("us-east-2", "US East (Ohio)"),
    ("us-west-2", "US West (Oregon)"),
    ("eu-west-1", "Europe (Ireland)"),
    ("eu-central-1", "Europe (Frankfurt)"),
    ("ap-southeast-1", "Asia Pacific (Singapore)"),
    ("ap-northeast-1", "Asia Pacific (Tokyo)"),
];

/// AWS adapter settings
#[derive(Debug, Clone)]
pub struct AwsSettings {
    /// Default region for EKS and for RDS lookups by id
    pub region: String,
    /// EKS cluster name
    pub cluster: Option<String>,
    pub profile: Option<String>,
    /// kubectl context; defaults to the current context
    pub context: Option<String>,
    pub kubeconfig: Option<PathBuf>,
    pub command_timeout: Duration,
    pub provisioning_timeout: Duration,
}

impl AwsSettings {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            cluster: None,
            profile: None,
            context: None,
            kubeconfig: None,
            command_timeout: Duration::from_secs(120),
            provisioning_timeout: Duration::from_secs(300),
        }
    }

    pub fn with_cluster(mut self, cluster: impl Into<String>) -> Self {
        self.cluster = Some(cluster.into());
        self
    }
}

impl Default for AwsSettings {
    fn default() -> Self {
        Self::new("us-east-1")
    }
}

/// AWS provider
pub struct AwsProvider {
    cli: AwsCli,
    scaler: KubernetesScaler,
    settings: AwsSettings,
}

impl AwsProvider {
    pub fn new(settings: AwsSettings, runner: Arc<dyn CommandRunner>) -> Self {
        let cli = AwsCli::new(
            runner.clone(),
            settings.region.clone(),
            settings.profile.clone(),
            settings.command_timeout,
        );
        let scaler = KubernetesScaler::new(ProviderKind::Aws, runner)
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

    fn timed_out(&self, instance_id: &str) -> CloudError {
        CloudError::ProvisioningTimedOut {
            provider: ProviderKind::Aws.to_string(),
            instance_id: instance_id.to_string(),
        }
    }

    /// Splits `<region>/<identifier>`; a bare identifier lives in the default region
    fn split_ref<'a>(&'a self, instance_id: &'a str) -> (&'a str, &'a str) {
        instance_id
            .split_once('/')
            .unwrap_or((self.cli.region(), instance_id))
    }
}

/// RDS identifiers are region scoped and never contain `/`
fn instance_ref(region: &str, identifier: &str) -> String {
    format!("{}/{}", region, identifier)
}

/// Maps `DBInstanceStatus` onto the record lifecycle
fn instance_status(status: &str) -> InstanceStatus {
    match status {
        "creating" => InstanceStatus::Provisioning,
        "deleting" => InstanceStatus::Deleting,
        "failed" | "restore-error" | "inaccessible-encryption-credentials" => {
            InstanceStatus::Failed
        }
        s if s.starts_with("incompatible-") => InstanceStatus::Failed,
        // available, backing-up, modifying, rebooting, upgrading, ...
        _ => InstanceStatus::Available,
    }
}

fn offerings(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|(code, label)| (code.to_string(), label.to_string()))
        .collect()
}

#[async_trait]
impl ScalingProvider for AwsProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Aws
    }

    fn display_name(&self) -> &str {
        "Amazon Web Services"
    }

    async fn check_auth(&self) -> hostplane_cloud::Result<AuthStatus> {
        match self.cli.caller_identity().await {
            Ok(identity) => Ok(AuthStatus::ok(format!(
                "{} ({})",
                identity.arn, identity.account
            ))),
            Err(AwsError::CliNotFound) => Ok(AuthStatus::failed("aws CLI is not installed")),
            Err(e) => Ok(AuthStatus::failed(e.to_string())),
        }
    }

    async fn update_kubeconfig(&self) -> hostplane_cloud::Result<()> {
        let cluster = self.settings.cluster.as_deref().ok_or_else(|| {
            CloudError::InvalidConfig("aws: no EKS cluster configured".to_string())
        })?;
        self.cli
            .update_kubeconfig(
                cluster,
                self.settings.context.as_deref(),
                self.settings.kubeconfig.as_deref(),
            )
            .await?;
        info!(cluster, "Updated kubeconfig for EKS cluster");
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
impl ManagedDatabaseProvider for AwsProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Aws
    }

    fn display_name(&self) -> &str {
        "Amazon RDS"
    }

    fn instance_types(&self) -> BTreeMap<String, String> {
        offerings(INSTANCE_CLASSES)
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
        let instance_id = instance_ref(&request.region, &request.name);

        match self.cli.create_db_instance(request).await {
            Ok(()) => {}
            Err(AwsError::TimedOut(_)) => return Err(self.timed_out(&instance_id)),
            Err(e) => {
                warn!(error = %e, "RDS create-db-instance failed");
                return Ok(ProvisionResult::failed(e.to_string()));
            }
        }

        match self
            .cli
            .wait_db_instance_available(
                &request.name,
                &request.region,
                self.settings.provisioning_timeout,
            )
            .await
        {
            Ok(()) => {}
            Err(AwsError::TimedOut(_)) => return Err(self.timed_out(&instance_id)),
            Err(e) => {
                return Ok(ProvisionResult::failed_after_create(
                    instance_id,
                    e.to_string(),
                ));
            }
        }

        let described = self
            .cli
            .describe_db_instance(&request.name, &request.region)
            .await;
        let (address, port, db_name) = match described {
            Ok(Some(DbInstance {
                endpoint: Some(endpoint),
                db_name,
                ..
            })) => (endpoint.address, endpoint.port, db_name),
            Ok(_) => {
                return Ok(ProvisionResult::failed_after_create(
                    instance_id,
                    format!("{} has no endpoint after creation", request.name),
                ));
            }
            Err(e) => return Ok(ProvisionResult::failed_after_create(instance_id, e.to_string())),
        };

        let mut result = DatabaseEndpoint::new(instance_id, address, port);
        result.database = db_name;
        Ok(ProvisionResult::ok(result))
    }

    async fn deprovision(&self, instance_id: &str) -> hostplane_cloud::Result<()> {
        let (region, identifier) = self.split_ref(instance_id);
        self.cli.delete_db_instance(identifier, region).await?;
        info!(region, identifier, "Requested RDS instance deletion");
        Ok(())
    }

    async fn instance_status(&self, instance_id: &str) -> hostplane_cloud::Result<InstanceStatus> {
        let (region, identifier) = self.split_ref(instance_id);
        let instance = self.cli.describe_db_instance(identifier, region).await?;
        Ok(instance
            .map(|i| instance_status(&i.status))
            .unwrap_or(InstanceStatus::Deleted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostplane_cloud::testing::RecordingRunner;
    use hostplane_cloud::{DatabaseCredentials, DatabaseEngine, UpdateMode};

    const DESCRIBE: &str = r#"{"DBInstances": [{
        "DBInstanceIdentifier": "shop-db",
        "DBInstanceStatus": "available",
        "Endpoint": {"Address": "shop-db.abc123.eu-west-1.rds.amazonaws.com", "Port": 5432}
    }]}"#;

    fn provider(runner: &Arc<RecordingRunner>) -> AwsProvider {
        AwsProvider::new(
            AwsSettings::new("eu-west-1").with_cluster("prod"),
            runner.clone(),
        )
    }

    fn request() -> ManagedDatabaseRequest {
        ManagedDatabaseRequest {
            name: "shop-db".into(),
            provider: ProviderKind::Aws,
            region: "eu-west-1".into(),
            instance_type: "db.t3.micro".into(),
            storage_gb: 20,
            engine: DatabaseEngine::Postgresql,
            engine_version: Some("16.3".into()),
            credentials: DatabaseCredentials {
                username: "shop".into(),
                password: "Sup3rSecret".into(),
            },
            ssl_required: true,
        }
    }

    #[tokio::test]
    async fn test_check_auth() {
        let runner = Arc::new(RecordingRunner::new());
        runner.push_success(
            r#"{"UserId": "AIDA123", "Account": "123456789012", "Arn": "arn:aws:iam::123456789012:user/ops"}"#,
        );
        let auth = provider(&runner).check_auth().await.unwrap();
        assert!(auth.authenticated);
        assert_eq!(
            auth.account_info.as_deref(),
            Some("arn:aws:iam::123456789012:user/ops (123456789012)")
        );
        assert!(runner.command_lines()[0].ends_with("sts get-caller-identity"));

        runner.push_not_found();
        let auth = provider(&runner).check_auth().await.unwrap();
        assert!(!auth.authenticated);
    }

    #[tokio::test]
    async fn test_update_kubeconfig() {
        let runner = Arc::new(RecordingRunner::new());
        ScalingProvider::update_kubeconfig(&provider(&runner))
            .await
            .unwrap();
        assert_eq!(
            runner.command_lines(),
            vec!["aws --region eu-west-1 --output json eks update-kubeconfig --name prod"]
        );

        let without_cluster = AwsProvider::new(AwsSettings::default(), runner.clone());
        assert!(matches!(
            without_cluster.update_kubeconfig().await,
            Err(CloudError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_provision() {
        let runner = Arc::new(RecordingRunner::new());
        runner.push_success("{}").push_success("").push_success(DESCRIBE);

        let result = provider(&runner).provision(&request()).await.unwrap();
        assert!(result.success);
        let endpoint = result.endpoint.unwrap();
        assert_eq!(endpoint.instance_id, "eu-west-1/shop-db");
        assert_eq!(endpoint.host, "shop-db.abc123.eu-west-1.rds.amazonaws.com");
        assert_eq!(endpoint.port, 5432);
        assert!(endpoint.generated_password.is_none());

        let lines = runner.command_lines();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("rds create-db-instance --db-instance-identifier shop-db"));
        assert!(lines[0].contains("--engine postgres"));
        assert!(lines[0].contains("--master-user-password ****"));
        assert!(lines[0].contains("--no-publicly-accessible"));
        assert!(!lines[0].contains("Sup3rSecret"));
        assert!(lines[0].ends_with("--engine-version 16.3"));
        assert!(lines[1].contains("rds wait db-instance-available"));
        assert_eq!(
            runner.calls()[1].timeout,
            Some(Duration::from_secs(300))
        );
    }

    #[tokio::test]
    async fn test_provision_rejects_unknown_offering() {
        let runner = Arc::new(RecordingRunner::new());
        let mut bad = request();
        bad.instance_type = "db.x99.huge".into();

        assert!(matches!(
            provider(&runner).provision(&bad).await,
            Err(CloudError::InvalidConfig(_))
        ));
        assert_eq!(runner.call_count(), 0);
    }

    #[tokio::test]
    async fn test_provision_failure_and_timeout() {
        let runner = Arc::new(RecordingRunner::new());
        runner.push_failure(
            254,
            "An error occurred (DBInstanceAlreadyExists) when calling the CreateDBInstance operation",
        );
        let result = provider(&runner).provision(&request()).await.unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("DBInstanceAlreadyExists"));

        let runner = Arc::new(RecordingRunner::new());
        runner.push_success("{}").push_timeout();
        assert!(matches!(
            provider(&runner).provision(&request()).await,
            Err(CloudError::ProvisioningTimedOut { .. })
        ));

        let runner = Arc::new(RecordingRunner::new());
        runner
            .push_success("{}")
            .push_failure(255, "Waiter DBInstanceAvailable failed: Max attempts exceeded");
        assert!(matches!(
            provider(&runner).provision(&request()).await,
            Err(CloudError::ProvisioningTimedOut { .. })
        ));
    }

    #[tokio::test]
    async fn test_deprovision_and_status() {
        let runner = Arc::new(RecordingRunner::new());
        let aws = provider(&runner);

        aws.deprovision("shop-db").await.unwrap();
        assert!(runner.command_lines()[0].starts_with("aws --region eu-west-1 "));
        assert!(runner.command_lines()[0].ends_with(
            "rds delete-db-instance --db-instance-identifier shop-db --skip-final-snapshot"
        ));

        runner.push_success(DESCRIBE);
        assert_eq!(
            aws.instance_status("shop-db").await.unwrap(),
            InstanceStatus::Available
        );

        runner.push_failure(
            254,
            "An error occurred (DBInstanceNotFound) when calling the DescribeDBInstances operation",
        );
        assert_eq!(
            aws.instance_status("shop-db").await.unwrap(),
            InstanceStatus::Deleted
        );
    }

    #[tokio::test]
    async fn test_instance_in_another_region() {
        let runner = Arc::new(RecordingRunner::new());
        let aws = provider(&runner);
        let mut frankfurt = request();
        frankfurt.region = "eu-central-1".into();

        runner.push_success("{}").push_success("").push_success(DESCRIBE);
        let result = aws.provision(&frankfurt).await.unwrap();
        let instance_id = result.endpoint.unwrap().instance_id;
        assert_eq!(instance_id, "eu-central-1/shop-db");

        runner.push_success(DESCRIBE);
        assert_eq!(
            aws.instance_status(&instance_id).await.unwrap(),
            InstanceStatus::Available
        );
        runner.push_success("{}");
        aws.deprovision(&instance_id).await.unwrap();

        let lines = runner.command_lines();
        assert_eq!(lines.len(), 5);
        for line in &lines {
            assert!(line.starts_with("aws --region eu-central-1 "), "{}", line);
        }
        assert!(lines[4].contains("delete-db-instance --db-instance-identifier shop-db "));
    }

    #[tokio::test]
    async fn test_wait_failure_keeps_instance_id() {
        let runner = Arc::new(RecordingRunner::new());
        runner
            .push_success("{}")
            .push_failure(255, "Waiter DBInstanceAvailable failed: terminal failure state");

        let result = provider(&runner).provision(&request()).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.instance_id.as_deref(), Some("eu-west-1/shop-db"));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(instance_status("creating"), InstanceStatus::Provisioning);
        assert_eq!(instance_status("modifying"), InstanceStatus::Available);
        assert_eq!(instance_status("incompatible-network"), InstanceStatus::Failed);
    }

    #[tokio::test]
    async fn test_vertical_scaling_supported() {
        let runner = Arc::new(RecordingRunner::new());
        let aws = provider(&runner);
        assert!(aws.supports_vertical_scaling());

        aws.enable_vertical_scaling(
            &ScalingTarget::new("web", "shop"),
            &VerticalScaling {
                update_mode: UpdateMode::Recreate,
            },
        )
        .await
        .unwrap();

        let call = &runner.calls()[0];
        assert_eq!(call.program, "kubectl");
        assert!(call.stdin.as_deref().unwrap().contains("\"Recreate\""));
    }
}
