//! aws CLI wrapper
//!
//! Wraps the `aws` commands used for EKS credentials and RDS instances.

use crate::error::{AwsError, Result};
use hostplane_cloud::{
    CommandError, CommandRunner, CommandSpec, DatabaseEngine, ManagedDatabaseRequest,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const AWS: &str = "aws";

/// aws CLI wrapper
pub struct AwsCli {
    runner: Arc<dyn CommandRunner>,
    region: String,
    profile: Option<String>,
    timeout: Duration,
}

impl AwsCli {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        region: impl Into<String>,
        profile: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            runner,
            region: region.into(),
            profile,
            timeout,
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    fn command(&self, region: &str) -> CommandSpec {
        CommandSpec::new(AWS)
            .timeout(self.timeout)
            .env("AWS_PAGER", "")
            .arg("--region")
            .arg(region)
            .opt_arg("--profile", self.profile.as_deref())
            .args(["--output", "json"])
    }

    /// Run an aws command and return stdout
    async fn run_command(&self, spec: CommandSpec) -> Result<String> {
        let output = self.runner.run(&spec).await.map_err(|e| match e {
            CommandError::NotFound(_) => AwsError::CliNotFound,
            CommandError::TimedOut { .. } => AwsError::TimedOut(e.to_string()),
            other => AwsError::CommandFailed(other.to_string()),
        })?;

        if !output.is_success() {
            let message = output.error_message();
            // The waiter gives up on its own after its attempt budget
            if message.contains("Max attempts exceeded") {
                return Err(AwsError::TimedOut(message));
            }
            return Err(AwsError::CommandFailed(message));
        }

        Ok(output.stdout)
    }

    pub async fn caller_identity(&self) -> Result<CallerIdentity> {
        let spec = self.command(&self.region).args(["sts", "get-caller-identity"]);
        let output = self.run_command(spec).await?;
        Ok(serde_json::from_str(&output)?)
    }

    /// Merge EKS cluster credentials into the kubeconfig
    pub async fn update_kubeconfig(
        &self,
        cluster: &str,
        alias: Option<&str>,
        kubeconfig: Option<&Path>,
    ) -> Result<()> {
        let kubeconfig = kubeconfig.map(|p| p.to_string_lossy().to_string());
        let spec = self
            .command(&self.region)
            .args(["eks", "update-kubeconfig", "--name", cluster])
            .opt_arg("--alias", alias)
            .opt_arg("--kubeconfig", kubeconfig.as_deref());
        self.run_command(spec).await?;
        Ok(())
    }

    pub async fn create_db_instance(&self, request: &ManagedDatabaseRequest) -> Result<()> {
        let storage = request.storage_gb.to_string();
        let spec = self
            .command(&request.region)
            .args([
                "rds",
                "create-db-instance",
                "--db-instance-identifier",
                request.name.as_str(),
                "--db-instance-class",
                request.instance_type.as_str(),
                "--engine",
                engine_name(request.engine),
                "--allocated-storage",
                storage.as_str(),
                "--master-username",
                request.credentials.username.as_str(),
                "--master-user-password",
            ])
            .secret_arg(request.credentials.password.as_str())
            .arg("--no-publicly-accessible")
            .opt_arg("--engine-version", request.engine_version.as_deref());

        self.run_command(spec).await?;
        Ok(())
    }

    /// Blocks until the instance is available or `timeout` elapses
    pub async fn wait_db_instance_available(
        &self,
        identifier: &str,
        region: &str,
        timeout: Duration,
    ) -> Result<()> {
        let spec = self
            .command(region)
            .args([
                "rds",
                "wait",
                "db-instance-available",
                "--db-instance-identifier",
                identifier,
            ])
            .timeout(timeout);
        self.run_command(spec).await?;
        Ok(())
    }

    /// `None` when the instance does not exist
    pub async fn describe_db_instance(
        &self,
        identifier: &str,
        region: &str,
    ) -> Result<Option<DbInstance>> {
        let spec = self.command(region).args([
            "rds",
            "describe-db-instances",
            "--db-instance-identifier",
            identifier,
        ]);

        let output = match self.run_command(spec).await {
            Ok(output) => output,
            Err(AwsError::CommandFailed(msg)) if msg.contains("DBInstanceNotFound") => {
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let described: DescribeDbInstances = serde_json::from_str(&output)?;
        Ok(described.db_instances.into_iter().next())
    }

    pub async fn delete_db_instance(&self, identifier: &str, region: &str) -> Result<()> {
        let spec = self.command(region).args([
            "rds",
            "delete-db-instance",
            "--db-instance-identifier",
            identifier,
            "--skip-final-snapshot",
        ]);
        self.run_command(spec).await?;
        Ok(())
    }
}

fn engine_name(engine: DatabaseEngine) -> &'static str {
    match engine {
        DatabaseEngine::Postgresql => "postgres",
        DatabaseEngine::Mysql => "mysql",
    }
}

/// Output of `aws sts get-caller-identity`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CallerIdentity {
    pub user_id: String,
    pub account: String,
    pub arn: String,
}

#[derive(Debug, Deserialize)]
struct DescribeDbInstances {
    #[serde(rename = "DBInstances", default)]
    db_instances: Vec<DbInstance>,
}

/// RDS instance as returned by `describe-db-instances`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbInstance {
    #[serde(rename = "DBInstanceIdentifier")]
    pub identifier: String,

    #[serde(rename = "DBInstanceStatus")]
    pub status: String,

    #[serde(rename = "Endpoint", default)]
    pub endpoint: Option<DbEndpoint>,

    #[serde(rename = "DBName", default)]
    pub db_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DbEndpoint {
    pub address: String,
    pub port: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_describe_output() {
        let json = r#"{
            "DBInstances": [{
                "DBInstanceIdentifier": "shop-db",
                "DBInstanceClass": "db.t3.micro",
                "Engine": "postgres",
                "DBInstanceStatus": "available",
                "Endpoint": {"Address": "shop-db.abc123.eu-west-1.rds.amazonaws.com", "Port": 5432},
                "AllocatedStorage": 20
            }]
        }"#;

        let described: DescribeDbInstances = serde_json::from_str(json).unwrap();
        let instance = &described.db_instances[0];
        assert_eq!(instance.status, "available");
        assert_eq!(instance.endpoint.as_ref().unwrap().port, 5432);
        assert!(instance.db_name.is_none());
    }

    #[test]
    fn test_parse_creating_instance_without_endpoint() {
        let json = r#"{"DBInstances": [{"DBInstanceIdentifier": "x", "DBInstanceStatus": "creating"}]}"#;
        let described: DescribeDbInstances = serde_json::from_str(json).unwrap();
        assert!(described.db_instances[0].endpoint.is_none());
    }
}
