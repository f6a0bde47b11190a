//! gcloud CLI wrapper

use crate::error::{GcpError, Result};
use hostplane_cloud::{
    CommandError, CommandRunner, CommandSpec, DatabaseEngine, ManagedDatabaseRequest,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const GCLOUD: &str = "gcloud";

/// `--database-version` value for an engine and optional version
pub fn database_version(engine: DatabaseEngine, version: Option<&str>) -> String {
    let (prefix, default) = match engine {
        DatabaseEngine::Postgresql => ("POSTGRES", "16"),
        DatabaseEngine::Mysql => ("MYSQL", "8_0"),
    };
    let version = version.unwrap_or(default).replace('.', "_");
    format!("{}_{}", prefix, version)
}

/// gcloud CLI wrapper
pub struct Gcloud {
    runner: Arc<dyn CommandRunner>,
    project: Option<String>,
    timeout: Duration,
}

impl Gcloud {
    pub fn new(runner: Arc<dyn CommandRunner>, project: Option<String>, timeout: Duration) -> Self {
        Self {
            runner,
            project,
            timeout,
        }
    }

    fn command(&self) -> CommandSpec {
        CommandSpec::new(GCLOUD).timeout(self.timeout)
    }

    /// Run a gcloud command and return stdout
    async fn run_command(&self, spec: CommandSpec) -> Result<String> {
        let spec = spec
            .opt_arg("--project", self.project.as_deref())
            .arg("--format=json");

        let output = self.runner.run(&spec).await.map_err(|e| match e {
            CommandError::NotFound(_) => GcpError::GcloudNotFound,
            CommandError::TimedOut { .. } => GcpError::TimedOut(e.to_string()),
            other => GcpError::CommandFailed(other.to_string()),
        })?;

        if !output.is_success() {
            let message = output.error_message();
            // gcloud stops waiting on long operations but leaves them running
            if message.contains("taking longer than expected") {
                return Err(GcpError::TimedOut(message));
            }
            return Err(GcpError::CommandFailed(message));
        }

        Ok(output.stdout)
    }

    /// Credentialed accounts with ACTIVE status
    pub async fn active_accounts(&self) -> Result<Vec<GcloudAccount>> {
        let output = self
            .run_command(
                self.command()
                    .args(["auth", "list", "--filter=status:ACTIVE"]),
            )
            .await?;
        if output.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&output)?)
    }

    pub async fn get_credentials(
        &self,
        cluster: &str,
        location: &str,
        kubeconfig: Option<&Path>,
    ) -> Result<()> {
        let mut spec = self.command().args([
            "container",
            "clusters",
            "get-credentials",
            cluster,
            "--location",
            location,
        ]);
        if let Some(path) = kubeconfig {
            spec = spec.env("KUBECONFIG", path.to_string_lossy());
        }
        self.run_command(spec).await?;
        Ok(())
    }

    /// Creates a Cloud SQL instance; blocks until the operation finishes
    pub async fn sql_instances_create(
        &self,
        request: &ManagedDatabaseRequest,
        timeout: Duration,
    ) -> Result<()> {
        let version = database_version(request.engine, request.engine_version.as_deref());
        let storage = format!("{}GB", request.storage_gb);
        let ssl_mode = if request.ssl_required {
            "ENCRYPTED_ONLY"
        } else {
            "ALLOW_UNENCRYPTED_AND_ENCRYPTED"
        };
        let spec = self
            .command()
            .args([
                "sql",
                "instances",
                "create",
                request.name.as_str(),
                "--database-version",
                version.as_str(),
                "--tier",
                request.instance_type.as_str(),
                "--region",
                request.region.as_str(),
                "--storage-size",
                storage.as_str(),
                "--ssl-mode",
                ssl_mode,
            ])
            .timeout(timeout);
        self.run_command(spec).await?;
        Ok(())
    }

    pub async fn sql_users_create(
        &self,
        instance: &str,
        username: &str,
        password: &str,
    ) -> Result<()> {
        let spec = self
            .command()
            .args(["sql", "users", "create", username, "--instance", instance, "--password"])
            .secret_arg(password);
        self.run_command(spec).await?;
        Ok(())
    }

    /// `None` when the instance does not exist
    pub async fn sql_instances_describe(&self, instance: &str) -> Result<Option<SqlInstance>> {
        let spec = self
            .command()
            .args(["sql", "instances", "describe", instance]);
        match self.run_command(spec).await {
            Ok(output) => Ok(Some(serde_json::from_str(&output)?)),
            Err(GcpError::CommandFailed(msg))
                if msg.contains("does not exist") || msg.contains("HTTPError 404") =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn sql_instances_delete(&self, instance: &str) -> Result<()> {
        let spec = self
            .command()
            .args(["sql", "instances", "delete", instance, "--quiet"]);
        self.run_command(spec).await?;
        Ok(())
    }
}

/// Entry of `gcloud auth list`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcloudAccount {
    pub account: String,
    pub status: String,
}

/// Cloud SQL instance as returned by `describe`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqlInstance {
    pub name: String,
    pub state: String,
    #[serde(default)]
    pub ip_addresses: Vec<IpMapping>,
}

impl SqlInstance {
    /// Public address, falling back to any address
    pub fn primary_address(&self) -> Option<&str> {
        self.ip_addresses
            .iter()
            .find(|ip| ip.kind.as_deref() == Some("PRIMARY"))
            .or_else(|| self.ip_addresses.first())
            .map(|ip| ip.ip_address.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpMapping {
    pub ip_address: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_version() {
        assert_eq!(database_version(DatabaseEngine::Postgresql, None), "POSTGRES_16");
        assert_eq!(database_version(DatabaseEngine::Postgresql, Some("15")), "POSTGRES_15");
        assert_eq!(database_version(DatabaseEngine::Mysql, Some("8.4")), "MYSQL_8_4");
    }

    #[test]
    fn test_primary_address() {
        let json = r#"{
            "name": "shop-db",
            "state": "RUNNABLE",
            "ipAddresses": [
                {"ipAddress": "10.20.0.3", "type": "PRIVATE"},
                {"ipAddress": "34.76.10.2", "type": "PRIMARY"}
            ]
        }"#;
        let instance: SqlInstance = serde_json::from_str(json).unwrap();
        assert_eq!(instance.primary_address(), Some("34.76.10.2"));

        let pending: SqlInstance =
            serde_json::from_str(r#"{"name": "x", "state": "PENDING_CREATE"}"#).unwrap();
        assert_eq!(pending.primary_address(), None);
    }
}
