//! az CLI wrapper

use crate::error::{AzureError, Result};
use hostplane_cloud::{
    CommandError, CommandRunner, CommandSpec, DatabaseEngine, ManagedDatabaseRequest,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const AZ: &str = "az";

/// Command group of a flexible server engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlexibleService {
    Postgres,
    Mysql,
}

impl FlexibleService {
    pub fn group(&self) -> &'static str {
        match self {
            FlexibleService::Postgres => "postgres",
            FlexibleService::Mysql => "mysql",
        }
    }

    pub fn engine(&self) -> DatabaseEngine {
        match self {
            FlexibleService::Postgres => DatabaseEngine::Postgresql,
            FlexibleService::Mysql => DatabaseEngine::Mysql,
        }
    }

    /// Provider id of a server: `<engine>/<name>`
    pub fn server_id(&self, name: &str) -> String {
        format!("{}/{}", self.engine(), name)
    }

    /// Splits a provider id; a bare name is a PostgreSQL server
    pub fn parse_id(id: &str) -> (Self, &str) {
        match id.split_once('/') {
            Some((engine, name)) => match engine.parse::<DatabaseEngine>() {
                Ok(engine) => (Self::from(engine), name),
                Err(_) => (FlexibleService::Postgres, id),
            },
            None => (FlexibleService::Postgres, id),
        }
    }
}

impl From<DatabaseEngine> for FlexibleService {
    fn from(engine: DatabaseEngine) -> Self {
        match engine {
            DatabaseEngine::Postgresql => FlexibleService::Postgres,
            DatabaseEngine::Mysql => FlexibleService::Mysql,
        }
    }
}

/// Pricing tier implied by a SKU name
fn tier_for_sku(sku: &str) -> &'static str {
    if sku.starts_with("Standard_B") {
        "Burstable"
    } else if sku.starts_with("Standard_E") {
        "MemoryOptimized"
    } else {
        "GeneralPurpose"
    }
}

/// az CLI wrapper
pub struct AzCli {
    runner: Arc<dyn CommandRunner>,
    subscription: Option<String>,
    timeout: Duration,
}

impl AzCli {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        subscription: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            runner,
            subscription,
            timeout,
        }
    }

    fn command(&self) -> CommandSpec {
        CommandSpec::new(AZ).timeout(self.timeout)
    }

    /// Run an az command and return stdout
    async fn run_command(&self, spec: CommandSpec) -> Result<String> {
        let spec = spec
            .opt_arg("--subscription", self.subscription.as_deref())
            .args(["--output", "json"]);

        let output = self.runner.run(&spec).await.map_err(|e| match e {
            CommandError::NotFound(_) => AzureError::CliNotFound,
            CommandError::TimedOut { .. } => AzureError::TimedOut(e.to_string()),
            other => AzureError::CommandFailed(other.to_string()),
        })?;

        if !output.is_success() {
            let message = output.error_message();
            if message.contains("az login") {
                return Err(AzureError::NotLoggedIn);
            }
            return Err(AzureError::CommandFailed(message));
        }

        Ok(output.stdout)
    }

    pub async fn account_show(&self) -> Result<AzAccount> {
        let output = self
            .run_command(self.command().args(["account", "show"]))
            .await?;
        Ok(serde_json::from_str(&output)?)
    }

    /// Merge AKS credentials into the kubeconfig
    pub async fn aks_get_credentials(
        &self,
        resource_group: &str,
        cluster: &str,
        context: Option<&str>,
        kubeconfig: Option<&Path>,
    ) -> Result<()> {
        let kubeconfig = kubeconfig.map(|p| p.to_string_lossy().to_string());
        let spec = self
            .command()
            .args([
                "aks",
                "get-credentials",
                "--resource-group",
                resource_group,
                "--name",
                cluster,
                "--overwrite-existing",
            ])
            .opt_arg("--context", context)
            .opt_arg("--file", kubeconfig.as_deref());
        self.run_command(spec).await?;
        Ok(())
    }

    /// Creates a flexible server; blocks until Azure reports completion
    pub async fn flexible_server_create(
        &self,
        resource_group: &str,
        request: &ManagedDatabaseRequest,
        timeout: Duration,
    ) -> Result<()> {
        let service = FlexibleService::from(request.engine);
        let storage = request.storage_gb.to_string();
        let spec = self
            .command()
            .args([
                service.group(),
                "flexible-server",
                "create",
                "--resource-group",
                resource_group,
                "--name",
                request.name.as_str(),
                "--location",
                request.region.as_str(),
                "--sku-name",
                request.instance_type.as_str(),
                "--tier",
                tier_for_sku(&request.instance_type),
                "--storage-size",
                storage.as_str(),
                "--admin-user",
                request.credentials.username.as_str(),
                "--admin-password",
            ])
            .secret_arg(request.credentials.password.as_str())
            .opt_arg("--version", request.engine_version.as_deref())
            .args(["--public-access", "0.0.0.0", "--yes"])
            .timeout(timeout);
        self.run_command(spec).await?;
        Ok(())
    }

    /// `None` when the server does not exist
    pub async fn flexible_server_show(
        &self,
        resource_group: &str,
        service: FlexibleService,
        name: &str,
    ) -> Result<Option<FlexibleServer>> {
        let spec = self.command().args([
            service.group(),
            "flexible-server",
            "show",
            "--resource-group",
            resource_group,
            "--name",
            name,
        ]);

        match self.run_command(spec).await {
            Ok(output) => Ok(Some(serde_json::from_str(&output)?)),
            Err(AzureError::CommandFailed(msg)) if msg.contains("ResourceNotFound") => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn flexible_server_parameter_set(
        &self,
        resource_group: &str,
        service: FlexibleService,
        server: &str,
        name: &str,
        value: &str,
    ) -> Result<()> {
        let spec = self.command().args([
            service.group(),
            "flexible-server",
            "parameter",
            "set",
            "--resource-group",
            resource_group,
            "--server-name",
            server,
            "--name",
            name,
            "--value",
            value,
        ]);
        self.run_command(spec).await?;
        Ok(())
    }

    pub async fn flexible_server_delete(
        &self,
        resource_group: &str,
        service: FlexibleService,
        name: &str,
    ) -> Result<()> {
        let spec = self.command().args([
            service.group(),
            "flexible-server",
            "delete",
            "--resource-group",
            resource_group,
            "--name",
            name,
            "--yes",
        ]);
        self.run_command(spec).await?;
        Ok(())
    }
}

/// Output of `az account show`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AzAccount {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub user: Option<AzUser>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AzUser {
    pub name: String,
}

/// Flexible server as returned by `show`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlexibleServer {
    pub name: String,
    #[serde(default)]
    pub fully_qualified_domain_name: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_for_sku() {
        assert_eq!(tier_for_sku("Standard_B1ms"), "Burstable");
        assert_eq!(tier_for_sku("Standard_D2ds_v5"), "GeneralPurpose");
        assert_eq!(tier_for_sku("Standard_E2ds_v5"), "MemoryOptimized");
    }

    #[test]
    fn test_server_ids() {
        assert_eq!(FlexibleService::Mysql.server_id("blog"), "mysql/blog");
        assert_eq!(
            FlexibleService::parse_id("mysql/blog"),
            (FlexibleService::Mysql, "blog")
        );
        assert_eq!(
            FlexibleService::parse_id("postgresql/shop"),
            (FlexibleService::Postgres, "shop")
        );
        assert_eq!(
            FlexibleService::parse_id("legacy-name"),
            (FlexibleService::Postgres, "legacy-name")
        );
    }

    #[test]
    fn test_parse_show_output() {
        let json = r#"{
            "name": "shop-db",
            "fullyQualifiedDomainName": "shop-db.postgres.database.azure.com",
            "state": "Ready",
            "sku": {"name": "Standard_B1ms", "tier": "Burstable"}
        }"#;
        let server: FlexibleServer = serde_json::from_str(json).unwrap();
        assert_eq!(server.state.as_deref(), Some("Ready"));
        assert_eq!(
            server.fully_qualified_domain_name.as_deref(),
            Some("shop-db.postgres.database.azure.com")
        );
    }
}
