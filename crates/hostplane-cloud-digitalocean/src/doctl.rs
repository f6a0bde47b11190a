//! doctl CLI wrapper

use crate::error::{DigitalOceanError, Result};
use hostplane_cloud::{
    CommandError, CommandRunner, CommandSpec, DatabaseEngine, ManagedDatabaseRequest,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const DOCTL: &str = "doctl";

/// Environment variable doctl reads its token from
pub const TOKEN_ENV: &str = "DIGITALOCEAN_ACCESS_TOKEN";

/// doctl engine slug
pub fn engine_slug(engine: DatabaseEngine) -> &'static str {
    match engine {
        DatabaseEngine::Postgresql => "pg",
        DatabaseEngine::Mysql => "mysql",
    }
}

/// Database cluster ids are UUIDs; anything else is a cluster name
pub fn is_cluster_id(id: &str) -> bool {
    id.len() == 36
        && id.chars().enumerate().all(|(i, c)| match i {
            8 | 13 | 18 | 23 => c == '-',
            _ => c.is_ascii_hexdigit(),
        })
}

/// doctl CLI wrapper
pub struct Doctl {
    runner: Arc<dyn CommandRunner>,
    access_token: Option<String>,
    /// doctl auth context
    context: Option<String>,
    timeout: Duration,
}

impl Doctl {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        access_token: Option<String>,
        context: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            runner,
            access_token,
            context,
            timeout,
        }
    }

    fn command(&self) -> CommandSpec {
        let spec = CommandSpec::new(DOCTL).timeout(self.timeout);
        match &self.access_token {
            Some(token) => spec.env(TOKEN_ENV, token.as_str()),
            None => spec,
        }
    }

    /// Run a doctl command and return stdout
    async fn run_command(&self, spec: CommandSpec) -> Result<String> {
        let spec = spec
            .opt_arg("--context", self.context.as_deref())
            .args(["--output", "json"]);

        let output = self.runner.run(&spec).await.map_err(|e| match e {
            CommandError::NotFound(_) => DigitalOceanError::CliNotFound,
            CommandError::TimedOut { .. } => DigitalOceanError::TimedOut(e.to_string()),
            other => DigitalOceanError::CommandFailed(other.to_string()),
        })?;

        if !output.is_success() {
            return Err(DigitalOceanError::CommandFailed(output.error_message()));
        }

        Ok(output.stdout)
    }

    pub async fn account_get(&self) -> Result<Account> {
        let output = self
            .run_command(self.command().args(["account", "get"]))
            .await?;
        Ok(serde_json::from_str(&output)?)
    }

    pub async fn kubeconfig_save(&self, cluster: &str, kubeconfig: Option<&Path>) -> Result<()> {
        let mut spec = self
            .command()
            .args(["kubernetes", "cluster", "kubeconfig", "save", cluster]);
        if let Some(path) = kubeconfig {
            spec = spec.env("KUBECONFIG", path.to_string_lossy());
        }
        self.run_command(spec).await?;
        Ok(())
    }

    /// Creates a database cluster and waits until it is online
    pub async fn databases_create(
        &self,
        request: &ManagedDatabaseRequest,
        timeout: Duration,
    ) -> Result<Database> {
        let storage_mib = (u64::from(request.storage_gb) * 1024).to_string();
        let spec = self
            .command()
            .args([
                "databases",
                "create",
                request.name.as_str(),
                "--engine",
                engine_slug(request.engine),
                "--region",
                request.region.as_str(),
                "--size",
                request.instance_type.as_str(),
                "--num-nodes",
                "1",
                "--storage-size-mib",
                storage_mib.as_str(),
            ])
            .opt_arg("--version", request.engine_version.as_deref())
            .arg("--wait")
            .timeout(timeout);
        let output = self.run_command(spec).await?;
        first(serde_json::from_str(&output)?, &request.name)
    }

    /// Adds a user; DigitalOcean generates its password
    pub async fn databases_user_create(&self, cluster_id: &str, name: &str) -> Result<DatabaseUser> {
        let spec = self
            .command()
            .args(["databases", "user", "create", cluster_id, name]);
        let output = self.run_command(spec).await?;
        first(serde_json::from_str(&output)?, name)
    }

    pub async fn databases_list(&self) -> Result<Vec<Database>> {
        let output = self
            .run_command(self.command().args(["databases", "list"]))
            .await?;
        if output.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&output)?)
    }

    /// `None` when the cluster does not exist
    pub async fn databases_get(&self, id: &str) -> Result<Option<Database>> {
        let Some(cluster_id) = self.resolve(id).await? else {
            return Ok(None);
        };
        let spec = self.command().args(["databases", "get", cluster_id.as_str()]);
        match self.run_command(spec).await {
            Ok(output) => {
                let databases: Vec<Database> = serde_json::from_str(&output)?;
                Ok(databases.into_iter().next())
            }
            Err(DigitalOceanError::CommandFailed(msg)) if msg.contains("404") => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn databases_delete(&self, id: &str) -> Result<()> {
        let cluster_id = self
            .resolve(id)
            .await?
            .ok_or_else(|| DigitalOceanError::DatabaseNotFound(id.to_string()))?;
        let spec = self
            .command()
            .args(["databases", "delete", cluster_id.as_str(), "--force"]);
        self.run_command(spec).await?;
        Ok(())
    }

    /// Cluster UUID for an id or a name
    async fn resolve(&self, id: &str) -> Result<Option<String>> {
        if is_cluster_id(id) {
            return Ok(Some(id.to_string()));
        }
        debug!(name = id, "Resolving database cluster by name");
        Ok(self
            .databases_list()
            .await?
            .into_iter()
            .find(|db| db.name == id)
            .map(|db| db.id))
    }
}

fn first<T>(items: Vec<T>, what: &str) -> Result<T> {
    items
        .into_iter()
        .next()
        .ok_or_else(|| DigitalOceanError::UnexpectedOutput(format!("empty response for {}", what)))
}

/// Output of `doctl account get`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub email: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub team: Option<Team>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub name: String,
}

/// Managed database cluster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Database {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub engine: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub connection: Option<Connection>,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct Connection {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseUser {
    pub name: String,
    #[serde(default)]
    pub password: Option<String>,
}

impl std::fmt::Debug for DatabaseUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseUser")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
