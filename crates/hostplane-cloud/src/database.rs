//! Managed database types

use crate::error::{CloudError, Result};
use crate::secret::SecretCipher;
use chrono::{DateTime, Utc};
use hostplane_detect::ProviderKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Database engine offered by managed providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseEngine {
    #[default]
    Postgresql,
    Mysql,
}

impl DatabaseEngine {
    pub fn default_port(&self) -> u16 {
        match self {
            DatabaseEngine::Postgresql => 5432,
            DatabaseEngine::Mysql => 3306,
        }
    }
}

impl std::fmt::Display for DatabaseEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseEngine::Postgresql => write!(f, "postgresql"),
            DatabaseEngine::Mysql => write!(f, "mysql"),
        }
    }
}

impl std::str::FromStr for DatabaseEngine {
    type Err = CloudError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgresql" | "postgres" | "pg" => Ok(DatabaseEngine::Postgresql),
            "mysql" => Ok(DatabaseEngine::Mysql),
            other => Err(CloudError::InvalidConfig(format!(
                "unsupported database engine: {}",
                other
            ))),
        }
    }
}

/// Administrator credentials for a new instance
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseCredentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for DatabaseCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseCredentials")
            .field("username", &self.username)
            .field("password", &"****")
            .finish()
    }
}

/// Input to `ManagedDatabaseProvider::provision`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedDatabaseRequest {
    /// Instance identifier at the provider
    pub name: String,
    pub provider: ProviderKind,
    pub region: String,
    /// Instance class / tier / flavor code
    pub instance_type: String,
    pub storage_gb: u32,
    #[serde(default)]
    pub engine: DatabaseEngine,
    #[serde(default)]
    pub engine_version: Option<String>,
    pub credentials: DatabaseCredentials,
    #[serde(default = "default_ssl_required")]
    pub ssl_required: bool,
}

fn default_ssl_required() -> bool {
    true
}

impl ManagedDatabaseRequest {
    /// Checks the request against an adapter's offerings before any external call
    pub fn validate(
        &self,
        instance_types: &BTreeMap<String, String>,
        regions: &BTreeMap<String, String>,
    ) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(CloudError::InvalidConfig("database name is required".into()));
        }
        if self.storage_gb == 0 {
            return Err(CloudError::InvalidConfig("storage must be at least 1 GB".into()));
        }
        if self.credentials.username.trim().is_empty() {
            return Err(CloudError::InvalidConfig("database username is required".into()));
        }
        if !regions.contains_key(&self.region) {
            return Err(CloudError::InvalidConfig(format!(
                "region '{}' is not offered by {}",
                self.region, self.provider
            )));
        }
        if !instance_types.contains_key(&self.instance_type) {
            return Err(CloudError::InvalidConfig(format!(
                "instance type '{}' is not offered by {}",
                self.instance_type, self.provider
            )));
        }
        Ok(())
    }
}

/// Connection metadata of a provisioned instance
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseEndpoint {
    pub instance_id: String,
    pub host: String,
    pub port: u16,
    pub database: Option<String>,
    /// Set when the provider generated the password itself
    #[serde(skip)]
    pub generated_password: Option<String>,
}

impl std::fmt::Debug for DatabaseEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseEndpoint")
            .field("instance_id", &self.instance_id)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field(
                "generated_password",
                &self.generated_password.as_ref().map(|_| "****"),
            )
            .finish()
    }
}

impl DatabaseEndpoint {
    pub fn new(instance_id: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            instance_id: instance_id.into(),
            host: host.into(),
            port,
            database: None,
            generated_password: None,
        }
    }
}

/// `{success, connection|error}` answer of a provisioning call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionResult {
    pub success: bool,
    pub endpoint: Option<DatabaseEndpoint>,
    pub error: Option<String>,
    /// Provider identifier of a resource that exists remotely despite the failure
    pub instance_id: Option<String>,
}

impl ProvisionResult {
    pub fn ok(endpoint: DatabaseEndpoint) -> Self {
        Self {
            success: true,
            instance_id: Some(endpoint.instance_id.clone()),
            endpoint: Some(endpoint),
            error: None,
        }
    }

    /// Nothing was created remotely
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            endpoint: None,
            error: Some(error.into()),
            instance_id: None,
        }
    }

    /// The instance was created but a follow-up step failed; it must still be
    /// deprovisioned through `instance_id`
    pub fn failed_after_create(instance_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            instance_id: Some(instance_id.into()),
            ..Self::failed(error)
        }
    }
}

/// Lifecycle status of a managed database record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Pending,
    Provisioning,
    Available,
    Failed,
    TimedOut,
    Deleting,
    Deleted,
}

impl InstanceStatus {
    /// A provision call is outstanding; a second one must not be issued
    pub fn is_in_flight(&self) -> bool {
        matches!(self, InstanceStatus::Pending | InstanceStatus::Provisioning)
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstanceStatus::Pending => write!(f, "pending"),
            InstanceStatus::Provisioning => write!(f, "provisioning"),
            InstanceStatus::Available => write!(f, "available"),
            InstanceStatus::Failed => write!(f, "failed"),
            InstanceStatus::TimedOut => write!(f, "timed_out"),
            InstanceStatus::Deleting => write!(f, "deleting"),
            InstanceStatus::Deleted => write!(f, "deleted"),
        }
    }
}

/// Persisted managed database record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagedDatabaseInstance {
    /// Name the instance was requested under
    pub id: String,
    pub provider: ProviderKind,
    /// Identifier the provider assigned, when it differs from the name
    #[serde(default)]
    pub provider_id: Option<String>,
    pub region: String,
    pub instance_type: String,
    pub storage_gb: u32,
    pub engine: DatabaseEngine,
    pub status: InstanceStatus,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub username: String,
    /// `base64(nonce || ciphertext)`, see [`SecretCipher`]
    pub encrypted_password: Option<String>,
    pub ssl_required: bool,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ManagedDatabaseInstance {
    /// New record in `pending` state for a request
    pub fn from_request(request: &ManagedDatabaseRequest) -> Self {
        let now = Utc::now();
        Self {
            id: request.name.clone(),
            provider: request.provider,
            provider_id: None,
            region: request.region.clone(),
            instance_type: request.instance_type.clone(),
            storage_gb: request.storage_gb,
            engine: request.engine,
            status: InstanceStatus::Pending,
            host: None,
            port: None,
            database: None,
            username: request.credentials.username.clone(),
            encrypted_password: None,
            ssl_required: request.ssl_required,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_status(mut self, status: InstanceStatus) -> Self {
        self.set_status(status);
        self
    }

    pub fn set_status(&mut self, status: InstanceStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// Identifier to pass to the provider for this instance
    pub fn provider_ref(&self) -> &str {
        self.provider_id.as_deref().unwrap_or(&self.id)
    }

    /// Endpoint for connection tests, if the instance has one
    pub fn endpoint(&self) -> Option<DatabaseEndpoint> {
        let host = self.host.clone()?;
        let port = self.port?;
        Some(DatabaseEndpoint {
            instance_id: self.provider_ref().to_string(),
            host,
            port,
            database: self.database.clone(),
            generated_password: None,
        })
    }

    pub fn decrypt_password(&self, cipher: &SecretCipher) -> Result<String> {
        let encrypted = self.encrypted_password.as_deref().ok_or_else(|| {
            CloudError::Secret(format!("no password stored for '{}'", self.id))
        })?;
        cipher.decrypt(encrypted)
    }
}

/// TCP reachability check used by connection tests
pub async fn probe_tcp(host: &str, port: u16, timeout: Duration) -> bool {
    let address = format!("{}:{}", host, port);
    match tokio::time::timeout(timeout, tokio::net::TcpStream::connect(&address)).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            tracing::debug!(%address, error = %e, "Database endpoint refused connection");
            false
        }
        Err(_) => {
            tracing::debug!(%address, "Database endpoint connection timed out");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ManagedDatabaseRequest {
        ManagedDatabaseRequest {
            name: "shop-db".into(),
            provider: ProviderKind::Aws,
            region: "eu-west-1".into(),
            instance_type: "db.t3.micro".into(),
            storage_gb: 20,
            engine: DatabaseEngine::Postgresql,
            engine_version: None,
            credentials: DatabaseCredentials {
                username: "shop".into(),
                password: "hunter22".into(),
            },
            ssl_required: true,
        }
    }

    fn offerings() -> (BTreeMap<String, String>, BTreeMap<String, String>) {
        (
            BTreeMap::from([("db.t3.micro".to_string(), "Micro".to_string())]),
            BTreeMap::from([("eu-west-1".to_string(), "Ireland".to_string())]),
        )
    }

    #[test]
    fn test_validate_against_offerings() {
        let (types, regions) = offerings();
        assert!(request().validate(&types, &regions).is_ok());

        let mut bad_region = request();
        bad_region.region = "mars-1".into();
        assert!(matches!(
            bad_region.validate(&types, &regions),
            Err(CloudError::InvalidConfig(_))
        ));

        let mut no_storage = request();
        no_storage.storage_gb = 0;
        assert!(no_storage.validate(&types, &regions).is_err());
    }

    #[test]
    fn test_debug_hides_passwords() {
        let printed = format!("{:?}", request());
        assert!(!printed.contains("hunter22"));

        let mut endpoint = DatabaseEndpoint::new("id", "db.example.com", 5432);
        endpoint.generated_password = Some("generated-secret".into());
        assert!(!format!("{:?}", endpoint).contains("generated-secret"));
    }

    #[test]
    fn test_in_flight_statuses() {
        assert!(InstanceStatus::Pending.is_in_flight());
        assert!(InstanceStatus::Provisioning.is_in_flight());
        assert!(!InstanceStatus::TimedOut.is_in_flight());
        assert!(!InstanceStatus::Available.is_in_flight());
    }

    #[tokio::test]
    async fn test_probe_tcp() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(probe_tcp("127.0.0.1", port, Duration::from_secs(1)).await);

        drop(listener);
        assert!(!probe_tcp("127.0.0.1", port, Duration::from_millis(500)).await);
    }
}
