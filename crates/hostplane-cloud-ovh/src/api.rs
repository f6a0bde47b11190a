//! Signed OVHcloud REST API client
//!
//! Every authenticated call carries the application key, the consumer key, a
//! timestamp and a signature:
//!
//! ```text
//! "$1$" + sha1_hex(AS + "+" + CK + "+" + METHOD + "+" + URL + "+" + BODY + "+" + TS)
//! ```
//!
//! The timestamp is the API server's clock. Its offset to the local clock is
//! fetched once from `/auth/time`.

use crate::error::{OvhError, Result};
use hostplane_cloud::DatabaseEngine;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::debug;

pub const APPLICATION_KEY_ENV: &str = "OVH_APPLICATION_KEY";
pub const APPLICATION_SECRET_ENV: &str = "OVH_APPLICATION_SECRET";
pub const CONSUMER_KEY_ENV: &str = "OVH_CONSUMER_KEY";

/// Regional API endpoint
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ApiEndpoint {
    #[default]
    Europe,
    Canada,
    UnitedStates,
    /// Explicit base URL
    Custom(String),
}

impl ApiEndpoint {
    pub fn base_url(&self) -> &str {
        match self {
            ApiEndpoint::Europe => "https://eu.api.ovh.com/1.0",
            ApiEndpoint::Canada => "https://ca.api.ovh.com/1.0",
            ApiEndpoint::UnitedStates => "https://api.us.ovhcloud.com/1.0",
            ApiEndpoint::Custom(url) => url.trim_end_matches('/'),
        }
    }
}

impl FromStr for ApiEndpoint {
    type Err = OvhError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "ovh-eu" => Ok(ApiEndpoint::Europe),
            "ovh-ca" => Ok(ApiEndpoint::Canada),
            "ovh-us" => Ok(ApiEndpoint::UnitedStates),
            url if url.starts_with("http://") || url.starts_with("https://") => {
                Ok(ApiEndpoint::Custom(url.to_string()))
            }
            other => Err(OvhError::UnknownEndpoint(other.to_string())),
        }
    }
}

/// Application and consumer credentials
#[derive(Clone, PartialEq, Eq)]
pub struct OvhCredentials {
    pub application_key: String,
    pub application_secret: String,
    pub consumer_key: String,
}

impl OvhCredentials {
    /// Reads the three `OVH_*` variables; `None` unless all are set
    pub fn from_env() -> Option<Self> {
        let read = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());
        Some(Self {
            application_key: read(APPLICATION_KEY_ENV)?,
            application_secret: read(APPLICATION_SECRET_ENV)?,
            consumer_key: read(CONSUMER_KEY_ENV)?,
        })
    }

    /// Request signature for a full URL, body and server timestamp
    pub fn sign(&self, method: &Method, url: &str, body: &str, timestamp: i64) -> String {
        let mut hasher = Sha1::new();
        hasher.update(
            format!(
                "{}+{}+{}+{}+{}+{}",
                self.application_secret,
                self.consumer_key,
                method.as_str(),
                url,
                body,
                timestamp
            )
            .as_bytes(),
        );
        format!("$1${:x}", hasher.finalize())
    }
}

impl std::fmt::Debug for OvhCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OvhCredentials")
            .field("application_key", &self.application_key)
            .finish_non_exhaustive()
    }
}

/// API path segment of a database engine
pub fn engine_path(engine: DatabaseEngine) -> &'static str {
    match engine {
        DatabaseEngine::Postgresql => "postgresql",
        DatabaseEngine::Mysql => "mysql",
    }
}

/// OVHcloud API client
pub struct OvhClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Option<OvhCredentials>,
    time_delta: OnceCell<i64>,
}

impl OvhClient {
    pub fn new(
        endpoint: &ApiEndpoint,
        credentials: Option<OvhCredentials>,
        timeout: Duration,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: endpoint.base_url().to_string(),
            credentials,
            time_delta: OnceCell::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Server clock minus local clock, in seconds
    async fn time_delta(&self) -> Result<i64> {
        self.time_delta
            .get_or_try_init(|| async {
                let response = self.http.get(self.url("/auth/time")).send().await?;
                let body = Self::check(response).await?;
                let server: i64 = body.trim().parse().map_err(|_| {
                    OvhError::UnexpectedResponse(format!("invalid server time: {}", body))
                })?;
                Ok::<i64, OvhError>(server - chrono::Utc::now().timestamp())
            })
            .await
            .copied()
    }

    async fn check(response: reqwest::Response) -> Result<String> {
        let status = response.status();
        let body = response.text().await?;
        if status.is_success() {
            return Ok(body);
        }
        #[derive(Deserialize)]
        struct ApiMessage {
            message: String,
        }
        let message = serde_json::from_str::<ApiMessage>(&body)
            .map(|m| m.message)
            .unwrap_or(body);
        Err(OvhError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn call(&self, method: Method, path: &str, body: Option<&serde_json::Value>) -> Result<String> {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or(OvhError::MissingCredentials)?;
        let url = self.url(path);
        let body = match body {
            Some(value) => serde_json::to_string(value)?,
            None => String::new(),
        };
        let timestamp = chrono::Utc::now().timestamp() + self.time_delta().await?;

        debug!("Running: {} {}", method, url);

        let mut request = self
            .http
            .request(method.clone(), &url)
            .header("X-Ovh-Application", &credentials.application_key)
            .header("X-Ovh-Consumer", &credentials.consumer_key)
            .header("X-Ovh-Timestamp", timestamp.to_string())
            .header(
                "X-Ovh-Signature",
                credentials.sign(&method, &url, &body, timestamp),
            );
        if !body.is_empty() {
            request = request
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                OvhError::TimedOut(format!("{} {}", method, url))
            } else {
                OvhError::Http(e)
            }
        })?;
        Self::check(response).await
    }

    async fn call_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<T> {
        let text = self.call(method, path, body).await?;
        Ok(serde_json::from_str(&text)?)
    }

    pub async fn me(&self) -> Result<Me> {
        self.call_json(Method::GET, "/me", None).await
    }

    /// Kubeconfig of a Managed Kubernetes cluster
    pub async fn kubeconfig(&self, service_name: &str, kube_id: &str) -> Result<String> {
        #[derive(Deserialize)]
        struct Kubeconfig {
            content: String,
        }
        let path = format!("/cloud/project/{}/kube/{}/kubeconfig", service_name, kube_id);
        let config: Kubeconfig = self.call_json(Method::POST, &path, None).await?;
        Ok(config.content)
    }

    pub async fn create_cluster(
        &self,
        service_name: &str,
        engine: DatabaseEngine,
        spec: &ClusterSpec,
    ) -> Result<Cluster> {
        let path = format!("/cloud/project/{}/database/{}", service_name, engine_path(engine));
        let body = serde_json::to_value(spec)?;
        self.call_json(Method::POST, &path, Some(&body)).await
    }

    /// `None` when the cluster does not exist
    pub async fn get_cluster(
        &self,
        service_name: &str,
        engine: DatabaseEngine,
        cluster_id: &str,
    ) -> Result<Option<Cluster>> {
        let path = format!(
            "/cloud/project/{}/database/{}/{}",
            service_name,
            engine_path(engine),
            cluster_id
        );
        match self.call_json(Method::GET, &path, None).await {
            Ok(cluster) => Ok(Some(cluster)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Adds a user; the API generates its password
    pub async fn create_user(
        &self,
        service_name: &str,
        engine: DatabaseEngine,
        cluster_id: &str,
        username: &str,
    ) -> Result<DatabaseUser> {
        let path = format!(
            "/cloud/project/{}/database/{}/{}/user",
            service_name,
            engine_path(engine),
            cluster_id
        );
        let body = serde_json::json!({ "name": username });
        self.call_json(Method::POST, &path, Some(&body)).await
    }

    pub async fn delete_cluster(
        &self,
        service_name: &str,
        engine: DatabaseEngine,
        cluster_id: &str,
    ) -> Result<()> {
        let path = format!(
            "/cloud/project/{}/database/{}/{}",
            service_name,
            engine_path(engine),
            cluster_id
        );
        self.call(Method::DELETE, &path, None).await?;
        Ok(())
    }
}

/// Account of `GET /me`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Me {
    pub nichandle: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Body of a cluster creation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    pub description: String,
    pub plan: String,
    pub version: String,
    pub nodes_pattern: NodesPattern,
    pub disk: Disk,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub ip_restrictions: Vec<IpRestriction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodesPattern {
    pub flavor: String,
    pub number: u32,
    pub region: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Disk {
    pub size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpRestriction {
    pub ip: String,
    pub description: String,
}

/// Database cluster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub endpoints: Vec<ClusterEndpoint>,
}

impl Cluster {
    /// Connection endpoint of the engine itself
    pub fn endpoint_for(&self, engine: DatabaseEngine) -> Option<&ClusterEndpoint> {
        self.endpoints
            .iter()
            .find(|e| e.component == engine_path(engine) && e.domain.is_some())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterEndpoint {
    pub component: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub ssl: Option<bool>,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseUser {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
}

impl std::fmt::Debug for DatabaseUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseUser")
            .field("id", &self.id)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}
