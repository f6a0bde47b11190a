//! Provider capability traits
//!
//! Every cloud adapter (AWS, Azure, GCP, DigitalOcean, OVH) implements both
//! capabilities. They are separate traits so each registry only sees the
//! surface it dispatches on.

use crate::database::{
    DatabaseEndpoint, InstanceStatus, ManagedDatabaseRequest, ProvisionResult, probe_tcp,
};
use crate::error::Result;
use crate::scaling::{HorizontalScaling, ScalingConfig, ScalingTarget, VerticalScaling};
use async_trait::async_trait;
use hostplane_detect::ProviderKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Workload scaling capability
///
/// Parameter validation happens before any external call; each logical change
/// is a single mutating command with no rollback.
#[async_trait]
pub trait ScalingProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Display name for UI
    fn display_name(&self) -> &str;

    /// Whether the provider CLI is installed and authenticated
    async fn check_auth(&self) -> Result<AuthStatus>;

    /// Writes cluster credentials into the kubeconfig
    async fn update_kubeconfig(&self) -> Result<()>;

    async fn get_scaling_config(&self, target: &ScalingTarget) -> Result<ScalingConfig>;

    async fn get_current_replicas(&self, target: &ScalingTarget) -> Result<u32>;

    async fn enable_horizontal_scaling(
        &self,
        target: &ScalingTarget,
        policy: &HorizontalScaling,
    ) -> Result<()>;

    async fn disable_horizontal_scaling(&self, target: &ScalingTarget) -> Result<()>;

    fn supports_vertical_scaling(&self) -> bool;

    async fn enable_vertical_scaling(
        &self,
        target: &ScalingTarget,
        policy: &VerticalScaling,
    ) -> Result<()>;

    async fn disable_vertical_scaling(&self, target: &ScalingTarget) -> Result<()>;

    /// Manual override; zero replicas stops the workload
    async fn scale_to_replicas(&self, target: &ScalingTarget, replicas: u32) -> Result<()>;
}

/// Managed database provisioning capability
#[async_trait]
pub trait ManagedDatabaseProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn display_name(&self) -> &str;

    /// Instance type code to label; never empty
    fn instance_types(&self) -> BTreeMap<String, String>;

    /// Region code to label; never empty
    fn regions(&self) -> BTreeMap<String, String>;

    /// Not idempotent: callers must not re-issue for an in-flight instance
    async fn provision(&self, request: &ManagedDatabaseRequest) -> Result<ProvisionResult>;

    async fn deprovision(&self, instance_id: &str) -> Result<()>;

    /// Read-only status query
    async fn instance_status(&self, instance_id: &str) -> Result<InstanceStatus>;

    /// Timeout used for connection tests
    fn connect_timeout(&self) -> Duration {
        Duration::from_secs(10)
    }

    async fn test_connection(&self, endpoint: &DatabaseEndpoint) -> Result<bool> {
        Ok(probe_tcp(&endpoint.host, endpoint.port, self.connect_timeout()).await)
    }
}

/// Authentication status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStatus {
    /// Whether authentication is valid
    pub authenticated: bool,

    /// Account/user information if available
    pub account_info: Option<String>,

    /// Error message if not authenticated
    pub error: Option<String>,
}

impl AuthStatus {
    pub fn ok(account_info: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            account_info: Some(account_info.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            account_info: None,
            error: Some(error.into()),
        }
    }
}
