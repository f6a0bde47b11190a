//! Hostplane Cloud Abstraction
//!
//! One interface for workload scaling and managed-database provisioning
//! across cloud backends, plus the registries and orchestration that sit on
//! top of it.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                 hostplane CLI                    │
//! │          (scaling apply / db create)             │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │               hostplane-cloud                    │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │  ScalingOrchestrator / DatabaseOrchestr.  │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────────┐  ┌────────────────────┐   │
//! │  │ CloudProvider-   │  │ ManagedDatabase-   │   │
//! │  │ Manager          │  │ Manager            │   │
//! │  └──────────────────┘  └────────────────────┘   │
//! │  ┌──────────────┐ ┌──────────────┐ ┌────────┐  │
//! │  │ Kubernetes-  │ │ CommandRunner│ │ State  │  │
//! │  │ Scaler       │ │              │ │        │  │
//! │  └──────────────┘ └──────────────┘ └────────┘  │
//! └───────┬──────────┬──────────┬─────────┬────────┘
//!         │          │          │         │
//!      ┌──▼──┐   ┌───▼───┐  ┌───▼──┐  ┌───▼───┐ ...
//!      │ aws │   │ azure │  │ gcp  │  │  ovh  │
//!      └─────┘   └───────┘  └──────┘  └───────┘
//! ```

pub mod action;
pub mod command;
pub mod database;
pub mod error;
pub mod kubernetes;
pub mod manager;
pub mod orchestration;
pub mod provider;
pub mod scaling;
pub mod secret;
pub mod settings;
pub mod state;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-exports
pub use action::{ActionResult, ApplyResult, Notification, NotificationLevel};
pub use command::{CommandError, CommandOutput, CommandRunner, CommandSpec, TokioCommandRunner};
pub use database::{
    DatabaseCredentials, DatabaseEndpoint, DatabaseEngine, InstanceStatus,
    ManagedDatabaseInstance, ManagedDatabaseRequest, ProvisionResult,
};
pub use error::{CloudError, Result};
pub use hostplane_detect::{CloudProvider, DeploymentInfo, DeploymentMode, ProviderKind};
pub use kubernetes::KubernetesScaler;
pub use manager::{CloudProviderManager, ManagedDatabaseManager};
pub use orchestration::{
    DatabaseOrchestrator, HorizontalToggle, ScalingForm, ScalingOrchestrator, ScalingStatus,
    VerticalToggle,
};
pub use provider::{AuthStatus, ManagedDatabaseProvider, ScalingProvider};
pub use scaling::{
    HorizontalScaling, ScalingConfig, ScalingTarget, UpdateMode, VerticalScaling, WorkloadKind,
};
pub use secret::SecretCipher;
pub use settings::{InstallationSettings, Setting, SettingType, SettingsStore};
pub use state::{InstanceState, InstanceStore, StateLock};
