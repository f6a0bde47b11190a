//! Cloud provider error types

use thiserror::Error;

/// Cloud provider errors
#[derive(Error, Debug)]
pub enum CloudError {
    /// Caller input rejected before any external effect
    #[error("Invalid scaling parameters: {0}")]
    InvalidScalingParameters(String),

    #[error("Provider not supported: {0}")]
    ProviderNotSupported(String),

    /// External command or API error, surfaced verbatim
    #[error("{provider} operation failed: {cause}")]
    ProviderOperationFailed { provider: String, cause: String },

    /// The remote resource may or may not exist
    #[error(
        "{provider} provisioning of '{instance_id}' timed out; verify in the provider console whether it was created"
    )]
    ProvisioningTimedOut {
        provider: String,
        instance_id: String,
    },

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("State file error: {0}")]
    StateError(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("Secret error: {0}")]
    Secret(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    pub fn operation_failed(provider: impl Into<String>, cause: impl Into<String>) -> Self {
        CloudError::ProviderOperationFailed {
            provider: provider.into(),
            cause: cause.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
