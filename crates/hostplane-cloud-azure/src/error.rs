//! Azure provider error types

use hostplane_cloud::CloudError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AzureError {
    #[error("az CLI not found. Please install: https://learn.microsoft.com/cli/azure/install-azure-cli")]
    CliNotFound,

    #[error("Not logged in to Azure. Run: az login")]
    NotLoggedIn,

    #[error("{0}")]
    CommandFailed(String),

    #[error("az command timed out: {0}")]
    TimedOut(String),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl From<AzureError> for CloudError {
    fn from(e: AzureError) -> Self {
        match e {
            AzureError::TimedOut(msg) => CloudError::Timeout(msg),
            other => CloudError::operation_failed("azure", other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, AzureError>;
