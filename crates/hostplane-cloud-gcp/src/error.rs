//! Google Cloud provider error types

use hostplane_cloud::CloudError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GcpError {
    #[error("gcloud not found. Please install: https://cloud.google.com/sdk/docs/install")]
    GcloudNotFound,

    #[error("{0}")]
    CommandFailed(String),

    #[error("gcloud command timed out: {0}")]
    TimedOut(String),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl From<GcpError> for CloudError {
    fn from(e: GcpError) -> Self {
        match e {
            GcpError::TimedOut(msg) => CloudError::Timeout(msg),
            other => CloudError::operation_failed("gcp", other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, GcpError>;
