//! AWS provider error types

use hostplane_cloud::CloudError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AwsError {
    #[error("aws CLI not found. Please install: https://aws.amazon.com/cli/")]
    CliNotFound,

    #[error("{0}")]
    CommandFailed(String),

    #[error("aws command timed out: {0}")]
    TimedOut(String),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl From<AwsError> for CloudError {
    fn from(e: AwsError) -> Self {
        match e {
            AwsError::TimedOut(msg) => CloudError::Timeout(msg),
            other => CloudError::operation_failed("aws", other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, AwsError>;
