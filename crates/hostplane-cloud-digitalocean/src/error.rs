//! DigitalOcean provider error types

use hostplane_cloud::CloudError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DigitalOceanError {
    #[error("doctl not found. Please install: https://docs.digitalocean.com/reference/doctl/how-to/install/")]
    CliNotFound,

    #[error("{0}")]
    CommandFailed(String),

    #[error("doctl command timed out: {0}")]
    TimedOut(String),

    #[error("Database not found: {0}")]
    DatabaseNotFound(String),

    #[error("Unexpected doctl output: {0}")]
    UnexpectedOutput(String),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl From<DigitalOceanError> for CloudError {
    fn from(e: DigitalOceanError) -> Self {
        match e {
            DigitalOceanError::TimedOut(msg) => CloudError::Timeout(msg),
            other => CloudError::operation_failed("digitalocean", other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, DigitalOceanError>;
