//! OVHcloud provider error types

use hostplane_cloud::CloudError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OvhError {
    #[error(
        "OVH API credentials are not configured. Set OVH_APPLICATION_KEY, OVH_APPLICATION_SECRET and OVH_CONSUMER_KEY"
    )]
    MissingCredentials,

    #[error("Unknown OVH API endpoint: {0}")]
    UnknownEndpoint(String),

    #[error("OVH API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("OVH API request timed out: {0}")]
    TimedOut(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected OVH API response: {0}")]
    UnexpectedResponse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl OvhError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, OvhError::Api { status: 404, .. })
    }
}

impl From<OvhError> for CloudError {
    fn from(e: OvhError) -> Self {
        match e {
            OvhError::TimedOut(msg) => CloudError::Timeout(msg),
            OvhError::UnknownEndpoint(_) => CloudError::InvalidConfig(e.to_string()),
            other => CloudError::operation_failed("ovh", other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, OvhError>;
