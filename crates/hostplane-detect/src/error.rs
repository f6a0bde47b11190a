//! Detection error types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DetectError {
    #[error("Unknown cloud provider: {0}")]
    UnknownProvider(String),

    #[error("Unknown deployment mode: {0}")]
    UnknownMode(String),
}

pub type Result<T> = std::result::Result<T, DetectError>;
