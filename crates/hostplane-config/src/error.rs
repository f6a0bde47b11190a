use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config directory not found")]
    ConfigDirNotFound,

    #[error(
        "Config file not found. Looked for:\n\
        - current directory: hostplane.local.kdl, hostplane.kdl\n\
        - ./.hostplane/hostplane.kdl\n\
        - ~/.config/hostplane/hostplane.kdl\n\
        Set HOSTPLANE_CONFIG_PATH to point at a file directly"
    )]
    ConfigFileNotFound,

    #[error("KDL parse error: {0}")]
    KdlParse(#[from] kdl::KdlError),

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
