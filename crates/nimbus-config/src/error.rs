use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "Spec file not found. Looked in:\n\
        - current directory: server.local.yaml, .server.local.yaml, server.yaml, .server.yaml\n\
        - ./.nimbus/ directory\n\
        - ~/.config/nimbus/server.yaml\n\
        Set NIMBUS_SPEC_PATH or pass --file to point at one directly"
    )]
    SpecFileNotFound,

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
