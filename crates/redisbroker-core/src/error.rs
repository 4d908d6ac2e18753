//! Error types for config parsing and loading.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for config operations.
pub type ConfResult<T> = Result<T, ConfError>;

#[derive(Debug, Error)]
pub enum ConfError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid port {0:?} in redis config")]
    InvalidPort(String),

    #[error("invalid memory size {0:?}")]
    InvalidMemorySize(String),

    #[error("invalid yaml in {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}
