//! Process control errors.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub type ProcessResult<T> = Result<T, ProcessError>;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{address} not reachable after {timeout:?}")]
    Timeout { address: String, timeout: Duration },

    #[error("failed to read pid file {path}: {source}")]
    PidFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("pid file {path} does not contain a pid: {content:?}")]
    InvalidPid { path: PathBuf, content: String },

    #[error("failed to signal pid {pid}: {source}")]
    Signal {
        pid: i32,
        #[source]
        source: std::io::Error,
    },
}
