//! Agent, monit and reset errors.

use std::path::PathBuf;

use thiserror::Error;

pub type AgentResult<T> = Result<T, AgentError>;

/// Failures talking to a node agent.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent at {url} unreachable: {source}")]
    Unreachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("agent at {url} returned status {status}")]
    BadStatus { url: String, status: u16 },

    #[error("agent at {url} returned an unreadable body: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),
}

pub type MonitResult<T> = Result<T, MonitError>;

#[derive(Debug, Error)]
pub enum MonitError {
    #[error("failed to run monit: {0}")]
    Exec(#[source] std::io::Error),

    #[error("monit {command} failed: {output}")]
    Command { command: String, output: String },

    #[error("invalid summary pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("timed out waiting for {process} to become {status}")]
    Timeout { process: String, status: String },
}

pub type ResetResult<T> = Result<T, ResetError>;

#[derive(Debug, Error)]
pub enum ResetError {
    #[error(transparent)]
    Monit(#[from] MonitError),

    #[error("failed to remove {path}: {source}")]
    RemoveFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Conf(#[from] redisbroker_core::ConfError),

    #[error("redis did not come back: {0}")]
    NotReachable(#[from] redisbroker_process::ProcessError),
}

pub type KeycountResult<T> = Result<T, KeycountError>;

#[derive(Debug, Error)]
pub enum KeycountError {
    #[error(transparent)]
    Conf(#[from] redisbroker_core::ConfError),

    #[error(transparent)]
    Redis(#[from] redisbroker_core::client::RedisClientError),
}
