//! Task, pipeline and orchestration errors.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use redisbroker_core::client::RedisClientError;
use redisbroker_core::ConfError;

use crate::task::Artifact;

pub type TaskResult<T> = Result<T, TaskError>;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("no new save on {address} within {timeout:?}")]
    SnapshotTimeout { address: String, timeout: Duration },

    #[error(transparent)]
    Redis(#[from] RedisClientError),

    #[error("failed to rename {from} to {to}: {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to run {program}: {source}")]
    Exec {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("upload of {path} exited with {status}: {output}")]
    Upload {
        path: PathBuf,
        status: String,
        output: String,
    },

    #[error("cleanup of {path} failed: {source}")]
    Cleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A pipeline stopped at `task`; `artifact` is the last one produced.
#[derive(Debug, Error)]
#[error("pipeline {pipeline} failed in task {task}: {source}")]
pub struct PipelineError {
    pub pipeline: String,
    pub task: String,
    #[source]
    pub source: TaskError,
    pub artifact: Artifact,
}

pub type LocateResult<T> = Result<T, LocateError>;

#[derive(Debug, Error)]
pub enum LocateError {
    #[error("cannot derive an instance id from {0}")]
    NoParent(PathBuf),

    #[error("broker request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("broker at {url} returned status {status}")]
    BadStatus { url: String, status: u16 },
}

pub type BackupResult<T> = Result<T, BackupError>;

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("failed to walk {root}: {source}")]
    Discover {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error(transparent)]
    Conf(#[from] ConfError),

    #[error(transparent)]
    Locate(#[from] LocateError),

    #[error(transparent)]
    Redis(#[from] RedisClientError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),
}
