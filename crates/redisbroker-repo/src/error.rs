//! Repository error taxonomy.

use std::path::PathBuf;

use thiserror::Error;

use redisbroker_agent::AgentError;
use redisbroker_core::ConfError;
use redisbroker_process::ProcessError;
use redisbroker_state::StateError;

pub type RepoResult<T> = Result<T, RepoError>;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("instance {0} already exists")]
    AlreadyExists(String),

    #[error("instance {0} does not exist")]
    DoesNotExist(String),

    #[error("instance id {0:?} is not a valid directory name")]
    InvalidId(String),

    #[error("binding {binding_id} already exists for instance {instance_id}")]
    BindingAlreadyExists {
        instance_id: String,
        binding_id: String,
    },

    #[error("binding {binding_id} does not exist for instance {instance_id}")]
    BindingDoesNotExist {
        instance_id: String,
        binding_id: String,
    },

    #[error("instance limit for this service has been reached")]
    LimitMet,

    #[error("no free port found after {0} attempts")]
    NoFreePort(usize),

    #[error("redis for instance {instance_id} did not start: {source}")]
    StartTimeout {
        instance_id: String,
        #[source]
        source: ProcessError,
    },

    #[error("failed to persist state: {0}")]
    StatePersist(#[source] StateError),

    #[error("failed to load state: {0}")]
    State(#[source] StateError),

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Conf(#[from] ConfError),

    #[error("filesystem error at {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RepoError {
    pub(crate) fn fs(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| RepoError::Filesystem { path, source }
    }
}
