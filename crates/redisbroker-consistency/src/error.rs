use thiserror::Error;

use redisbroker_agent::AgentError;

/// Something the checker found wrong with the fleet.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Inconsistency {
    #[error("available node {host}:{port} holds data (last instance id {instance_id:?})")]
    HasData {
        instance_id: String,
        host: String,
        port: u16,
    },
}

/// A probe that could not be completed.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("keycount on {host} failed: {source}")]
    Keycount {
        host: String,
        #[source]
        source: AgentError,
    },
}
