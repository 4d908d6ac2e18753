//! redisbroker-repo: where instances live.
//!
//! # Architecture
//!
//! ```text
//! broker facade
//!   ├── plan_id → InstanceCreator ─┬── LocalRepository  (shared: redis processes on this host)
//!   └── plan_id → InstanceBinder  ─┴── RemoteRepository (dedicated: node pool + state file + agents)
//!
//! InstanceSupervisor ── every process_check_interval ──▶ LocalRepository
//!                       skip `lock`, restart dead redis, stop on quiesce
//! ```

pub mod error;
pub mod local;
pub mod remote;
pub mod supervisor;

use async_trait::async_trait;

use redisbroker_core::Instance;

pub use error::{RepoError, RepoResult};
pub use local::{LocalRepository, LocalSettings};
pub use remote::RemoteRepository;
pub use supervisor::InstanceSupervisor;

/// Provisioning side of a plan.
#[async_trait]
pub trait InstanceCreator: Send + Sync {
    async fn create(&self, id: &str) -> RepoResult<()>;

    async fn destroy(&self, id: &str) -> RepoResult<()>;

    async fn instance_exists(&self, id: &str) -> RepoResult<bool>;
}

/// Binding side of a plan.
#[async_trait]
pub trait InstanceBinder: Send + Sync {
    /// Record the binding and return the credentials to hand out.
    async fn bind(&self, id: &str, binding_id: &str) -> RepoResult<Instance>;

    async fn unbind(&self, id: &str, binding_id: &str) -> RepoResult<()>;

    async fn instance_exists(&self, id: &str) -> RepoResult<bool>;
}
