//! Dedicated-plan repository: a pool of whole nodes, one per instance.
//!
//! Every mutation is decided, applied to a copy of the state document,
//! persisted, and only then committed to memory. A failed write therefore
//! leaves both the file and the in-memory state as they were.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use redisbroker_agent::{AgentApi, AgentEndpoint};
use redisbroker_core::Instance;
use redisbroker_state::{StateDocument, StateFile};

use crate::error::{RepoError, RepoResult};
use crate::{InstanceBinder, InstanceCreator};

pub struct RemoteRepository {
    state: RwLock<StateDocument>,
    file: StateFile,
    agent: Arc<dyn AgentApi>,
    endpoint: AgentEndpoint,
}

impl RemoteRepository {
    /// Load the state file, add newly configured nodes to the pool, and
    /// write the result back.
    pub fn open(
        file: StateFile,
        nodes: &[String],
        redis_port: u16,
        agent: Arc<dyn AgentApi>,
        endpoint: AgentEndpoint,
    ) -> RepoResult<Self> {
        let mut doc = file.load().map_err(RepoError::State)?.unwrap_or_default();
        let added = doc.reconcile(nodes, redis_port);
        file.save(&doc).map_err(RepoError::StatePersist)?;
        info!(
            path = ?file.path(),
            added,
            available = doc.available_instances.len(),
            allocated = doc.allocated_instances.len(),
            "dedicated pool loaded"
        );

        Ok(Self {
            state: RwLock::new(doc),
            file,
            agent,
            endpoint,
        })
    }

    fn persist(&self, doc: &StateDocument) -> RepoResult<()> {
        self.file.save(doc).map_err(RepoError::StatePersist)
    }

    pub async fn create(&self, id: &str) -> RepoResult<()> {
        let mut state = self.state.write().await;
        if state.allocated(id).is_some() {
            return Err(RepoError::AlreadyExists(id.to_string()));
        }
        if state.available_instances.is_empty() {
            return Err(RepoError::LimitMet);
        }

        let mut next = state.clone();
        let mut instance = next.available_instances.remove(0);
        instance.id = id.to_string();
        let host = instance.host.clone();
        next.allocated_instances.push(instance);
        next.instance_bindings.insert(id.to_string(), Vec::new());

        self.persist(&next)?;
        *state = next;
        info!(instance_id = %id, %host, "dedicated instance allocated");
        Ok(())
    }

    /// Reset the node through its agent and return it to the front of the pool.
    pub async fn destroy(&self, id: &str) -> RepoResult<()> {
        let mut state = self.state.write().await;
        let host = state
            .allocated(id)
            .map(|i| i.host.clone())
            .ok_or_else(|| RepoError::DoesNotExist(id.to_string()))?;

        self.agent.reset(&self.endpoint.url_for(&host)).await?;

        let mut next = state.clone();
        let pos = next
            .allocated_instances
            .iter()
            .position(|i| i.id == id)
            .ok_or_else(|| RepoError::DoesNotExist(id.to_string()))?;
        let mut node = next.allocated_instances.remove(pos);
        node.id.clear();
        node.password.clear();
        next.available_instances.insert(0, node);
        next.instance_bindings.remove(id);

        self.persist(&next)?;
        *state = next;
        info!(instance_id = %id, %host, "dedicated instance released");
        Ok(())
    }

    pub async fn bind(&self, id: &str, binding_id: &str) -> RepoResult<Instance> {
        let mut state = self.state.write().await;
        let host = state
            .allocated(id)
            .map(|i| i.host.clone())
            .ok_or_else(|| RepoError::DoesNotExist(id.to_string()))?;
        if state
            .instance_bindings
            .get(id)
            .is_some_and(|b| b.iter().any(|b| b == binding_id))
        {
            return Err(RepoError::BindingAlreadyExists {
                instance_id: id.to_string(),
                binding_id: binding_id.to_string(),
            });
        }

        let creds = self.agent.credentials(&self.endpoint.url_for(&host)).await?;

        let mut next = state.clone();
        let instance = next
            .allocated_mut(id)
            .ok_or_else(|| RepoError::DoesNotExist(id.to_string()))?;
        instance.port = creds.port;
        instance.password = creds.password;
        let bound = instance.clone();
        next.instance_bindings
            .entry(id.to_string())
            .or_default()
            .push(binding_id.to_string());

        self.persist(&next)?;
        *state = next;
        debug!(instance_id = %id, %binding_id, "binding recorded");
        Ok(bound)
    }

    pub async fn unbind(&self, id: &str, binding_id: &str) -> RepoResult<()> {
        let mut state = self.state.write().await;
        if state.allocated(id).is_none() {
            return Err(RepoError::DoesNotExist(id.to_string()));
        }

        let mut next = state.clone();
        let bindings = next.instance_bindings.entry(id.to_string()).or_default();
        let Some(pos) = bindings.iter().position(|b| b == binding_id) else {
            return Err(RepoError::BindingDoesNotExist {
                instance_id: id.to_string(),
                binding_id: binding_id.to_string(),
            });
        };
        bindings.remove(pos);

        self.persist(&next)?;
        *state = next;
        debug!(instance_id = %id, %binding_id, "binding removed");
        Ok(())
    }

    pub async fn instance_exists(&self, id: &str) -> RepoResult<bool> {
        Ok(self.state.read().await.allocated(id).is_some())
    }

    /// Id of the instance allocated on `host`; empty when none is.
    pub async fn id_for_host(&self, host: &str) -> String {
        self.state
            .read()
            .await
            .id_for_host(host)
            .unwrap_or_default()
            .to_string()
    }

    pub async fn available_instances(&self) -> Vec<Instance> {
        self.state.read().await.available_instances.clone()
    }

    pub async fn allocated_instances(&self) -> Vec<Instance> {
        self.state.read().await.allocated_instances.clone()
    }

    pub async fn bindings_for(&self, id: &str) -> Vec<String> {
        self.state
            .read()
            .await
            .instance_bindings
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    /// Copy of the whole document.
    pub async fn snapshot(&self) -> StateDocument {
        self.state.read().await.clone()
    }

    pub fn agent_url(&self, host: &str) -> String {
        self.endpoint.url_for(host)
    }
}

#[async_trait]
impl InstanceCreator for RemoteRepository {
    async fn create(&self, id: &str) -> RepoResult<()> {
        RemoteRepository::create(self, id).await
    }

    async fn destroy(&self, id: &str) -> RepoResult<()> {
        RemoteRepository::destroy(self, id).await
    }

    async fn instance_exists(&self, id: &str) -> RepoResult<bool> {
        RemoteRepository::instance_exists(self, id).await
    }
}

#[async_trait]
impl InstanceBinder for RemoteRepository {
    async fn bind(&self, id: &str, binding_id: &str) -> RepoResult<Instance> {
        RemoteRepository::bind(self, id, binding_id).await
    }

    async fn unbind(&self, id: &str, binding_id: &str) -> RepoResult<()> {
        RemoteRepository::unbind(self, id, binding_id).await
    }

    async fn instance_exists(&self, id: &str) -> RepoResult<bool> {
        RemoteRepository::instance_exists(self, id).await
    }
}
