//! Sweep of the available dedicated pool.
//!
//! Nodes in the pool were reset when released, so any key on one of them
//! means a reset went wrong or someone is still writing to it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use redisbroker_agent::AgentApi;
use redisbroker_core::Instance;
use redisbroker_repo::RemoteRepository;

use crate::error::{CheckError, Inconsistency};

/// Source of the nodes that should be empty.
#[async_trait]
pub trait AvailablePool: Send + Sync {
    async fn available(&self) -> Vec<Instance>;

    fn agent_url(&self, host: &str) -> String;
}

#[async_trait]
impl AvailablePool for RemoteRepository {
    async fn available(&self) -> Vec<Instance> {
        self.available_instances().await
    }

    fn agent_url(&self, host: &str) -> String {
        RemoteRepository::agent_url(self, host)
    }
}

/// Where inconsistencies end up.
pub trait InconsistencyReporter: Send + Sync {
    fn report(&self, inconsistency: &Inconsistency);
}

/// Logs each inconsistency at error level.
pub struct LogReporter;

impl InconsistencyReporter for LogReporter {
    fn report(&self, inconsistency: &Inconsistency) {
        match inconsistency {
            Inconsistency::HasData {
                instance_id,
                host,
                port,
            } => error!(%instance_id, %host, port, kind = "HasData", "consistency check failed"),
        }
    }
}

/// Result of one sweep.
#[derive(Debug, Default)]
pub struct Sweep {
    pub checked: usize,
    pub inconsistencies: Vec<Inconsistency>,
    pub errors: Vec<CheckError>,
}

pub struct ConsistencyChecker {
    pool: Arc<dyn AvailablePool>,
    agent: Arc<dyn AgentApi>,
    reporter: Arc<dyn InconsistencyReporter>,
    interval: Duration,
}

impl ConsistencyChecker {
    pub fn new(pool: Arc<dyn AvailablePool>, agent: Arc<dyn AgentApi>, interval: Duration) -> Self {
        Self {
            pool,
            agent,
            reporter: Arc::new(LogReporter),
            interval,
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn InconsistencyReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Sweep every `interval` until `quiesce` flips to true or its sender
    /// goes away.
    pub async fn run(self, mut quiesce: watch::Receiver<bool>) {
        debug!(interval = ?self.interval, "consistency checker starting");
        loop {
            if *quiesce.borrow() {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    self.check_once().await;
                }
                changed = quiesce.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        info!("consistency checker stopped");
    }

    /// Probe every available node once. Probe failures are collected and
    /// do not stop the sweep.
    pub async fn check_once(&self) -> Sweep {
        let mut sweep = Sweep::default();
        for node in self.pool.available().await {
            sweep.checked += 1;
            let url = self.pool.agent_url(&node.host);
            match self.agent.keycount(&url).await {
                Ok(0) => {}
                Ok(count) => {
                    debug!(host = %node.host, count, "available node is not empty");
                    let found = Inconsistency::HasData {
                        instance_id: node.id.clone(),
                        host: node.host.clone(),
                        port: node.port,
                    };
                    self.reporter.report(&found);
                    sweep.inconsistencies.push(found);
                }
                Err(source) => sweep.errors.push(CheckError::Keycount {
                    host: node.host.clone(),
                    source,
                }),
            }
        }

        if !sweep.errors.is_empty() {
            let errors: Vec<String> = sweep.errors.iter().map(ToString::to_string).collect();
            warn!(failed = errors.len(), errors = ?errors, "consistency probes failed");
        }
        sweep
    }
}
