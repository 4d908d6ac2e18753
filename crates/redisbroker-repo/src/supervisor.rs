//! Restarts shared-plan redis processes that died.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use redisbroker_process::ProcessController;

use crate::local::LocalRepository;

pub struct InstanceSupervisor {
    repo: Arc<LocalRepository>,
    controller: Arc<dyn ProcessController>,
    interval: Duration,
    start_timeout: Duration,
}

impl InstanceSupervisor {
    pub fn new(
        repo: Arc<LocalRepository>,
        controller: Arc<dyn ProcessController>,
        interval: Duration,
        start_timeout: Duration,
    ) -> Self {
        Self {
            repo,
            controller,
            interval,
            start_timeout,
        }
    }

    /// Sweep every `interval` until `quiesce` flips to true or its sender
    /// goes away. A sweep in progress is allowed to finish.
    pub async fn run(self, mut quiesce: watch::Receiver<bool>) {
        debug!(interval = ?self.interval, "supervisor starting");
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
        info!("supervisor stopped");
    }

    /// One sweep. Returns the number of instances restarted.
    pub async fn check_once(&self) -> usize {
        let instances = match self.repo.all_instances().await {
            Ok(instances) => instances,
            Err(e) => {
                warn!(error = %e, "supervisor could not list instances");
                return 0;
            }
        };

        let mut restarted = 0;
        for instance in instances {
            // Held across the check and the spawn so a destroy cannot slip in between.
            let _guard = self.repo.read_guard().await;
            if self.repo.is_locked(&instance.id) {
                debug!(instance_id = %instance.id, "instance locked; skipping");
                continue;
            }
            let paths = self.repo.paths(&instance.id);
            if !self.repo.instance_dir(&instance.id).is_dir() || self.controller.is_alive(&paths.pid) {
                continue;
            }

            warn!(instance_id = %instance.id, "redis not running; restarting");
            match self
                .controller
                .start_and_wait_until_ready(&instance, &paths, self.start_timeout)
                .await
            {
                Ok(()) => restarted += 1,
                Err(e) => warn!(instance_id = %instance.id, error = %e, "restart failed"),
            }
        }
        restarted
    }
}
