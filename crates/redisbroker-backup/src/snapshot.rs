//! BGSAVE and wait for it to land.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;

use redisbroker_core::RedisClient;

use crate::error::{TaskError, TaskResult};
use crate::task::{Artifact, Task};

const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Triggers a background save and yields the RDB file it produced.
pub struct SnapshotTask {
    client: Arc<dyn RedisClient>,
    timeout: Duration,
}

impl SnapshotTask {
    pub fn new(client: Arc<dyn RedisClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Poll `LASTSAVE` until it moves past `since`.
    async fn wait_for_new_save_since(&self, since: i64) -> TaskResult<()> {
        let deadline = Instant::now() + self.timeout;
        loop {
            let last = self.client.last_save().await?;
            if last > since {
                debug!(address = %self.client.address(), last_save = last, "new save observed");
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(TaskError::SnapshotTimeout {
                    address: self.client.address(),
                    timeout: self.timeout,
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl Task for SnapshotTask {
    fn name(&self) -> &str {
        "snapshot"
    }

    async fn run(&self, _artifact: Artifact) -> TaskResult<Artifact> {
        let baseline = self.client.last_save().await?;
        // LASTSAVE has one-second resolution.
        tokio::time::sleep(Duration::from_secs(1)).await;
        self.client.bg_save().await?;
        self.wait_for_new_save_since(baseline).await?;

        let path = self.client.rdb_path().await?;
        Ok(Artifact::new(path))
    }
}
