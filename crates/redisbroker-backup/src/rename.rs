//! Move the live RDB out of redis' way.

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use crate::error::{TaskError, TaskResult};
use crate::task::{Artifact, Task};

/// Renames the artifact to a uuid-named sibling, remembering where it came from.
pub struct RenameTask;

#[async_trait]
impl Task for RenameTask {
    fn name(&self) -> &str {
        "rename"
    }

    async fn run(&self, artifact: Artifact) -> TaskResult<Artifact> {
        let target = artifact.path.with_file_name(Uuid::new_v4().to_string());
        tokio::fs::rename(&artifact.path, &target)
            .await
            .map_err(|source| TaskError::Rename {
                from: artifact.path.clone(),
                to: target.clone(),
                source,
            })?;
        debug!(from = ?artifact.path, to = ?target, "rdb renamed");
        Ok(Artifact {
            path: target,
            origin: Some(artifact.path),
        })
    }
}
