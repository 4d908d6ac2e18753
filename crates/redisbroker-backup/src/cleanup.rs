//! Put the live RDB back, or drop the renamed copy.

use std::io::ErrorKind;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::{TaskError, TaskResult};
use crate::task::{Artifact, Task};

/// Restores the renamed RDB to its live path unless redis has written a
/// new one there, in which case the renamed copy is removed. Missing files
/// are not an error.
pub struct CleanupTask;

#[async_trait]
impl Task for CleanupTask {
    fn name(&self) -> &str {
        "cleanup"
    }

    async fn run(&self, artifact: Artifact) -> TaskResult<Artifact> {
        let Some(origin) = artifact.origin.clone() else {
            debug!(path = ?artifact.path, "nothing was renamed; skipping cleanup");
            return Ok(artifact);
        };

        if tokio::fs::try_exists(&origin).await.unwrap_or(false) {
            match tokio::fs::remove_file(&artifact.path).await {
                Ok(()) => info!(path = ?artifact.path, "removed renamed rdb"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(TaskError::Cleanup {
                        path: artifact.path,
                        source,
                    });
                }
            }
            return Ok(Artifact::new(origin));
        }

        match tokio::fs::rename(&artifact.path, &origin).await {
            Ok(()) => info!(path = ?origin, "restored live rdb"),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = ?artifact.path, "renamed rdb already gone");
            }
            Err(source) => {
                return Err(TaskError::Cleanup {
                    path: artifact.path,
                    source,
                });
            }
        }
        Ok(Artifact::new(origin))
    }
}
