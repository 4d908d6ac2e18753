//! Tasks and the pipeline that chains them.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{error, info};

use crate::error::{PipelineError, TaskResult};

/// Handle on the current RDB file as it moves through a pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    /// Live path the file was moved away from, once it has been renamed.
    pub origin: Option<PathBuf>,
}

impl Artifact {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            origin: None,
        }
    }
}

/// One step of a pipeline.
#[async_trait]
pub trait Task: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, artifact: Artifact) -> TaskResult<Artifact>;
}

/// Named, ordered list of tasks. The first failure stops the run.
pub struct Pipeline {
    name: String,
    tasks: Vec<Box<dyn Task>>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tasks: Vec::new(),
        }
    }

    pub fn with_task(mut self, task: impl Task + 'static) -> Self {
        self.tasks.push(Box::new(task));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn run(&self, mut artifact: Artifact) -> Result<Artifact, PipelineError> {
        for task in &self.tasks {
            info!(pipeline = %self.name, task = task.name(), "starting");
            match task.run(artifact.clone()).await {
                Ok(next) => {
                    info!(pipeline = %self.name, task = task.name(), "done");
                    artifact = next;
                }
                Err(source) => {
                    error!(pipeline = %self.name, task = task.name(), error = %source, "failed");
                    return Err(PipelineError {
                        pipeline: self.name.clone(),
                        task: task.name().to_string(),
                        source,
                        artifact,
                    });
                }
            }
        }
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use crate::error::TaskError;

    struct Step {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    }

    #[async_trait]
    impl Task for Step {
        fn name(&self) -> &str {
            self.name
        }

        async fn run(&self, artifact: Artifact) -> TaskResult<Artifact> {
            self.log.lock().unwrap().push(self.name);
            if self.fail {
                return Err(TaskError::Cleanup {
                    path: artifact.path,
                    source: std::io::Error::other(self.name),
                });
            }
            Ok(Artifact::new(artifact.path.join(self.name)))
        }
    }

    fn step(name: &'static str, log: &Arc<Mutex<Vec<&'static str>>>, fail: bool) -> Step {
        Step {
            name,
            log: log.clone(),
            fail,
        }
    }

    #[tokio::test]
    async fn passes_artifact_along() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new("p")
            .with_task(step("a", &log, false))
            .with_task(step("b", &log, false));

        let out = pipeline.run(Artifact::new("/x")).await.unwrap();
        assert_eq!(out.path, PathBuf::from("/x/a/b"));
        assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn first_failure_skips_the_rest() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new("p")
            .with_task(step("a", &log, false))
            .with_task(step("b", &log, true))
            .with_task(step("c", &log, false));

        let err = pipeline.run(Artifact::new("/x")).await.unwrap_err();
        assert_eq!(err.pipeline, "p");
        assert_eq!(err.task, "b");
        assert_eq!(err.source.to_string(), "cleanup of /x/a failed: b");
        // Last artifact produced before the failure.
        assert_eq!(err.artifact.path, PathBuf::from("/x/a"));
        assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn empty_pipeline_returns_input() {
        let out = Pipeline::new("empty").run(Artifact::new("/x")).await.unwrap();
        assert_eq!(out, Artifact::new("/x"));
    }
}
