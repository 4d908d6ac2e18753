//! Upload to S3-compatible object storage through the aws CLI.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::info;

use redisbroker_core::config::S3Config;

use crate::error::{TaskError, TaskResult};
use crate::task::{Artifact, Task};

/// Destination for snapshot files.
#[async_trait]
pub trait Bucket: Send + Sync {
    fn name(&self) -> &str;

    async fn upload(&self, source: &Path, target: &str) -> TaskResult<()>;
}

/// Runs `aws s3 cp <src> s3://<bucket>/<target> [--endpoint-url <ep>]` with
/// the access keys in the child's environment.
#[derive(Debug, Clone)]
pub struct AwsCliBucket {
    cli: PathBuf,
    bucket: String,
    endpoint_url: String,
    access_key_id: String,
    secret_access_key: String,
}

impl AwsCliBucket {
    pub fn new(cli: impl Into<PathBuf>, s3: &S3Config) -> Self {
        Self {
            cli: cli.into(),
            bucket: s3.bucket_name.clone(),
            endpoint_url: s3.endpoint_url.clone(),
            access_key_id: s3.access_key_id.clone(),
            secret_access_key: s3.secret_access_key.clone(),
        }
    }

    fn args(&self, source: &Path, target: &str) -> Vec<String> {
        let mut args = vec![
            "s3".to_string(),
            "cp".to_string(),
            source.display().to_string(),
            format!("s3://{}/{}", self.bucket, target.trim_start_matches('/')),
        ];
        if !self.endpoint_url.is_empty() {
            args.push("--endpoint-url".to_string());
            args.push(self.endpoint_url.clone());
        }
        args
    }
}

#[async_trait]
impl Bucket for AwsCliBucket {
    fn name(&self) -> &str {
        &self.bucket
    }

    async fn upload(&self, source: &Path, target: &str) -> TaskResult<()> {
        let output = Command::new(&self.cli)
            .args(self.args(source, target))
            .env("AWS_ACCESS_KEY_ID", &self.access_key_id)
            .env("AWS_SECRET_ACCESS_KEY", &self.secret_access_key)
            .output()
            .await
            .map_err(|source| TaskError::Exec {
                program: self.cli.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            return Err(TaskError::Upload {
                path: source.to_path_buf(),
                status: output.status.to_string(),
                output: combined,
            });
        }
        info!(bucket = %self.bucket, %target, "uploaded");
        Ok(())
    }
}

/// Uploads the artifact to a fixed key.
pub struct UploadTask {
    bucket: Arc<dyn Bucket>,
    target: String,
}

impl UploadTask {
    pub fn new(bucket: Arc<dyn Bucket>, target: impl Into<String>) -> Self {
        Self {
            bucket,
            target: target.into(),
        }
    }
}

#[async_trait]
impl Task for UploadTask {
    fn name(&self) -> &str {
        "s3-upload"
    }

    async fn run(&self, artifact: Artifact) -> TaskResult<Artifact> {
        self.bucket.upload(&artifact.path, &self.target).await?;
        Ok(artifact)
    }
}
