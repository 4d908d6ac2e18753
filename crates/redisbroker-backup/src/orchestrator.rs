//! Back up every redis found under a config root.
//!
//! Per instance: resolve its id, connect with the credentials of its config,
//! run `snapshot → rename → s3-upload` as the `redis-backup` pipeline, then
//! always run the `cleanup` pipeline on whatever artifact was last produced.
//! A failure is recorded and the next instance is attempted.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info};
use walkdir::WalkDir;

use redisbroker_core::client::RedisClientResult;
use redisbroker_core::config::BackupConfig;
use redisbroker_core::{RedisClient, RedisConf, RedisConnection};

use crate::cleanup::CleanupTask;
use crate::error::{BackupError, BackupResult};
use crate::locator::IdLocator;
use crate::rename::RenameTask;
use crate::s3::{Bucket, UploadTask};
use crate::snapshot::SnapshotTask;
use crate::task::{Artifact, Pipeline};

/// Outcome for one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupReport {
    pub instance_id: String,
    pub node_ip: String,
    pub redis_config_path: PathBuf,
    pub error: Option<String>,
}

impl BackupReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Opens a client for the redis described by a config.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn connect(&self, conf: &RedisConf) -> RedisClientResult<Arc<dyn RedisClient>>;
}

pub struct ConnectionFactory;

#[async_trait]
impl ClientFactory for ConnectionFactory {
    async fn connect(&self, conf: &RedisConf) -> RedisClientResult<Arc<dyn RedisClient>> {
        Ok(Arc::new(RedisConnection::from_conf(conf).await?))
    }
}

/// `<prefix>/<YYYY>/<MM>/<DD>/<YYYYMMDDHHMM>_<id>_<plan>`
pub fn target_key(prefix: &str, now: DateTime<Utc>, instance_id: &str, plan_name: &str) -> String {
    let key = format!(
        "{}/{}_{}_{}",
        now.format("%Y/%m/%d"),
        now.format("%Y%m%d%H%M"),
        instance_id,
        plan_name
    );
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        key
    } else {
        format!("{prefix}/{key}")
    }
}

pub struct Orchestrator {
    config_root: PathBuf,
    config_filename: String,
    plan_name: String,
    node_ip: String,
    s3_path: String,
    snapshot_timeout: Duration,
    locator: Arc<dyn IdLocator>,
    bucket: Arc<dyn Bucket>,
    clients: Arc<dyn ClientFactory>,
}

impl Orchestrator {
    pub fn new(
        config: &BackupConfig,
        locator: Arc<dyn IdLocator>,
        bucket: Arc<dyn Bucket>,
        clients: Arc<dyn ClientFactory>,
    ) -> Self {
        Self {
            config_root: config.redis_config_root.clone(),
            config_filename: config.redis_config_filename.clone(),
            plan_name: config.plan_name.clone(),
            node_ip: config.node_ip.clone(),
            s3_path: config.s3.path.clone(),
            snapshot_timeout: config.snapshot_timeout(),
            locator,
            bucket,
            clients,
        }
    }

    /// Config files under the root, in path order.
    pub fn discover(&self) -> BackupResult<Vec<PathBuf>> {
        let mut found = Vec::new();
        for entry in WalkDir::new(&self.config_root).sort_by_file_name() {
            let entry = entry.map_err(|source| BackupError::Discover {
                root: self.config_root.clone(),
                source,
            })?;
            if entry.file_type().is_file() && entry.file_name() == self.config_filename.as_str() {
                found.push(entry.into_path());
            }
        }
        Ok(found)
    }

    pub async fn run(&self) -> BackupResult<Vec<BackupReport>> {
        let configs = self.discover()?;
        let now = Utc::now();
        info!(root = ?self.config_root, instances = configs.len(), "backup starting");

        let mut reports = Vec::with_capacity(configs.len());
        for conf_path in configs {
            reports.push(self.backup_one(&conf_path, now).await);
        }

        let failed = reports.iter().filter(|r| !r.succeeded()).count();
        info!(
            succeeded = reports.len() - failed,
            failed, "backup finished"
        );
        Ok(reports)
    }

    async fn backup_one(&self, conf_path: &Path, now: DateTime<Utc>) -> BackupReport {
        let mut report = BackupReport {
            instance_id: String::new(),
            node_ip: self.node_ip.clone(),
            redis_config_path: conf_path.to_path_buf(),
            error: None,
        };

        match self.locator.locate(conf_path).await {
            Ok(id) => report.instance_id = id,
            Err(e) => {
                error!(path = ?conf_path, error = %e, "cannot resolve instance id");
                report.error = Some(e.to_string());
                return report;
            }
        }

        let target = target_key(&self.s3_path, now, &report.instance_id, &self.plan_name);
        let outcome = self.snapshot_and_upload(conf_path, &target).await;
        let last = match &outcome {
            Ok(artifact) => artifact.clone(),
            Err(BackupError::Pipeline(e)) => e.artifact.clone(),
            Err(_) => Artifact::default(),
        };
        let cleanup = Pipeline::new("cleanup").with_task(CleanupTask).run(last).await;

        let first_error = match (outcome, cleanup) {
            (Err(e), _) => Some(e.to_string()),
            (Ok(_), Err(e)) => Some(e.to_string()),
            (Ok(_), Ok(_)) => None,
        };
        match &first_error {
            None => info!(instance_id = %report.instance_id, %target, "instance backed up"),
            Some(e) => error!(instance_id = %report.instance_id, error = %e, "instance backup failed"),
        }
        report.error = first_error;
        report
    }

    async fn snapshot_and_upload(&self, conf_path: &Path, target: &str) -> BackupResult<Artifact> {
        let conf = RedisConf::load(conf_path)?;
        let client = self.clients.connect(&conf).await?;

        let pipeline = Pipeline::new("redis-backup")
            .with_task(SnapshotTask::new(client, self.snapshot_timeout))
            .with_task(RenameTask)
            .with_task(UploadTask::new(self.bucket.clone(), target));
        Ok(pipeline.run(Artifact::default()).await?)
    }
}
