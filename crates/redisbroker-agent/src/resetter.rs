//! Factory reset of the redis on a dedicated node.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use redisbroker_core::{generate_password, RedisConf};
use redisbroker_process::wait_until_connectable;

use crate::error::{ResetError, ResetResult};
use crate::monit::ProcessSupervisor;

const AOF_FILE: &str = "appendonly.aof";
const RDB_FILE: &str = "dump.rdb";
const PORT_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait RedisResetter: Send + Sync {
    async fn reset_redis(&self) -> ResetResult<()>;
}

/// Stops redis, erases its data, rotates the password and starts it again.
///
/// A failing step aborts the reset; earlier steps are not rolled back.
pub struct Resetter {
    supervisor: Arc<dyn ProcessSupervisor>,
    process_name: String,
    default_conf_path: PathBuf,
    conf_path: PathBuf,
    data_dir: PathBuf,
    port_timeout: Duration,
}

impl Resetter {
    pub fn new(
        supervisor: Arc<dyn ProcessSupervisor>,
        process_name: impl Into<String>,
        default_conf_path: impl Into<PathBuf>,
        conf_path: impl Into<PathBuf>,
        data_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            supervisor,
            process_name: process_name.into(),
            default_conf_path: default_conf_path.into(),
            conf_path: conf_path.into(),
            data_dir: data_dir.into(),
            port_timeout: PORT_TIMEOUT,
        }
    }

    pub fn with_port_timeout(mut self, timeout: Duration) -> Self {
        self.port_timeout = timeout;
        self
    }

    fn remove_data(&self) -> ResetResult<()> {
        let aof = self.data_dir.join(AOF_FILE);
        std::fs::remove_file(&aof).map_err(|source| ResetError::RemoveFile {
            path: aof.clone(),
            source,
        })?;

        let rdb = self.data_dir.join(RDB_FILE);
        match std::fs::remove_file(&rdb) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = ?rdb, "no rdb file to remove");
            }
            Err(source) => return Err(ResetError::RemoveFile { path: rdb, source }),
        }
        Ok(())
    }

    fn rewrite_conf(&self) -> ResetResult<()> {
        let default = RedisConf::load(&self.default_conf_path)?;
        let conf = RedisConf::init_for_dedicated_node(&default, &generate_password())?;
        conf.save(&self.conf_path)?;
        Ok(())
    }
}

#[async_trait]
impl RedisResetter for Resetter {
    async fn reset_redis(&self) -> ResetResult<()> {
        info!(process = %self.process_name, "resetting redis");

        self.supervisor.stop_and_wait(&self.process_name).await?;
        self.remove_data()?;
        self.rewrite_conf()?;
        self.supervisor.start_and_wait(&self.process_name).await?;

        let conf = RedisConf::load(&self.conf_path)?;
        let address = format!("{}:{}", conf.host(), conf.port()?);
        wait_until_connectable(&address, self.port_timeout).await?;

        info!(%address, "redis reset complete");
        Ok(())
    }
}
