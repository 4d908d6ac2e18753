//! YAML configuration for the broker, the node agent and the backup job.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfError, ConfResult};

/// Plan name of the many-tenant plan, as it appears in the catalog and in backup keys.
pub const SHARED_PLAN_NAME: &str = "shared-vm";
/// Plan name of the one-tenant-per-node plan.
pub const DEDICATED_PLAN_NAME: &str = "dedicated-vm";

/// Read and deserialize a YAML file.
pub fn load<T: DeserializeOwned>(path: &Path) -> ConfResult<T> {
    debug!(?path, "reading config");
    let file = File::open(path).map_err(|source| ConfError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_reader(file).map_err(|source| ConfError::Yaml {
        path: path.to_path_buf(),
        source,
    })
}

/// Basic-auth credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

// ── Broker ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub broker: BrokerSection,
    pub redis: RedisSection,
    #[serde(default = "default_agent_port")]
    pub agent_port: u16,
    /// Scheme used to reach node agents.
    #[serde(default = "default_agent_scheme")]
    pub agent_scheme: String,
    pub auth: Credentials,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerSection {
    #[serde(default = "default_listen_host")]
    pub host: String,
    #[serde(default = "default_broker_port")]
    pub port: u16,
    pub service_id: String,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default)]
    pub description: String,
    pub shared_plan_id: String,
    pub dedicated_plan_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisSection {
    /// Host advertised in shared-plan credentials.
    pub host: String,
    #[serde(default)]
    pub service_instance_limit: usize,
    pub default_config_path: PathBuf,
    pub instance_data_directory: PathBuf,
    pub instance_log_directory: PathBuf,
    pub pidfile_directory: PathBuf,
    #[serde(default = "default_redis_server")]
    pub redis_server_executable: PathBuf,
    /// Seconds between supervisor sweeps.
    #[serde(default = "default_process_check_interval")]
    pub process_check_interval: u64,
    /// Seconds to wait for a spawned redis to accept connections.
    #[serde(default = "default_start_redis_timeout")]
    pub start_redis_timeout: u64,
    /// Seconds between consistency sweeps of the dedicated pool.
    #[serde(default = "default_consistency_check_interval")]
    pub consistency_check_interval: u64,
    #[serde(default)]
    pub dedicated: DedicatedSection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DedicatedSection {
    #[serde(default)]
    pub nodes: Vec<String>,
    #[serde(default = "default_redis_port")]
    pub port: u16,
    #[serde(default)]
    pub statefile_path: PathBuf,
}

impl BrokerConfig {
    pub fn from_file(path: &Path) -> ConfResult<Self> {
        load(path)
    }

    pub fn shared_enabled(&self) -> bool {
        self.redis.service_instance_limit > 0
    }

    pub fn dedicated_enabled(&self) -> bool {
        !self.redis.dedicated.nodes.is_empty()
    }

    pub fn process_check_interval(&self) -> Duration {
        Duration::from_secs(self.redis.process_check_interval)
    }

    pub fn start_redis_timeout(&self) -> Duration {
        Duration::from_secs(self.redis.start_redis_timeout)
    }

    pub fn consistency_check_interval(&self) -> Duration {
        Duration::from_secs(self.redis.consistency_check_interval)
    }
}

// ── Node agent ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub default_conf_path: PathBuf,
    pub conf_path: PathBuf,
    /// Directory holding `appendonly.aof` and `dump.rdb`.
    pub redis_data_directory: PathBuf,
    #[serde(default = "default_monit")]
    pub monit_executable_path: PathBuf,
    /// Monit process name of the redis server.
    #[serde(default = "default_monit_process")]
    pub redis_process_name: String,
    #[serde(default = "default_agent_port")]
    pub port: u16,
    pub auth: Credentials,
}

impl AgentConfig {
    pub fn from_file(path: &Path) -> ConfResult<Self> {
        load(path)
    }
}

// ── Backup ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    pub redis_config_root: PathBuf,
    #[serde(default = "default_redis_config_filename")]
    pub redis_config_filename: String,
    #[serde(default = "default_snapshot_timeout")]
    pub snapshot_timeout_seconds: u64,
    pub s3: S3Config,
    pub plan_name: String,
    #[serde(default)]
    pub broker_address: String,
    #[serde(default)]
    pub broker_credentials: Credentials,
    #[serde(default)]
    pub node_ip: String,
    #[serde(default = "default_aws_cli")]
    pub aws_cli_path: PathBuf,
    /// Resolve instance ids through the broker instead of the directory layout.
    #[serde(default)]
    pub dedicated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    pub bucket_name: String,
    pub endpoint_url: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    #[serde(default)]
    pub path: String,
}

impl BackupConfig {
    pub fn from_file(path: &Path) -> ConfResult<Self> {
        load(path)
    }

    pub fn snapshot_timeout(&self) -> Duration {
        Duration::from_secs(self.snapshot_timeout_seconds)
    }
}

fn default_agent_port() -> u16 {
    9876
}

fn default_agent_scheme() -> String {
    "https".to_string()
}

fn default_listen_host() -> String {
    "0.0.0.0".to_string()
}

fn default_broker_port() -> u16 {
    12350
}

fn default_service_name() -> String {
    "p-redis".to_string()
}

fn default_redis_server() -> PathBuf {
    PathBuf::from("redis-server")
}

fn default_process_check_interval() -> u64 {
    10
}

fn default_start_redis_timeout() -> u64 {
    10
}

fn default_consistency_check_interval() -> u64 {
    10
}

fn default_redis_port() -> u16 {
    6379
}

fn default_monit() -> PathBuf {
    PathBuf::from("/var/vcap/bosh/bin/monit")
}

fn default_monit_process() -> String {
    "redis".to_string()
}

fn default_redis_config_filename() -> String {
    "redis.conf".to_string()
}

fn default_snapshot_timeout() -> u64 {
    3600
}

fn default_aws_cli() -> PathBuf {
    PathBuf::from("aws")
}
