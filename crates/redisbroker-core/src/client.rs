//! Redis wire client used by snapshots and keycount probes.
//!
//! `RedisClient` is the narrow capability the rest of the broker needs.
//! `RedisConnection` implements it over a multiplexed `redis` connection and
//! honours the `rename-command` aliases of the instance's config.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use thiserror::Error;
use tracing::debug;

use crate::redisconf::RedisConf;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Commands that may be renamed in `redis.conf`.
const ALIASABLE: &[&str] = &["PING", "INFO", "LASTSAVE", "BGSAVE", "CONFIG", "DBSIZE", "FLUSHALL"];

pub type RedisClientResult<T> = Result<T, RedisClientError>;

#[derive(Debug, Error)]
pub enum RedisClientError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("connection to {0} timed out")]
    ConnectTimeout(String),

    #[error("command {0} is disabled by rename-command")]
    CommandDisabled(String),

    #[error("CONFIG GET {0} returned no value")]
    MissingConfig(String),

    #[error(transparent)]
    Conf(#[from] crate::error::ConfError),
}

/// Operations the broker issues against a redis server.
#[async_trait]
pub trait RedisClient: Send + Sync {
    /// `host:port` of the server.
    fn address(&self) -> String;

    async fn ping(&self) -> RedisClientResult<()>;

    async fn info(&self) -> RedisClientResult<String>;

    /// Unix timestamp of the last successful save.
    async fn last_save(&self) -> RedisClientResult<i64>;

    async fn bg_save(&self) -> RedisClientResult<()>;

    async fn config_get(&self, key: &str) -> RedisClientResult<String>;

    async fn dbsize(&self) -> RedisClientResult<i64>;

    /// Path of the live RDB file, from `dir` and `dbfilename`.
    async fn rdb_path(&self) -> RedisClientResult<PathBuf> {
        let dir = self.config_get("dir").await?;
        let file = self.config_get("dbfilename").await?;
        Ok(PathBuf::from(dir).join(file))
    }
}

/// Authenticated connection to one redis server.
#[derive(Clone)]
pub struct RedisConnection {
    address: String,
    aliases: HashMap<String, String>,
    conn: MultiplexedConnection,
}

impl RedisConnection {
    /// Connect and authenticate. `aliases` maps upper-case command names to
    /// their configured names.
    pub async fn connect(
        host: &str,
        port: u16,
        password: &str,
        aliases: HashMap<String, String>,
    ) -> RedisClientResult<Self> {
        let address = format!("{host}:{port}");
        let client = redis::Client::open(format!("redis://{address}/"))?;
        let mut conn = tokio::time::timeout(CONNECT_TIMEOUT, client.get_multiplexed_async_connection())
            .await
            .map_err(|_| RedisClientError::ConnectTimeout(address.clone()))??;

        if !password.is_empty() {
            let _: () = redis::cmd("AUTH").arg(password).query_async(&mut conn).await?;
        }
        debug!(%address, "redis connection established");

        Ok(Self {
            address,
            aliases,
            conn,
        })
    }

    /// Connect using host, port, password and command aliases from a config.
    pub async fn from_conf(conf: &RedisConf) -> RedisClientResult<Self> {
        Self::connect(&conf.host(), conf.port()?, &conf.password(), command_aliases(conf)).await
    }

    fn command(&self, name: &str) -> RedisClientResult<redis::Cmd> {
        aliased_command(&self.aliases, name)
    }

    /// Drop every key. Only used by tests against a live server.
    pub async fn flush_all(&self) -> RedisClientResult<()> {
        let mut conn = self.conn.clone();
        let _: () = self.command("FLUSHALL")?.query_async(&mut conn).await?;
        Ok(())
    }
}

/// Configured name of every aliasable command.
fn command_aliases(conf: &RedisConf) -> HashMap<String, String> {
    ALIASABLE
        .iter()
        .map(|cmd| (cmd.to_string(), conf.command_alias(cmd)))
        .collect()
}

/// Build `name` under its configured alias. An empty alias disables it.
fn aliased_command(aliases: &HashMap<String, String>, name: &str) -> RedisClientResult<redis::Cmd> {
    let alias = aliases.get(name).map(String::as_str).unwrap_or(name);
    if alias.is_empty() {
        return Err(RedisClientError::CommandDisabled(name.to_string()));
    }
    Ok(redis::cmd(alias))
}

#[async_trait]
impl RedisClient for RedisConnection {
    fn address(&self) -> String {
        self.address.clone()
    }

    async fn ping(&self) -> RedisClientResult<()> {
        let mut conn = self.conn.clone();
        let _: String = self.command("PING")?.query_async(&mut conn).await?;
        Ok(())
    }

    async fn info(&self) -> RedisClientResult<String> {
        let mut conn = self.conn.clone();
        let info: String = self.command("INFO")?.query_async(&mut conn).await?;
        Ok(info)
    }

    async fn last_save(&self) -> RedisClientResult<i64> {
        let mut conn = self.conn.clone();
        let ts: i64 = self.command("LASTSAVE")?.query_async(&mut conn).await?;
        Ok(ts)
    }

    async fn bg_save(&self) -> RedisClientResult<()> {
        let mut conn = self.conn.clone();
        let _: String = self.command("BGSAVE")?.query_async(&mut conn).await?;
        Ok(())
    }

    async fn config_get(&self, key: &str) -> RedisClientResult<String> {
        let mut conn = self.conn.clone();
        let reply: Vec<String> = self
            .command("CONFIG")?
            .arg("GET")
            .arg(key)
            .query_async(&mut conn)
            .await?;
        reply
            .into_iter()
            .nth(1)
            .ok_or_else(|| RedisClientError::MissingConfig(key.to_string()))
    }

    async fn dbsize(&self) -> RedisClientResult<i64> {
        let mut conn = self.conn.clone();
        let size: i64 = self.command("DBSIZE")?.query_async(&mut conn).await?;
        Ok(size)
    }
}
