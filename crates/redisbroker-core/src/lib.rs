//! redisbroker-core: shared building blocks for the Redis service broker.
//!
//! - [`RedisConf`]: ordered, duplicate-preserving model of `redis.conf`
//! - [`memory`]: `maxmemory`-style size parsing
//! - [`Instance`]: the credentials record handed out on bind
//! - [`config`]: YAML configuration for the broker, the node agent and backups
//! - [`client`]: the `RedisClient` capability used by snapshots and keycount probes

pub mod client;
pub mod config;
pub mod error;
pub mod instance;
pub mod memory;
pub mod redisconf;

pub use client::{RedisClient, RedisConnection};
pub use error::{ConfError, ConfResult};
pub use instance::{generate_password, Instance};
pub use redisconf::{Param, RedisConf};
