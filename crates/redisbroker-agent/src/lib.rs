//! redisbroker-agent: everything that runs on, or talks to, a dedicated node.
//!
//! # Architecture
//!
//! ```text
//! broker ── AgentClient ──https──▶ agent router (loopback, basic auth)
//!                                   ├── GET    /          → redis.conf port + password
//!                                   ├── DELETE /          → Resetter
//!                                   │                       ├── monit stop redis (wait)
//!                                   │                       ├── rm appendonly.aof, dump.rdb
//!                                   │                       ├── rewrite redis.conf, new password
//!                                   │                       ├── monit start redis (wait)
//!                                   │                       └── wait for port
//!                                   └── GET    /keycount  → DBSIZE
//! ```

pub mod auth;
pub mod client;
pub mod error;
pub mod monit;
pub mod resetter;
pub mod server;

pub use client::{AgentApi, AgentClient, AgentCredentials, AgentEndpoint, KeycountResponse};
pub use error::{AgentError, AgentResult, KeycountError, MonitError, ResetError};
pub use monit::{Monit, MonitStatus, ProcessSupervisor};
pub use resetter::{RedisResetter, Resetter};
pub use server::{agent_router, initialize_config, AgentState, ConfKeyCounter, KeyCounter};
