//! redisbroker-process: running redis-server processes on this host.
//!
//! # Architecture
//!
//! ```text
//! ProcessController (trait)
//!   └── RedisProcessController
//!       ├── spawn redis-server <conf> --pidfile … --port … --dir … --requirepass … --logfile …
//!       ├── availability::wait_until_connectable(host:port, timeout)
//!       ├── is_alive(pidfile)  → signal 0
//!       └── kill(pidfile)      → SIGTERM, grace period, SIGKILL
//! ```

pub mod availability;
pub mod controller;
pub mod error;

pub use availability::{is_connectable, wait_until_connectable};
pub use controller::{InstancePaths, ProcessController, RedisProcessController};
pub use error::{ProcessError, ProcessResult};
