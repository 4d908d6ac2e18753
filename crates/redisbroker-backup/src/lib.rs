//! Redis backups to S3-compatible storage.
//!
//! ```text
//!  Orchestrator ── discover <root>/**/<redis.conf>
//!       │
//!       ├─ IdLocator (directory name | broker /instance lookup)
//!       │
//!       ├─ redis-backup: snapshot → rename → s3-upload
//!       └─ cleanup:      restore live RDB or drop the renamed copy
//! ```

pub mod cleanup;
pub mod error;
pub mod locator;
pub mod orchestrator;
pub mod rename;
pub mod s3;
pub mod snapshot;
pub mod task;

pub use error::{BackupError, BackupResult, LocateError, PipelineError, TaskError, TaskResult};
pub use locator::{BrokerLocator, IdLocator, SharedLocator};
pub use orchestrator::{BackupReport, ClientFactory, ConnectionFactory, Orchestrator};
pub use s3::{AwsCliBucket, Bucket};
pub use task::{Artifact, Pipeline, Task};
