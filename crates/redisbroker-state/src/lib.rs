//! redisbroker-state: the broker's durable record of the dedicated pool.
//!
//! # Architecture
//!
//! A single JSON document holds the available nodes, the allocated
//! instances and the binding ledger. It is rewritten in full on every
//! mutation: bytes go to a sibling temp file which is fsynced and renamed
//! over the target, so readers see either the old or the new document.
//!
//! Only the remote repository owns a `StateFile`.

pub mod error;
pub mod store;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateFile;
pub use types::*;
