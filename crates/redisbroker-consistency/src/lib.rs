//! Fleet consistency checks for the dedicated plan.

pub mod checker;
pub mod error;

pub use checker::{AvailablePool, ConsistencyChecker, InconsistencyReporter, LogReporter, Sweep};
pub use error::{CheckError, Inconsistency};
