//! The instance record handed out as bind credentials.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A provisioned (or poolable) redis endpoint.
///
/// Dedicated nodes sitting in the available pool have an empty `id`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub password: String,
}

impl Instance {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// A fresh high-entropy password derived from a v4 UUID.
pub fn generate_password() -> String {
    Uuid::new_v4().simple().to_string()
}
