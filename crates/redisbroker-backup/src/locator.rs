//! Resolving the instance id a redis config belongs to.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use redisbroker_core::config::Credentials;

use crate::error::{LocateError, LocateResult};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[async_trait]
pub trait IdLocator: Send + Sync {
    async fn locate(&self, conf_path: &Path) -> LocateResult<String>;
}

/// Shared plan: the instance id is the name of the directory holding the config.
pub struct SharedLocator;

#[async_trait]
impl IdLocator for SharedLocator {
    async fn locate(&self, conf_path: &Path) -> LocateResult<String> {
        conf_path
            .parent()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| LocateError::NoParent(conf_path.to_path_buf()))
    }
}

#[derive(Deserialize)]
struct InstanceIdResponse {
    instance_id: String,
}

/// Dedicated plan: ask the broker which instance is allocated on this node.
pub struct BrokerLocator {
    http: reqwest::Client,
    broker_address: String,
    credentials: Credentials,
    node_ip: String,
}

impl BrokerLocator {
    pub fn new(
        broker_address: impl Into<String>,
        credentials: Credentials,
        node_ip: impl Into<String>,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            broker_address: broker_address.into(),
            credentials,
            node_ip: node_ip.into(),
        })
    }

    fn url(&self) -> String {
        let base = self.broker_address.trim_end_matches('/');
        if base.contains("://") {
            format!("{base}/instance")
        } else {
            format!("http://{base}/instance")
        }
    }
}

#[async_trait]
impl IdLocator for BrokerLocator {
    async fn locate(&self, _conf_path: &Path) -> LocateResult<String> {
        let url = self.url();
        let response = self
            .http
            .get(&url)
            .query(&[("host", self.node_ip.as_str())])
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .send()
            .await
            .map_err(|source| LocateError::Request {
                url: url.clone(),
                source,
            })?;
        if !response.status().is_success() {
            return Err(LocateError::BadStatus {
                url,
                status: response.status().as_u16(),
            });
        }
        let body: InstanceIdResponse = response
            .json()
            .await
            .map_err(|source| LocateError::Request { url, source })?;
        Ok(body.instance_id)
    }
}
