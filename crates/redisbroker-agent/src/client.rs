//! Broker-side client for the node agent.
//!
//! Every call is a single request with basic auth and a bounded timeout.
//! There are no retries; callers decide what a failure means.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use redisbroker_core::config::Credentials;

use crate::error::{AgentError, AgentResult};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Body of `GET /`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentCredentials {
    pub port: u16,
    pub password: String,
}

/// Body of `GET /keycount`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeycountResponse {
    pub key_count: i64,
}

/// Scheme and port at which agents listen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentEndpoint {
    pub scheme: String,
    pub port: u16,
}

impl AgentEndpoint {
    pub fn new(scheme: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: scheme.into(),
            port,
        }
    }

    /// Base URL of the agent on `host`.
    pub fn url_for(&self, host: &str) -> String {
        format!("{}://{}:{}", self.scheme, host, self.port)
    }
}

/// Operations the broker performs against an agent at a base URL.
#[async_trait]
pub trait AgentApi: Send + Sync {
    async fn credentials(&self, url: &str) -> AgentResult<AgentCredentials>;

    async fn reset(&self, url: &str) -> AgentResult<()>;

    async fn keycount(&self, url: &str) -> AgentResult<i64>;
}

/// reqwest-backed agent client.
#[derive(Clone)]
pub struct AgentClient {
    http: reqwest::Client,
    auth: Credentials,
}

impl AgentClient {
    pub fn new(auth: Credentials) -> AgentResult<Self> {
        Self::with_timeout(auth, REQUEST_TIMEOUT)
    }

    pub fn with_timeout(auth: Credentials, timeout: Duration) -> AgentResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(AgentError::Client)?;
        Ok(Self { http, auth })
    }

    async fn send(&self, request: reqwest::RequestBuilder, url: &str) -> AgentResult<reqwest::Response> {
        let response = request
            .basic_auth(&self.auth.username, Some(&self.auth.password))
            .send()
            .await
            .map_err(|source| AgentError::Unreachable {
                url: url.to_string(),
                source,
            })?;
        if response.status() != StatusCode::OK {
            return Err(AgentError::BadStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl AgentApi for AgentClient {
    async fn credentials(&self, url: &str) -> AgentResult<AgentCredentials> {
        let target = format!("{}/", url.trim_end_matches('/'));
        let response = self.send(self.http.get(&target), &target).await?;
        response
            .json()
            .await
            .map_err(|source| AgentError::Decode { url: target, source })
    }

    async fn reset(&self, url: &str) -> AgentResult<()> {
        let target = format!("{}/", url.trim_end_matches('/'));
        self.send(self.http.delete(&target), &target).await?;
        debug!(url = %target, "agent reset redis");
        Ok(())
    }

    async fn keycount(&self, url: &str) -> AgentResult<i64> {
        let target = format!("{}/keycount", url.trim_end_matches('/'));
        let response = self.send(self.http.get(&target), &target).await?;
        let body: KeycountResponse = response
            .json()
            .await
            .map_err(|source| AgentError::Decode { url: target, source })?;
        Ok(body.key_count)
    }
}
