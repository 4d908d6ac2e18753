//! Node agent HTTP surface.
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/` | Port and password from the local `redis.conf` |
//! | DELETE | `/` | Factory-reset redis |
//! | GET | `/keycount` | `DBSIZE` of the local redis |

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{middleware, Json, Router};
use tracing::{error, info};

use redisbroker_core::client::RedisClient;
use redisbroker_core::config::Credentials;
use redisbroker_core::{generate_password, ConfResult, RedisConf, RedisConnection};

use crate::auth::require_basic_auth;
use crate::client::{AgentCredentials, KeycountResponse};
use crate::error::KeycountResult;
use crate::resetter::RedisResetter;

/// Counts keys in the local redis.
#[async_trait]
pub trait KeyCounter: Send + Sync {
    async fn key_count(&self) -> KeycountResult<i64>;
}

/// Connects with the host, port, password and aliases of a config file.
pub struct ConfKeyCounter {
    conf_path: PathBuf,
}

impl ConfKeyCounter {
    pub fn new(conf_path: impl Into<PathBuf>) -> Self {
        Self {
            conf_path: conf_path.into(),
        }
    }
}

#[async_trait]
impl KeyCounter for ConfKeyCounter {
    async fn key_count(&self) -> KeycountResult<i64> {
        let conf = RedisConf::load(&self.conf_path)?;
        let client = RedisConnection::from_conf(&conf).await?;
        Ok(client.dbsize().await?)
    }
}

/// Shared state for agent handlers.
#[derive(Clone)]
pub struct AgentState {
    pub conf_path: PathBuf,
    pub resetter: Arc<dyn RedisResetter>,
    pub key_counter: Arc<dyn KeyCounter>,
}

/// Build the agent router with basic auth on every route.
pub fn agent_router(state: AgentState, auth: Arc<Credentials>) -> Router {
    Router::new()
        .route("/", get(credentials).delete(reset))
        .route("/keycount", get(keycount))
        .with_state(state)
        .layer(middleware::from_fn_with_state(auth, require_basic_auth))
}

/// Write the node's `redis.conf` from the default config.
///
/// An existing `requirepass` survives; every other parameter is replaced by
/// the default. Without an existing config a new password is generated.
pub fn initialize_config(conf_path: &Path, default_conf_path: &Path) -> ConfResult<()> {
    let default = RedisConf::load(default_conf_path)?;

    let existing = if conf_path.exists() {
        RedisConf::load(conf_path)?.password()
    } else {
        String::new()
    };
    let password = if existing.is_empty() {
        generate_password()
    } else {
        existing
    };

    RedisConf::init_for_dedicated_node(&default, &password)?.save(conf_path)?;
    info!(path = ?conf_path, "redis config initialised");
    Ok(())
}

// ── Handlers ───────────────────────────────────────────────────

/// GET /
async fn credentials(State(state): State<AgentState>) -> impl IntoResponse {
    let conf = match RedisConf::load(&state.conf_path) {
        Ok(conf) => conf,
        Err(e) => {
            error!(error = %e, "failed to read redis config");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    match conf.port() {
        Ok(port) => Json(AgentCredentials {
            port,
            password: conf.password(),
        })
        .into_response(),
        Err(e) => {
            error!(error = %e, "invalid port in redis config");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// DELETE /
async fn reset(State(state): State<AgentState>) -> impl IntoResponse {
    match state.resetter.reset_redis().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            error!(error = %e, "redis reset failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// GET /keycount
async fn keycount(State(state): State<AgentState>) -> impl IntoResponse {
    match state.key_counter.key_count().await {
        Ok(key_count) => Json(KeycountResponse { key_count }).into_response(),
        Err(e) => {
            error!(error = %e, "keycount failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::body::Body;
    use axum::http::header::AUTHORIZATION;
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::error::{MonitError, ResetError, ResetResult};

    // admin:secret
    const AUTH: &str = "Basic YWRtaW46c2VjcmV0";

    #[derive(Default)]
    struct FakeResetter {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl RedisResetter for FakeResetter {
        async fn reset_redis(&self) -> ResetResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ResetError::Monit(MonitError::Command {
                    command: "stop redis".to_string(),
                    output: "boom".to_string(),
                }));
            }
            Ok(())
        }
    }

    struct FixedCount(i64);

    #[async_trait]
    impl KeyCounter for FixedCount {
        async fn key_count(&self) -> KeycountResult<i64> {
            Ok(self.0)
        }
    }

    fn router(conf_path: PathBuf, resetter: Arc<FakeResetter>) -> Router {
        let state = AgentState {
            conf_path,
            resetter,
            key_counter: Arc::new(FixedCount(3)),
        };
        let auth = Arc::new(Credentials {
            username: "admin".to_string(),
            password: "secret".to_string(),
        });
        agent_router(state, auth)
    }

    fn request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(AUTHORIZATION, AUTH)
            .body(Body::empty())
            .unwrap()
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn get_root_returns_conf_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let conf = dir.path().join("redis.conf");
        std::fs::write(&conf, "port 6380\nrequirepass \"pw\"\n").unwrap();

        let resp = router(conf, Arc::default())
            .oneshot(request("GET", "/"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["port"], 6380);
        assert_eq!(body["password"], "pw");
    }

    #[tokio::test]
    async fn get_root_without_conf_is_500() {
        let dir = tempfile::tempdir().unwrap();
        let resp = router(dir.path().join("missing.conf"), Arc::default())
            .oneshot(request("GET", "/"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn delete_invokes_resetter() {
        let dir = tempfile::tempdir().unwrap();
        let resetter = Arc::new(FakeResetter::default());
        let resp = router(dir.path().join("redis.conf"), resetter.clone())
            .oneshot(request("DELETE", "/"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resetter.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_reset_is_500() {
        let dir = tempfile::tempdir().unwrap();
        let resetter = Arc::new(FakeResetter {
            fail: true,
            ..Default::default()
        });
        let resp = router(dir.path().join("redis.conf"), resetter)
            .oneshot(request("DELETE", "/"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn keycount_reports_count() {
        let dir = tempfile::tempdir().unwrap();
        let resp = router(dir.path().join("redis.conf"), Arc::default())
            .oneshot(request("GET", "/keycount"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["key_count"], 3);
    }

    #[tokio::test]
    async fn routes_require_auth() {
        let dir = tempfile::tempdir().unwrap();
        let req = Request::builder().uri("/keycount").body(Body::empty()).unwrap();
        let resp = router(dir.path().join("redis.conf"), Arc::default())
            .oneshot(req)
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn initialize_generates_password_for_fresh_node() {
        let dir = tempfile::tempdir().unwrap();
        let default = dir.path().join("redis.conf.default");
        let conf = dir.path().join("redis.conf");
        std::fs::write(&default, "port 6379\nmaxmemory 2kb\n").unwrap();

        initialize_config(&conf, &default).unwrap();

        let written = RedisConf::load(&conf).unwrap();
        assert!(!written.password().is_empty());
        assert_eq!(written.get("maxmemory"), Some("2048"));
    }

    #[test]
    fn initialize_preserves_existing_password_only() {
        let dir = tempfile::tempdir().unwrap();
        let default = dir.path().join("redis.conf.default");
        let conf = dir.path().join("redis.conf");
        std::fs::write(&default, "port 6379\nappendonly yes\n").unwrap();
        std::fs::write(&conf, "port 7000\nrequirepass keepme\nstale yes\n").unwrap();

        initialize_config(&conf, &default).unwrap();

        let written = RedisConf::load(&conf).unwrap();
        assert_eq!(written.password(), "keepme");
        assert_eq!(written.get("port"), Some("6379"));
        assert_eq!(written.get("appendonly"), Some("yes"));
        assert_eq!(written.get("stale"), None);
    }
}
