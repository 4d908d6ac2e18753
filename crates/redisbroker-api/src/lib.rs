//! redisbroker-api: the Open Service Broker API for redis.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/v2/catalog` | Service and enabled plans |
//! | PUT | `/v2/service_instances/{id}` | Provision |
//! | DELETE | `/v2/service_instances/{id}` | Deprovision |
//! | PUT | `/v2/service_instances/{id}/service_bindings/{bid}` | Bind |
//! | DELETE | `/v2/service_instances/{id}/service_bindings/{bid}` | Unbind |
//! | GET | `/debug` | Dedicated pool and allocations |
//! | GET | `/instance?host=` | Instance allocated on a node |
//!
//! Every route sits behind HTTP basic auth.

pub mod catalog;
pub mod handlers;

use std::collections::HashMap;
use std::sync::Arc;

use axum::routing::{get, put};
use axum::{middleware, Router};

use redisbroker_agent::auth::require_basic_auth;
use redisbroker_core::config::Credentials;
use redisbroker_repo::{InstanceBinder, InstanceCreator, RemoteRepository};

pub use catalog::Catalog;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub catalog: Arc<Catalog>,
    /// plan_id → provisioning side of the plan.
    pub creators: Arc<HashMap<String, Arc<dyn InstanceCreator>>>,
    /// plan_id → binding side of the plan.
    pub binders: Arc<HashMap<String, Arc<dyn InstanceBinder>>>,
    /// Dedicated pool, when that plan is enabled.
    pub remote: Option<Arc<RemoteRepository>>,
}

impl ApiState {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog: Arc::new(catalog),
            creators: Arc::new(HashMap::new()),
            binders: Arc::new(HashMap::new()),
            remote: None,
        }
    }

    /// Register a plan whose repository both creates and binds.
    pub fn with_plan<R>(mut self, plan_id: impl Into<String>, repo: Arc<R>) -> Self
    where
        R: InstanceCreator + InstanceBinder + 'static,
    {
        let plan_id = plan_id.into();
        Arc::make_mut(&mut self.creators).insert(plan_id.clone(), repo.clone());
        Arc::make_mut(&mut self.binders).insert(plan_id, repo);
        self
    }

    pub fn with_remote(mut self, remote: Arc<RemoteRepository>) -> Self {
        self.remote = Some(remote);
        self
    }
}

/// Build the broker router with basic auth on every route.
pub fn build_router(state: ApiState, auth: Arc<Credentials>) -> Router {
    Router::new()
        .route("/v2/catalog", get(handlers::catalog))
        .route(
            "/v2/service_instances/{id}",
            put(handlers::provision).delete(handlers::deprovision),
        )
        .route(
            "/v2/service_instances/{id}/service_bindings/{binding_id}",
            put(handlers::bind).delete(handlers::unbind),
        )
        .route("/debug", get(handlers::debug))
        .route("/instance", get(handlers::instance_for_host))
        .with_state(state)
        .layer(middleware::from_fn_with_state(auth, require_basic_auth))
}
