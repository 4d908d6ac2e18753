//! OSBAPI handlers.
//!
//! Plan dispatch is a lookup in the plan_id maps of [`ApiState`]; requests
//! for an existing instance are routed to whichever plan owns it.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};

use redisbroker_repo::{InstanceBinder, InstanceCreator, RepoError, RepoResult};

use crate::ApiState;

fn empty(status: StatusCode) -> Response {
    (status, Json(json!({}))).into_response()
}

fn description(status: StatusCode, msg: impl Into<String>) -> Response {
    (status, Json(json!({ "description": msg.into() }))).into_response()
}

/// Status code and body for a repository error.
fn repo_error_response(e: &RepoError) -> Response {
    match e {
        RepoError::AlreadyExists(_) | RepoError::BindingAlreadyExists { .. } => {
            empty(StatusCode::CONFLICT)
        }
        RepoError::DoesNotExist(_) | RepoError::BindingDoesNotExist { .. } => empty(StatusCode::GONE),
        RepoError::InvalidId(_) => description(StatusCode::BAD_REQUEST, e.to_string()),
        other => {
            error!(error = %other, "request failed");
            description(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
        }
    }
}

async fn find_creator(state: &ApiState, id: &str) -> RepoResult<Option<Arc<dyn InstanceCreator>>> {
    for creator in state.creators.values() {
        if creator.instance_exists(id).await? {
            return Ok(Some(creator.clone()));
        }
    }
    Ok(None)
}

async fn find_binder(state: &ApiState, id: &str) -> RepoResult<Option<Arc<dyn InstanceBinder>>> {
    for binder in state.binders.values() {
        if binder.instance_exists(id).await? {
            return Ok(Some(binder.clone()));
        }
    }
    Ok(None)
}

// ── Catalog ────────────────────────────────────────────────────

/// GET /v2/catalog
pub async fn catalog(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.catalog.as_ref().clone())
}

// ── Instances ──────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ProvisionRequest {
    #[serde(default)]
    pub plan_id: Option<String>,
}

/// PUT /v2/service_instances/{id}
pub async fn provision(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    body: Bytes,
) -> impl IntoResponse {
    let request: ProvisionRequest = serde_json::from_slice(&body).unwrap_or_default();
    let Some(plan_id) = request.plan_id.filter(|p| !p.is_empty()) else {
        return description(StatusCode::UNPROCESSABLE_ENTITY, "plan_id required");
    };
    let Some(creator) = state.creators.get(&plan_id).cloned() else {
        return description(StatusCode::BAD_REQUEST, format!("plan_id {plan_id} not recognized"));
    };

    match find_creator(&state, &id).await {
        Ok(Some(_)) => return empty(StatusCode::CONFLICT),
        Ok(None) => {}
        Err(e) => return repo_error_response(&e),
    }

    match creator.create(&id).await {
        Ok(()) => {
            info!(instance_id = %id, %plan_id, "instance provisioned");
            empty(StatusCode::CREATED)
        }
        Err(e) => repo_error_response(&e),
    }
}

/// DELETE /v2/service_instances/{id}
pub async fn deprovision(State(state): State<ApiState>, Path(id): Path<String>) -> impl IntoResponse {
    let creator = match find_creator(&state, &id).await {
        Ok(Some(creator)) => creator,
        Ok(None) => return empty(StatusCode::GONE),
        Err(e) => return repo_error_response(&e),
    };

    match creator.destroy(&id).await {
        Ok(()) => {
            info!(instance_id = %id, "instance deprovisioned");
            empty(StatusCode::OK)
        }
        Err(e) => repo_error_response(&e),
    }
}

// ── Bindings ───────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct Credentials {
    host: String,
    port: u16,
    password: String,
}

/// PUT /v2/service_instances/{id}/service_bindings/{binding_id}
pub async fn bind(
    State(state): State<ApiState>,
    Path((id, binding_id)): Path<(String, String)>,
) -> impl IntoResponse {
    let binder = match find_binder(&state, &id).await {
        Ok(Some(binder)) => binder,
        Ok(None) => return description(StatusCode::NOT_FOUND, format!("instance {id} not found")),
        Err(e) => return repo_error_response(&e),
    };

    match binder.bind(&id, &binding_id).await {
        Ok(instance) => {
            info!(instance_id = %id, %binding_id, "binding created");
            let credentials = Credentials {
                host: instance.host,
                port: instance.port,
                password: instance.password,
            };
            (StatusCode::CREATED, Json(json!({ "credentials": credentials }))).into_response()
        }
        Err(e) => repo_error_response(&e),
    }
}

/// DELETE /v2/service_instances/{id}/service_bindings/{binding_id}
pub async fn unbind(
    State(state): State<ApiState>,
    Path((id, binding_id)): Path<(String, String)>,
) -> impl IntoResponse {
    let binder = match find_binder(&state, &id).await {
        Ok(Some(binder)) => binder,
        Ok(None) => return empty(StatusCode::GONE),
        Err(e) => return repo_error_response(&e),
    };

    match binder.unbind(&id, &binding_id).await {
        Ok(()) => empty(StatusCode::OK),
        Err(e) => repo_error_response(&e),
    }
}

// ── Introspection ──────────────────────────────────────────────

/// GET /debug
pub async fn debug(State(state): State<ApiState>) -> impl IntoResponse {
    let Some(remote) = &state.remote else {
        return Json(json!({
            "pool": { "count": 0, "clusters": [] },
            "allocated": { "count": 0, "clusters": [] },
        }))
        .into_response();
    };

    let doc = remote.snapshot().await;
    let pool: Vec<_> = doc
        .available_instances
        .iter()
        .map(|i| vec![i.host.clone()])
        .collect();
    let allocated: Vec<_> = doc
        .allocated_instances
        .iter()
        .map(|i| {
            let bindings: Vec<_> = doc
                .instance_bindings
                .get(&i.id)
                .into_iter()
                .flatten()
                .map(|b| json!({ "id": b }))
                .collect();
            json!({ "id": i.id, "hosts": [i.host], "bindings": bindings })
        })
        .collect();

    Json(json!({
        "pool": { "count": pool.len(), "clusters": pool },
        "allocated": { "count": allocated.len(), "clusters": allocated },
    }))
    .into_response()
}

#[derive(Debug, Deserialize)]
pub struct HostQuery {
    #[serde(default)]
    pub host: String,
}

/// GET /instance?host={ip}
pub async fn instance_for_host(
    State(state): State<ApiState>,
    Query(query): Query<HostQuery>,
) -> impl IntoResponse {
    let id = match &state.remote {
        Some(remote) => remote.id_for_host(&query.host).await,
        None => String::new(),
    };
    if id.is_empty() {
        warn!(host = %query.host, "no instance allocated on host");
        return description(StatusCode::NOT_FOUND, format!("no instance on {}", query.host));
    }
    Json(json!({ "instance_id": id })).into_response()
}
