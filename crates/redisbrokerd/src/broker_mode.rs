//! Broker mode: the service broker API plus its background loops.
//!
//! In this mode, the daemon:
//! 1. Builds the shared-plan repository and its process supervisor, when a
//!    shared instance limit is configured
//! 2. Opens the dedicated pool from its state file and starts the
//!    consistency checker, when dedicated nodes are configured
//! 3. Serves the broker API until Ctrl-C, then quiesces the loops

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::info;

use redisbroker_agent::{AgentApi, AgentClient, AgentEndpoint};
use redisbroker_api::{build_router, ApiState, Catalog};
use redisbroker_consistency::ConsistencyChecker;
use redisbroker_core::config::BrokerConfig;
use redisbroker_process::{ProcessController, RedisProcessController};
use redisbroker_repo::{InstanceSupervisor, LocalRepository, LocalSettings, RemoteRepository};
use redisbroker_state::StateFile;

pub async fn run_broker(config: BrokerConfig) -> anyhow::Result<()> {
    info!(service = %config.broker.service_name, "redis broker starting");

    let mut api = ApiState::new(Catalog::from_config(&config));

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut background = Vec::new();

    // ── Shared plan ────────────────────────────────────────────

    if config.shared_enabled() {
        let controller: Arc<dyn ProcessController> =
            Arc::new(RedisProcessController::new(&config.redis.redis_server_executable));
        let local = Arc::new(LocalRepository::new(
            LocalSettings::from_config(&config.redis),
            controller.clone(),
        ));
        api = api.with_plan(config.broker.shared_plan_id.clone(), local.clone());
        info!(limit = config.redis.service_instance_limit, "shared plan enabled");

        let supervisor = InstanceSupervisor::new(
            local,
            controller,
            config.process_check_interval(),
            config.start_redis_timeout(),
        );
        background.push(tokio::spawn(supervisor.run(shutdown_rx.clone())));
    }

    // ── Dedicated plan ─────────────────────────────────────────

    if config.dedicated_enabled() {
        let agent: Arc<dyn AgentApi> = Arc::new(AgentClient::new(config.auth.clone())?);
        let dedicated = &config.redis.dedicated;
        let remote = Arc::new(
            RemoteRepository::open(
                StateFile::new(&dedicated.statefile_path),
                &dedicated.nodes,
                dedicated.port,
                agent.clone(),
                AgentEndpoint::new(config.agent_scheme.clone(), config.agent_port),
            )
            .with_context(|| format!("opening state file {}", dedicated.statefile_path.display()))?,
        );
        api = api
            .with_plan(config.broker.dedicated_plan_id.clone(), remote.clone())
            .with_remote(remote.clone());
        info!(nodes = dedicated.nodes.len(), "dedicated plan enabled");

        let checker = ConsistencyChecker::new(remote, agent, config.consistency_check_interval());
        background.push(tokio::spawn(checker.run(shutdown_rx.clone())));
    }
    drop(shutdown_rx);

    // ── Start API server ───────────────────────────────────────

    let router = build_router(api, Arc::new(config.auth.clone()));
    let addr = format!("{}:{}", config.broker.host, config.broker.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "broker API listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            crate::shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        })
        .await?;

    for handle in background {
        let _ = handle.await;
    }

    info!("redis broker stopped");
    Ok(())
}
