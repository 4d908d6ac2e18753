//! Agent mode: runs on each dedicated node, next to its redis.
//!
//! On startup the node's `redis.conf` is brought in line with the default
//! config (keeping an existing password), then the agent API is served on
//! loopback until Ctrl-C.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use redisbroker_agent::{agent_router, initialize_config, AgentState, ConfKeyCounter, Monit, Resetter};
use redisbroker_core::config::AgentConfig;

pub async fn run_agent(config: AgentConfig) -> anyhow::Result<()> {
    info!(conf = ?config.conf_path, "redis agent starting");

    initialize_config(&config.conf_path, &config.default_conf_path).with_context(|| {
        format!(
            "initializing {} from {}",
            config.conf_path.display(),
            config.default_conf_path.display()
        )
    })?;

    let monit = Arc::new(Monit::new(&config.monit_executable_path));
    let resetter = Resetter::new(
        monit,
        &config.redis_process_name,
        &config.default_conf_path,
        &config.conf_path,
        &config.redis_data_directory,
    );
    let state = AgentState {
        conf_path: config.conf_path.clone(),
        resetter: Arc::new(resetter),
        key_counter: Arc::new(ConfKeyCounter::new(&config.conf_path)),
    };

    let router = agent_router(state, Arc::new(config.auth.clone()));
    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "agent API listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(crate::shutdown_signal())
        .await?;

    info!("redis agent stopped");
    Ok(())
}
