//! redisbrokerd: the Redis service broker daemon.
//!
//! One binary, three roles:
//! - `broker`: Open Service Broker API for the shared and dedicated plans,
//!   with the shared-plan supervisor and the dedicated-pool consistency check
//! - `agent`: per-node daemon on dedicated hosts (credentials, reset, keycount)
//! - `backup`: one-shot snapshot of every redis on this host to S3
//!
//! # Usage
//!
//! ```text
//! redisbrokerd broker --config /var/vcap/jobs/broker/config/broker.yml
//! BACKUP_CONFIG_PATH=/etc/redis/backup.yml redisbrokerd backup
//! ```

mod agent_mode;
mod backup_mode;
mod broker_mode;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use redisbroker_core::config::{AgentConfig, BackupConfig, BrokerConfig};

const DEFAULT_LOG_FILTER: &str = "info,redisbrokerd=debug,redisbroker=debug";

#[derive(Parser)]
#[command(name = "redisbrokerd", about = "Redis service broker daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the service broker API.
    Broker {
        /// Broker config file.
        #[arg(long, env = "BROKER_CONFIG_PATH")]
        config: PathBuf,
    },

    /// Run the agent on a dedicated node.
    Agent {
        /// Agent config file.
        #[arg(long, env = "AGENT_CONFIG_PATH")]
        config: PathBuf,
    },

    /// Back up every redis instance on this host and exit.
    Backup {
        /// Backup config file.
        #[arg(long, env = "BACKUP_CONFIG_PATH")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Broker { config } => {
            let config = BrokerConfig::from_file(&config)
                .with_context(|| format!("loading broker config {}", config.display()))?;
            broker_mode::run_broker(config).await
        }
        Command::Agent { config } => {
            let config = AgentConfig::from_file(&config)
                .with_context(|| format!("loading agent config {}", config.display()))?;
            agent_mode::run_agent(config).await
        }
        Command::Backup { config } => {
            let config = BackupConfig::from_file(&config)
                .with_context(|| format!("loading backup config {}", config.display()))?;
            backup_mode::run_backup(config).await
        }
    }
}

/// Resolves once Ctrl-C is received.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c; shutting down");
    }
    tracing::info!("shutdown signal received");
}
