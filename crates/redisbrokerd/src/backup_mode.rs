//! Backup mode: snapshot every redis under the config root, then exit.

use std::sync::Arc;

use tracing::{error, info};

use redisbroker_backup::{
    AwsCliBucket, BackupError, BrokerLocator, ConnectionFactory, IdLocator, Orchestrator, SharedLocator,
};
use redisbroker_core::config::BackupConfig;

/// Fails when any instance could not be backed up.
pub async fn run_backup(config: BackupConfig) -> anyhow::Result<()> {
    let locator: Arc<dyn IdLocator> = if config.dedicated {
        Arc::new(
            BrokerLocator::new(
                config.broker_address.clone(),
                config.broker_credentials.clone(),
                config.node_ip.clone(),
            )
            .map_err(BackupError::Client)?,
        )
    } else {
        Arc::new(SharedLocator)
    };
    let bucket = Arc::new(AwsCliBucket::new(&config.aws_cli_path, &config.s3));
    let orchestrator = Orchestrator::new(&config, locator, bucket, Arc::new(ConnectionFactory));

    let reports = orchestrator.run().await?;
    let failed: Vec<_> = reports.iter().filter(|r| !r.succeeded()).collect();
    for report in &failed {
        error!(
            instance_id = %report.instance_id,
            node_ip = %report.node_ip,
            config = ?report.redis_config_path,
            error = report.error.as_deref().unwrap_or_default(),
            "backup failed"
        );
    }
    if !failed.is_empty() {
        anyhow::bail!("{} of {} instance backups failed", failed.len(), reports.len());
    }

    info!(instances = reports.len(), "all backups succeeded");
    Ok(())
}
