//! TCP availability checks.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{ProcessError, ProcessResult};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Whether a TCP connection to `address` can be opened within `timeout`.
pub async fn is_connectable(address: &str, timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(timeout, TcpStream::connect(address)).await,
        Ok(Ok(_))
    )
}

/// Poll `address` until it accepts a connection or `timeout` elapses.
pub async fn wait_until_connectable(address: &str, timeout: Duration) -> ProcessResult<()> {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            debug!(%address, ?timeout, "gave up waiting for address");
            return Err(ProcessError::Timeout {
                address: address.to_string(),
                timeout,
            });
        }
        if is_connectable(address, remaining.min(Duration::from_secs(1))).await {
            return Ok(());
        }
        tokio::time::sleep(POLL_INTERVAL.min(remaining)).await;
    }
}
