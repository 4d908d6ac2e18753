//! Driver for the monit CLI.
//!
//! Only `monit summary`, `monit start <name>` and `monit stop <name>` are
//! used. Waiting for a target status polls the summary.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::{MonitError, MonitResult};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const WAIT_TIMEOUT: Duration = Duration::from_secs(15);

/// Target name matching every process in the summary.
pub const ALL_PROCESSES: &str = "all";

/// Process states reported by `monit summary`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MonitStatus {
    Running,
    NotMonitored,
    NotMonitoredStartPending,
    Initializing,
    DoesNotExist,
    NotMonitoredStopPending,
    RunningRestartPending,
}

impl MonitStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MonitStatus::Running => "running",
            MonitStatus::NotMonitored => "not monitored",
            MonitStatus::NotMonitoredStartPending => "not monitored - start pending",
            MonitStatus::Initializing => "initializing",
            MonitStatus::DoesNotExist => "Does not exist",
            MonitStatus::NotMonitoredStopPending => "not monitored - stop pending",
            MonitStatus::RunningRestartPending => "running - restart pending",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        [
            MonitStatus::Running,
            MonitStatus::NotMonitored,
            MonitStatus::NotMonitoredStartPending,
            MonitStatus::Initializing,
            MonitStatus::DoesNotExist,
            MonitStatus::NotMonitoredStopPending,
            MonitStatus::RunningRestartPending,
        ]
        .into_iter()
        .find(|status| status.as_str() == raw)
    }
}

impl fmt::Display for MonitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse `monit summary` output into process name → status.
///
/// Lines that are not `Process '<name>' <status>` with a known status are
/// skipped.
pub fn parse_summary(output: &str) -> MonitResult<HashMap<String, MonitStatus>> {
    let process_re = Regex::new(r"^\s*Process\s+'([^']+)'\s+(.+?)\s*$")?;
    Ok(output
        .lines()
        .filter_map(|line| {
            let caps = process_re.captures(line)?;
            let status = MonitStatus::parse(&caps[2])?;
            Some((caps[1].to_string(), status))
        })
        .collect())
}

/// Start/stop of supervised processes, as needed by the resetter.
#[async_trait]
pub trait ProcessSupervisor: Send + Sync {
    async fn start_and_wait(&self, name: &str) -> MonitResult<()>;

    async fn stop_and_wait(&self, name: &str) -> MonitResult<()>;
}

/// The monit CLI.
#[derive(Debug, Clone)]
pub struct Monit {
    executable: PathBuf,
    poll_interval: Duration,
    timeout: Duration,
}

impl Monit {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            poll_interval: POLL_INTERVAL,
            timeout: WAIT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn get_summary(&self) -> MonitResult<HashMap<String, MonitStatus>> {
        let output = self.run(&["summary"]).await?;
        parse_summary(&output)
    }

    pub async fn start(&self, name: &str) -> MonitResult<()> {
        self.run(&["start", name]).await.map(|_| ())
    }

    pub async fn stop(&self, name: &str) -> MonitResult<()> {
        self.run(&["stop", name]).await.map(|_| ())
    }

    /// Poll the summary until `name` (or every process, for `all`) reports
    /// `target`.
    pub async fn wait_for_status(&self, name: &str, target: MonitStatus) -> MonitResult<()> {
        let deadline = Instant::now() + self.timeout;
        loop {
            let summary = self.get_summary().await?;
            if status_reached(&summary, name, target) {
                debug!(process = %name, status = %target, "monit status reached");
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(MonitError::Timeout {
                    process: name.to_string(),
                    status: target.to_string(),
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Run monit and return its combined output; nonzero exit is an error
    /// carrying that output.
    async fn run(&self, args: &[&str]) -> MonitResult<String> {
        let output = Command::new(&self.executable)
            .args(args)
            .output()
            .await
            .map_err(MonitError::Exec)?;
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            return Err(MonitError::Command {
                command: args.join(" "),
                output: combined,
            });
        }
        Ok(combined)
    }
}

fn status_reached(summary: &HashMap<String, MonitStatus>, name: &str, target: MonitStatus) -> bool {
    if name == ALL_PROCESSES {
        return !summary.is_empty() && summary.values().all(|s| *s == target);
    }
    summary.get(name) == Some(&target)
}

#[async_trait]
impl ProcessSupervisor for Monit {
    async fn start_and_wait(&self, name: &str) -> MonitResult<()> {
        self.start(name).await?;
        self.wait_for_status(name, MonitStatus::Running).await?;
        info!(process = %name, "started via monit");
        Ok(())
    }

    async fn stop_and_wait(&self, name: &str) -> MonitResult<()> {
        self.stop(name).await?;
        self.wait_for_status(name, MonitStatus::NotMonitored).await?;
        info!(process = %name, "stopped via monit");
        Ok(())
    }
}
