//! Spawning and killing redis-server processes.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use redisbroker_core::Instance;

use crate::availability::wait_until_connectable;
use crate::error::{ProcessError, ProcessResult};

const KILL_GRACE: Duration = Duration::from_secs(5);
const KILL_POLL: Duration = Duration::from_millis(100);

/// Filesystem locations of one shared instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstancePaths {
    pub conf: PathBuf,
    pub data_dir: PathBuf,
    pub pid: PathBuf,
    pub log: PathBuf,
}

/// Lifecycle control over redis processes, keyed by PID file.
#[async_trait]
pub trait ProcessController: Send + Sync {
    /// Spawn redis for `instance` and wait until its port accepts connections.
    async fn start_and_wait_until_ready(
        &self,
        instance: &Instance,
        paths: &InstancePaths,
        timeout: Duration,
    ) -> ProcessResult<()>;

    /// Terminate the process named by the PID file. A missing PID file is
    /// treated as already stopped.
    async fn kill(&self, pid_path: &Path) -> ProcessResult<()>;

    /// Whether the process named by the PID file is running.
    fn is_alive(&self, pid_path: &Path) -> bool;
}

/// Runs the real `redis-server` binary.
#[derive(Debug, Clone)]
pub struct RedisProcessController {
    redis_server: PathBuf,
    kill_grace: Duration,
}

impl RedisProcessController {
    pub fn new(redis_server: impl Into<PathBuf>) -> Self {
        Self {
            redis_server: redis_server.into(),
            kill_grace: KILL_GRACE,
        }
    }

    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    /// Command line for a shared instance.
    pub fn build_args(instance: &Instance, paths: &InstancePaths) -> Vec<String> {
        vec![
            paths.conf.display().to_string(),
            "--pidfile".to_string(),
            paths.pid.display().to_string(),
            "--port".to_string(),
            instance.port.to_string(),
            "--dir".to_string(),
            paths.data_dir.display().to_string(),
            "--requirepass".to_string(),
            instance.password.clone(),
            "--logfile".to_string(),
            paths.log.display().to_string(),
        ]
    }

    /// Spawn with a caller-supplied argument list and wait for readiness.
    pub async fn start_with_args_and_wait(
        &self,
        instance: &Instance,
        args: &[String],
        timeout: Duration,
    ) -> ProcessResult<()> {
        self.spawn(args)?;
        wait_until_connectable(&instance.address(), timeout).await?;
        info!(instance_id = %instance.id, address = %instance.address(), "redis ready");
        Ok(())
    }

    fn spawn(&self, args: &[String]) -> ProcessResult<()> {
        let child = Command::new(&self.redis_server)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            // Own process group: redis outlives a broker restart.
            .process_group(0)
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                program: self.redis_server.display().to_string(),
                source,
            })?;
        debug!(pid = ?child.id(), program = %self.redis_server.display(), "redis-server spawned");
        // Dropping the handle detaches the child; tokio reaps it on exit.
        drop(child);
        Ok(())
    }
}

#[async_trait]
impl ProcessController for RedisProcessController {
    async fn start_and_wait_until_ready(
        &self,
        instance: &Instance,
        paths: &InstancePaths,
        timeout: Duration,
    ) -> ProcessResult<()> {
        let args = Self::build_args(instance, paths);
        self.start_with_args_and_wait(instance, &args, timeout).await
    }

    async fn kill(&self, pid_path: &Path) -> ProcessResult<()> {
        let Some(pid) = read_pid(pid_path)? else {
            debug!(?pid_path, "no pid file; nothing to kill");
            return Ok(());
        };

        signal(pid, libc::SIGTERM)?;

        let deadline = Instant::now() + self.kill_grace;
        while Instant::now() < deadline {
            if !pid_alive(pid) {
                break;
            }
            tokio::time::sleep(KILL_POLL).await;
        }

        if pid_alive(pid) {
            warn!(pid, "process ignored SIGTERM; sending SIGKILL");
            signal(pid, libc::SIGKILL)?;
        }

        match std::fs::remove_file(pid_path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                warn!(?pid_path, error = %e, "failed to remove pid file");
            }
            _ => {}
        }
        info!(pid, "redis process stopped");
        Ok(())
    }

    fn is_alive(&self, pid_path: &Path) -> bool {
        match read_pid(pid_path) {
            Ok(Some(pid)) => pid_alive(pid),
            _ => false,
        }
    }
}

/// Read a PID file. `Ok(None)` when the file does not exist.
fn read_pid(path: &Path) -> ProcessResult<Option<i32>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ProcessError::PidFile {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    content
        .trim()
        .parse::<i32>()
        .ok()
        .filter(|pid| *pid > 0)
        .map(Some)
        .ok_or_else(|| ProcessError::InvalidPid {
            path: path.to_path_buf(),
            content,
        })
}

fn pid_alive(pid: i32) -> bool {
    // SAFETY: signal 0 performs only the existence and permission check.
    let rc = unsafe { libc::kill(pid, 0) };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

fn signal(pid: i32, sig: libc::c_int) -> ProcessResult<()> {
    // SAFETY: plain kill(2) on a pid read from a pid file.
    let rc = unsafe { libc::kill(pid, sig) };
    if rc == 0 {
        return Ok(());
    }
    let err = std::io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        return Ok(());
    }
    Err(ProcessError::Signal { pid, source: err })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_instance() -> Instance {
        Instance {
            id: "inst-1".to_string(),
            host: "127.0.0.1".to_string(),
            port: 6400,
            password: "pw".to_string(),
        }
    }

    fn test_paths(root: &Path) -> InstancePaths {
        InstancePaths {
            conf: root.join("redis.conf"),
            data_dir: root.join("db"),
            pid: root.join("redis-server.pid"),
            log: root.join("redis-server.log"),
        }
    }

    #[test]
    fn args_name_every_instance_path() {
        let paths = test_paths(Path::new("/data/inst-1"));
        let args = RedisProcessController::build_args(&test_instance(), &paths);
        assert_eq!(args[0], "/data/inst-1/redis.conf");
        assert_eq!(
            &args[1..],
            &[
                "--pidfile",
                "/data/inst-1/redis-server.pid",
                "--port",
                "6400",
                "--dir",
                "/data/inst-1/db",
                "--requirepass",
                "pw",
                "--logfile",
                "/data/inst-1/redis-server.log",
            ]
        );
    }

    #[tokio::test]
    async fn spawn_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let controller = RedisProcessController::new(dir.path().join("no-such-redis"));
        let err = controller
            .start_and_wait_until_ready(&test_instance(), &test_paths(dir.path()), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { .. }));
    }

    #[tokio::test]
    async fn kill_without_pid_file_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let controller = RedisProcessController::new("redis-server");
        controller.kill(&dir.path().join("missing.pid")).await.unwrap();
        assert!(!controller.is_alive(&dir.path().join("missing.pid")));
    }

    #[test]
    fn garbage_pid_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.pid");
        std::fs::write(&path, "not-a-pid\n").unwrap();
        assert!(matches!(read_pid(&path), Err(ProcessError::InvalidPid { .. })));

        let controller = RedisProcessController::new("redis-server");
        assert!(!controller.is_alive(&path));
    }

    #[tokio::test]
    async fn kill_terminates_process_and_removes_pid_file() {
        let dir = tempfile::tempdir().unwrap();
        let pid_path = dir.path().join("sleep.pid");

        let mut child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        std::fs::write(&pid_path, format!("{}\n", child.id())).unwrap();
        // Reap in the background so the pid disappears once signalled.
        let waiter = std::thread::spawn(move || child.wait());

        let controller = RedisProcessController::new("redis-server")
            .with_kill_grace(Duration::from_secs(2));
        assert!(controller.is_alive(&pid_path));

        controller.kill(&pid_path).await.unwrap();

        let status = waiter.join().unwrap().unwrap();
        assert!(!status.success());
        assert!(!pid_path.exists());
        assert!(!controller.is_alive(&pid_path));
    }
}
