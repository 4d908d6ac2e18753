//! Shared-plan repository: one redis process per instance on this host.
//!
//! On-disk layout per instance:
//!
//! ```text
//! <data>/<id>/redis.conf
//! <data>/<id>/db/          dump.rdb, appendonly.aof
//! <data>/<id>/lock         present while the supervisor must keep away
//! <log>/<id>/redis-server.log
//! <pid>/<id>.pid
//! ```

use std::collections::HashSet;
use std::ffi::OsStr;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::{debug, info, warn};

use redisbroker_core::config::RedisSection;
use redisbroker_core::{generate_password, Instance, RedisConf};
use redisbroker_process::{InstancePaths, ProcessController, ProcessError};

use crate::error::{RepoError, RepoResult};
use crate::{InstanceBinder, InstanceCreator};

const CONF_FILE: &str = "redis.conf";
const DB_DIR: &str = "db";
const LOCK_FILE: &str = "lock";
const LOG_FILE: &str = "redis-server.log";
const PORT_ATTEMPTS: usize = 64;

/// Settings of the shared plan.
#[derive(Debug, Clone)]
pub struct LocalSettings {
    /// Host handed out in credentials.
    pub host: String,
    pub instance_limit: usize,
    pub default_conf_path: PathBuf,
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub pid_dir: PathBuf,
    pub start_timeout: Duration,
}

impl LocalSettings {
    pub fn from_config(redis: &RedisSection) -> Self {
        Self {
            host: redis.host.clone(),
            instance_limit: redis.service_instance_limit,
            default_conf_path: redis.default_config_path.clone(),
            data_dir: redis.instance_data_directory.clone(),
            log_dir: redis.instance_log_directory.clone(),
            pid_dir: redis.pidfile_directory.clone(),
            start_timeout: Duration::from_secs(redis.start_redis_timeout),
        }
    }
}

pub struct LocalRepository {
    settings: LocalSettings,
    controller: Arc<dyn ProcessController>,
    mutex: RwLock<()>,
}

impl LocalRepository {
    pub fn new(settings: LocalSettings, controller: Arc<dyn ProcessController>) -> Self {
        Self {
            settings,
            controller,
            mutex: RwLock::new(()),
        }
    }

    pub fn settings(&self) -> &LocalSettings {
        &self.settings
    }

    pub fn instance_dir(&self, id: &str) -> PathBuf {
        self.settings.data_dir.join(id)
    }

    pub fn paths(&self, id: &str) -> InstancePaths {
        let dir = self.instance_dir(id);
        InstancePaths {
            conf: dir.join(CONF_FILE),
            data_dir: dir.join(DB_DIR),
            pid: self.settings.pid_dir.join(format!("{id}.pid")),
            log: self.settings.log_dir.join(id).join(LOG_FILE),
        }
    }

    /// Shared hold on the repository; mutations wait until it is released.
    pub async fn read_guard(&self) -> RwLockReadGuard<'_, ()> {
        self.mutex.read().await
    }

    pub async fn create(&self, id: &str) -> RepoResult<()> {
        if !is_valid_id(id) {
            return Err(RepoError::InvalidId(id.to_string()));
        }
        let _guard = self.mutex.write().await;

        if self.instance_dir(id).exists() {
            return Err(RepoError::AlreadyExists(id.to_string()));
        }
        let existing = self.load_all()?;
        if existing.len() >= self.settings.instance_limit {
            return Err(RepoError::LimitMet);
        }
        // Ports of instances whose redis is down stay reserved for their restart.
        let taken: HashSet<u16> = existing.iter().map(|i| i.port).collect();

        let instance = Instance {
            id: id.to_string(),
            host: self.settings.host.clone(),
            port: free_port(&taken)?,
            password: generate_password(),
        };
        let paths = self.paths(id);

        if let Err(e) = self.provision(&instance, &paths).await {
            warn!(instance_id = %id, error = %e, "provisioning failed; cleaning up");
            if let Err(kill_err) = self.controller.kill(&paths.pid).await {
                warn!(instance_id = %id, error = %kill_err, "failed to kill redis during cleanup");
            }
            self.remove_instance_dirs(id);
            return Err(e);
        }

        info!(instance_id = %id, port = instance.port, "shared instance created");
        Ok(())
    }

    async fn provision(&self, instance: &Instance, paths: &InstancePaths) -> RepoResult<()> {
        fs::create_dir_all(&paths.data_dir).map_err(RepoError::fs(&paths.data_dir))?;
        let log_dir = self.settings.log_dir.join(&instance.id);
        fs::create_dir_all(&log_dir).map_err(RepoError::fs(&log_dir))?;
        fs::create_dir_all(&self.settings.pid_dir).map_err(RepoError::fs(&self.settings.pid_dir))?;

        let mut conf = RedisConf::load(&self.settings.default_conf_path)?;
        conf.append("syslog-enabled", "yes");
        conf.append("syslog-ident", format!("redis-server-{}", instance.id));
        conf.append("syslog-facility", "local0");
        conf.set("port", instance.port.to_string());
        conf.set("requirepass", instance.password.clone());
        conf.save(&paths.conf)?;

        self.lock(&instance.id)?;
        self.controller
            .start_and_wait_until_ready(instance, paths, self.settings.start_timeout)
            .await
            .map_err(|e| match e {
                ProcessError::Timeout { .. } => RepoError::StartTimeout {
                    instance_id: instance.id.clone(),
                    source: e,
                },
                other => RepoError::Process(other),
            })?;
        self.unlock(&instance.id)
    }

    pub async fn destroy(&self, id: &str) -> RepoResult<()> {
        if !is_valid_id(id) {
            return Err(RepoError::DoesNotExist(id.to_string()));
        }
        let _guard = self.mutex.write().await;

        if !self.instance_dir(id).exists() {
            return Err(RepoError::DoesNotExist(id.to_string()));
        }
        self.lock(id)?;
        self.controller.kill(&self.paths(id).pid).await?;

        let dir = self.instance_dir(id);
        fs::remove_dir_all(&dir).map_err(RepoError::fs(&dir))?;
        let log_dir = self.settings.log_dir.join(id);
        match fs::remove_dir_all(&log_dir) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                return Err(RepoError::Filesystem {
                    path: log_dir,
                    source: e,
                });
            }
            _ => {}
        }

        info!(instance_id = %id, "shared instance destroyed");
        Ok(())
    }

    pub async fn instance_exists(&self, id: &str) -> RepoResult<bool> {
        Ok(is_valid_id(id) && self.instance_dir(id).is_dir())
    }

    pub async fn find_by_id(&self, id: &str) -> RepoResult<Option<Instance>> {
        if !is_valid_id(id) {
            return Ok(None);
        }
        let _guard = self.mutex.read().await;
        if !self.instance_dir(id).is_dir() {
            return Ok(None);
        }
        self.load_instance(id).map(Some)
    }

    /// Every instance on disk, ordered by id. Fails on the first unreadable one.
    pub async fn all_instances(&self) -> RepoResult<Vec<Instance>> {
        let _guard = self.mutex.read().await;
        self.load_all()
    }

    pub async fn instance_count(&self) -> RepoResult<usize> {
        Ok(self.all_instances().await?.len())
    }

    /// Create the `lock` sentinel for `id`.
    pub fn lock(&self, id: &str) -> RepoResult<()> {
        if !is_valid_id(id) {
            return Err(RepoError::DoesNotExist(id.to_string()));
        }
        let path = self.instance_dir(id).join(LOCK_FILE);
        fs::write(&path, b"").map_err(RepoError::fs(&path))?;
        debug!(instance_id = %id, "instance locked");
        Ok(())
    }

    /// Remove the `lock` sentinel for `id`, if any.
    pub fn unlock(&self, id: &str) -> RepoResult<()> {
        if !is_valid_id(id) {
            return Err(RepoError::DoesNotExist(id.to_string()));
        }
        let path = self.instance_dir(id).join(LOCK_FILE);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(instance_id = %id, "instance unlocked");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(RepoError::Filesystem { path, source }),
        }
    }

    pub fn is_locked(&self, id: &str) -> bool {
        is_valid_id(id) && self.instance_dir(id).join(LOCK_FILE).exists()
    }

    fn load_all(&self) -> RepoResult<Vec<Instance>> {
        let root = &self.settings.data_dir;
        let entries = match fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(RepoError::Filesystem {
                    path: root.clone(),
                    source,
                });
            }
        };

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(RepoError::fs(root))?;
            if entry.path().is_dir() {
                ids.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        ids.sort();

        ids.iter().map(|id| self.load_instance(id)).collect()
    }

    fn load_instance(&self, id: &str) -> RepoResult<Instance> {
        let conf = RedisConf::load(&self.instance_dir(id).join(CONF_FILE))?;
        Ok(Instance {
            id: id.to_string(),
            host: self.settings.host.clone(),
            port: conf.port()?,
            password: conf.password(),
        })
    }

    fn remove_instance_dirs(&self, id: &str) {
        for dir in [self.instance_dir(id), self.settings.log_dir.join(id)] {
            if let Err(e) = remove_dir_if_present(&dir) {
                warn!(path = ?dir, error = %e, "failed to remove instance directory");
            }
        }
    }
}

fn remove_dir_if_present(path: &Path) -> std::io::Result<()> {
    match fs::remove_dir_all(path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Ids name a directory under the data root: exactly one normal path
/// component, so never empty, `.`, `..` or anything with a separator.
fn is_valid_id(id: &str) -> bool {
    let mut components = Path::new(id).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(name)), None) => name == OsStr::new(id),
        _ => false,
    }
}

/// A TCP port nobody is listening on right now and that is not in `taken`.
fn free_port(taken: &HashSet<u16>) -> RepoResult<u16> {
    // Rejected listeners stay bound so the next bind gets a different port.
    let mut held = Vec::new();
    for _ in 0..PORT_ATTEMPTS {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").map_err(RepoError::fs("127.0.0.1:0"))?;
        let port = listener
            .local_addr()
            .map_err(RepoError::fs("127.0.0.1:0"))?
            .port();
        if !taken.contains(&port) {
            return Ok(port);
        }
        held.push(listener);
    }
    Err(RepoError::NoFreePort(PORT_ATTEMPTS))
}

#[async_trait]
impl InstanceCreator for LocalRepository {
    async fn create(&self, id: &str) -> RepoResult<()> {
        LocalRepository::create(self, id).await
    }

    async fn destroy(&self, id: &str) -> RepoResult<()> {
        LocalRepository::destroy(self, id).await
    }

    async fn instance_exists(&self, id: &str) -> RepoResult<bool> {
        LocalRepository::instance_exists(self, id).await
    }
}

#[async_trait]
impl InstanceBinder for LocalRepository {
    /// Shared instances do not track bindings; the credentials are the
    /// instance's own.
    async fn bind(&self, id: &str, _binding_id: &str) -> RepoResult<Instance> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| RepoError::DoesNotExist(id.to_string()))
    }

    /// Always succeeds while the instance exists, including for a binding
    /// that was already removed: there is no binding ledger to consult.
    async fn unbind(&self, id: &str, _binding_id: &str) -> RepoResult<()> {
        if !LocalRepository::instance_exists(self, id).await? {
            return Err(RepoError::DoesNotExist(id.to_string()));
        }
        Ok(())
    }

    async fn instance_exists(&self, id: &str) -> RepoResult<bool> {
        LocalRepository::instance_exists(self, id).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    use redisbroker_process::ProcessResult;

    /// Records calls; "starts" an instance by writing its pid file.
    #[derive(Default)]
    pub(crate) struct FakeController {
        pub started: Mutex<Vec<String>>,
        pub killed: Mutex<Vec<PathBuf>>,
        pub fail_with_timeout: bool,
        pub alive: Mutex<bool>,
    }

    #[async_trait]
    impl ProcessController for FakeController {
        async fn start_and_wait_until_ready(
            &self,
            instance: &Instance,
            paths: &InstancePaths,
            timeout: Duration,
        ) -> ProcessResult<()> {
            self.started.lock().unwrap().push(instance.id.clone());
            if self.fail_with_timeout {
                return Err(ProcessError::Timeout {
                    address: instance.address(),
                    timeout,
                });
            }
            fs::write(&paths.pid, "12345\n").unwrap();
            *self.alive.lock().unwrap() = true;
            Ok(())
        }

        async fn kill(&self, pid_path: &Path) -> ProcessResult<()> {
            self.killed.lock().unwrap().push(pid_path.to_path_buf());
            let _ = fs::remove_file(pid_path);
            *self.alive.lock().unwrap() = false;
            Ok(())
        }

        fn is_alive(&self, pid_path: &Path) -> bool {
            pid_path.exists() && *self.alive.lock().unwrap()
        }
    }

    pub(crate) fn settings(root: &Path, limit: usize) -> LocalSettings {
        let default_conf = root.join("redis.conf.default");
        fs::write(&default_conf, "daemonize no\nappendonly no\n").unwrap();
        LocalSettings {
            host: "127.0.0.1".to_string(),
            instance_limit: limit,
            default_conf_path: default_conf,
            data_dir: root.join("data"),
            log_dir: root.join("log"),
            pid_dir: root.join("pid"),
            start_timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn create_lays_out_instance() {
        let dir = tempfile::tempdir().unwrap();
        let controller = Arc::new(FakeController::default());
        let repo = LocalRepository::new(settings(dir.path(), 5), controller.clone());

        repo.create("a").await.unwrap();

        let paths = repo.paths("a");
        let conf = RedisConf::load(&paths.conf).unwrap();
        assert_eq!(conf.get("daemonize"), Some("no"));
        assert_eq!(conf.get("syslog-enabled"), Some("yes"));
        assert_eq!(conf.get("syslog-ident"), Some("redis-server-a"));
        assert_eq!(conf.get("syslog-facility"), Some("local0"));
        assert!(conf.port().unwrap() > 0);
        assert!(!conf.password().is_empty());

        assert!(paths.data_dir.is_dir());
        assert!(dir.path().join("log").join("a").is_dir());
        assert!(!repo.is_locked("a"));
        assert_eq!(*controller.started.lock().unwrap(), vec!["a"]);

        let found = repo.find_by_id("a").await.unwrap().unwrap();
        assert_eq!(found.port, conf.port().unwrap());
        assert_eq!(found.password, conf.password());
        assert_eq!(found.host, "127.0.0.1");
    }

    #[tokio::test]
    async fn passwords_and_ports_differ_between_instances() {
        let dir = tempfile::tempdir().unwrap();
        let repo = LocalRepository::new(settings(dir.path(), 5), Arc::new(FakeController::default()));
        repo.create("a").await.unwrap();
        repo.create("b").await.unwrap();

        let all = repo.all_instances().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, "a");
        assert_ne!(all[0].password, all[1].password);
        assert_eq!(repo.instance_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn duplicate_and_limit_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let repo = LocalRepository::new(settings(dir.path(), 1), Arc::new(FakeController::default()));
        repo.create("a").await.unwrap();

        assert!(matches!(repo.create("a").await, Err(RepoError::AlreadyExists(_))));
        assert!(matches!(repo.create("b").await, Err(RepoError::LimitMet)));
        assert!(!repo.instance_dir("b").exists());
    }

    #[tokio::test]
    async fn start_timeout_removes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let controller = Arc::new(FakeController {
            fail_with_timeout: true,
            ..Default::default()
        });
        let repo = LocalRepository::new(settings(dir.path(), 5), controller.clone());

        let err = repo.create("a").await.unwrap_err();
        assert!(matches!(err, RepoError::StartTimeout { .. }));
        assert!(!repo.instance_dir("a").exists());
        assert!(!dir.path().join("log").join("a").exists());
        assert_eq!(controller.killed.lock().unwrap().len(), 1);
        assert_eq!(repo.instance_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn destroy_kills_and_removes() {
        let dir = tempfile::tempdir().unwrap();
        let controller = Arc::new(FakeController::default());
        let repo = LocalRepository::new(settings(dir.path(), 5), controller.clone());
        repo.create("a").await.unwrap();

        repo.destroy("a").await.unwrap();

        assert_eq!(*controller.killed.lock().unwrap(), vec![repo.paths("a").pid]);
        assert!(!repo.instance_dir("a").exists());
        assert!(!dir.path().join("log").join("a").exists());
        assert!(matches!(repo.destroy("a").await, Err(RepoError::DoesNotExist(_))));
    }

    #[tokio::test]
    async fn bind_returns_instance_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let repo = LocalRepository::new(settings(dir.path(), 5), Arc::new(FakeController::default()));
        repo.create("a").await.unwrap();

        let creds = InstanceBinder::bind(&repo, "a", "b1").await.unwrap();
        assert_eq!(Some(creds), repo.find_by_id("a").await.unwrap());

        InstanceBinder::unbind(&repo, "a", "b1").await.unwrap();
        // No binding ledger: a repeat unbind still succeeds.
        InstanceBinder::unbind(&repo, "a", "b1").await.unwrap();

        assert!(matches!(
            InstanceBinder::bind(&repo, "missing", "b1").await,
            Err(RepoError::DoesNotExist(_))
        ));
        assert!(matches!(
            InstanceBinder::unbind(&repo, "missing", "b1").await,
            Err(RepoError::DoesNotExist(_))
        ));
    }

    #[tokio::test]
    async fn lock_sentinel_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let repo = LocalRepository::new(settings(dir.path(), 5), Arc::new(FakeController::default()));
        repo.create("a").await.unwrap();

        repo.lock("a").unwrap();
        assert!(repo.is_locked("a"));
        repo.unlock("a").unwrap();
        repo.unlock("a").unwrap();
        assert!(!repo.is_locked("a"));
    }

    #[test]
    fn ids_must_be_a_single_directory_name() {
        for id in ["a", "0f1e-2d3c", "x.y", "..a"] {
            assert!(is_valid_id(id), "{id} should be accepted");
        }
        for id in ["", ".", "..", "../x", "a/b", "a/", "a/.", "/abs", "./a"] {
            assert!(!is_valid_id(id), "{id} should be rejected");
        }
    }

    #[tokio::test]
    async fn path_like_ids_never_touch_the_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let controller = Arc::new(FakeController::default());
        let repo = LocalRepository::new(settings(dir.path(), 5), controller.clone());
        repo.create("a").await.unwrap();

        for id in [".", "..", ""] {
            assert!(!repo.instance_exists(id).await.unwrap());
            assert_eq!(repo.find_by_id(id).await.unwrap(), None);
            assert!(matches!(repo.destroy(id).await, Err(RepoError::DoesNotExist(_))));
            assert!(matches!(repo.lock(id), Err(RepoError::DoesNotExist(_))));
            assert!(matches!(repo.unlock(id), Err(RepoError::DoesNotExist(_))));
            assert!(matches!(
                InstanceBinder::unbind(&repo, id, "b1").await,
                Err(RepoError::DoesNotExist(_))
            ));
        }
        assert!(matches!(repo.create("../escaped").await, Err(RepoError::InvalidId(_))));
        assert!(matches!(repo.create("..").await, Err(RepoError::InvalidId(_))));

        assert!(repo.paths("a").conf.exists());
        assert!(!dir.path().join("escaped").exists());
        assert!(!dir.path().join("log").join("..").join("escaped").exists());
        assert!(controller.killed.lock().unwrap().is_empty());
        assert_eq!(repo.instance_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn ports_of_stopped_instances_are_not_reused() {
        let dir = tempfile::tempdir().unwrap();
        let controller = Arc::new(FakeController::default());
        let repo = LocalRepository::new(settings(dir.path(), 20), controller.clone());
        repo.create("a").await.unwrap();
        let port = repo.find_by_id("a").await.unwrap().unwrap().port;
        *controller.alive.lock().unwrap() = false;

        for i in 0..10 {
            repo.create(&format!("n{i}")).await.unwrap();
        }
        let ports: HashSet<u16> = repo.all_instances().await.unwrap().iter().map(|i| i.port).collect();
        assert_eq!(ports.len(), 11);
        assert!(ports.contains(&port));
    }

    #[test]
    fn free_port_skips_taken_ports() {
        let first = free_port(&HashSet::new()).unwrap();
        let taken = HashSet::from([first]);
        for _ in 0..10 {
            assert_ne!(free_port(&taken).unwrap(), first);
        }
    }

    #[tokio::test]
    async fn unreadable_instance_fails_enumeration() {
        let dir = tempfile::tempdir().unwrap();
        let repo = LocalRepository::new(settings(dir.path(), 5), Arc::new(FakeController::default()));
        repo.create("a").await.unwrap();
        fs::create_dir_all(repo.instance_dir("broken")).unwrap();

        assert!(repo.all_instances().await.is_err());
    }
}
