//! Persisted per-plugin daemon state
//!
//! Each plugin (kube, db, web) owns one [`DaemonRecord`] inside a single
//! `state.toml` next to the config file. Concurrent zli invocations are
//! serialized in two layers:
//!
//! - a short lock on `state.lock` around every read-modify-write
//!   of the file, so records for different plugins never clobber each other
//! - a long-lived, per-plugin [`PluginLock`] held for a whole start or stop
//!   sequence, so two invocations never race to manage the same daemon

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::error::StateError;
use crate::types::PluginType;

const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(100);
const STATE_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Credentials the kube daemon presents to local clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KubeAuthMaterial {
    /// Path of the localhost TLS certificate
    pub cert_path: PathBuf,
    /// Path of the localhost TLS key
    pub key_path: PathBuf,
    /// Token local clients must send
    pub token: String,
}

/// Everything zli remembers about one plugin's daemon
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonRecord {
    pub local_host: Option<String>,
    pub local_port: Option<u16>,
    /// Pid of the running daemon; cleared on teardown or crash
    pub local_pid: Option<u32>,
    pub target_name: Option<String>,
    pub target_id: Option<String>,
    /// Remote user (kube impersonation user, db/web user)
    pub target_user: Option<String>,
    pub target_groups: Vec<String>,
    /// Groups used when a connect request names none
    pub default_target_groups: Vec<String>,
    pub kube_auth: Option<KubeAuthMaterial>,
}

impl DaemonRecord {
    /// Whether a daemon pid is recorded
    pub fn is_running(&self) -> bool {
        self.local_pid.is_some()
    }

    /// Forget the running daemon but keep connection preferences
    pub fn clear_daemon(&mut self) {
        self.local_pid = None;
    }
}

/// Daemon records for all plugins
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalState {
    pub kube: DaemonRecord,
    pub db: DaemonRecord,
    pub web: DaemonRecord,
}

impl LocalState {
    pub fn record(&self, plugin: PluginType) -> &DaemonRecord {
        match plugin {
            PluginType::Kube => &self.kube,
            PluginType::Db => &self.db,
            PluginType::Web => &self.web,
        }
    }

    pub fn record_mut(&mut self, plugin: PluginType) -> &mut DaemonRecord {
        match plugin {
            PluginType::Kube => &mut self.kube,
            PluginType::Db => &mut self.db,
            PluginType::Web => &mut self.web,
        }
    }
}

/// Exclusive right to manage one plugin's daemon; released on drop
#[derive(Debug)]
pub struct PluginLock {
    plugin: PluginType,
    file: File,
}

impl PluginLock {
    pub fn plugin(&self) -> PluginType {
        self.plugin
    }
}

impl Drop for PluginLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            tracing::warn!(plugin = %self.plugin, "Failed to release plugin lock: {}", e);
        }
    }
}

/// File-backed store for [`LocalState`]
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    /// Store rooted at `dir` (normally the config directory)
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the state file
    pub fn path(&self) -> PathBuf {
        self.dir.join("state.toml")
    }

    fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StateError + '_ {
        move |source| StateError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn open_lock_file(&self, path: &Path) -> Result<File, StateError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(Self::io_error(parent))?;
        }
        OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(Self::io_error(path))
    }

    /// Load the full state; a missing file yields empty records
    pub fn load(&self) -> Result<LocalState, StateError> {
        let path = self.path();
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(toml::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(LocalState::default()),
            Err(e) => Err(Self::io_error(&path)(e)),
        }
    }

    /// Replace the full state on disk
    pub fn save(&self, state: &LocalState) -> Result<(), StateError> {
        let path = self.path();
        std::fs::create_dir_all(&self.dir).map_err(Self::io_error(&self.dir))?;

        let content = toml::to_string_pretty(state)?;
        let tmp = path.with_extension("toml.tmp");
        std::fs::write(&tmp, content).map_err(Self::io_error(&tmp))?;
        std::fs::rename(&tmp, &path).map_err(Self::io_error(&path))?;
        Ok(())
    }

    /// Current record for one plugin
    pub fn record(&self, plugin: PluginType) -> Result<DaemonRecord, StateError> {
        Ok(self.load()?.record(plugin).clone())
    }

    /// Read-modify-write one plugin's record, returning the updated copy
    pub async fn update<F>(&self, plugin: PluginType, f: F) -> Result<DaemonRecord, StateError>
    where
        F: FnOnce(&mut DaemonRecord),
    {
        let lock_path = self.dir.join("state.lock");
        let lock = self.open_lock_file(&lock_path)?;
        self.acquire(&lock, &lock_path, plugin, STATE_LOCK_TIMEOUT)
            .await?;

        let result = self.modify(plugin, f);

        if let Err(e) = lock.unlock() {
            tracing::warn!("Failed to release state lock: {}", e);
        }
        result
    }

    fn modify<F>(&self, plugin: PluginType, f: F) -> Result<DaemonRecord, StateError>
    where
        F: FnOnce(&mut DaemonRecord),
    {
        let mut state = self.load()?;
        f(state.record_mut(plugin));
        self.save(&state)?;
        Ok(state.record(plugin).clone())
    }

    /// Acquire the per-plugin lock, waiting up to `timeout`
    pub async fn lock(
        &self,
        plugin: PluginType,
        timeout: Duration,
    ) -> Result<PluginLock, StateError> {
        let path = self.dir.join("locks").join(format!("{}.lock", plugin));
        let file = self.open_lock_file(&path)?;
        self.acquire(&file, &path, plugin, timeout).await?;
        tracing::debug!(%plugin, "Acquired plugin lock");
        Ok(PluginLock { plugin, file })
    }

    /// Poll for an exclusive lock on `file` without blocking the runtime
    async fn acquire(
        &self,
        file: &File,
        path: &Path,
        plugin: PluginType,
        timeout: Duration,
    ) -> Result<(), StateError> {
        let started = Instant::now();
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(()),
                Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                    if started.elapsed() >= timeout {
                        return Err(StateError::Locked {
                            plugin,
                            waited: started.elapsed(),
                        });
                    }
                    tracing::debug!(%plugin, path = ?path, "Lock is held elsewhere, waiting");
                    tokio::time::sleep(LOCK_RETRY_INTERVAL).await;
                }
                Err(e) => return Err(Self::io_error(path)(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_record() -> DaemonRecord {
        DaemonRecord {
            local_host: Some("localhost".into()),
            local_port: Some(6100),
            local_pid: Some(4242),
            target_name: Some("prod-cluster".into()),
            target_id: Some("9f1c".into()),
            target_user: Some("alice".into()),
            target_groups: vec!["system:masters".into()],
            default_target_groups: vec!["devs".into()],
            kube_auth: Some(KubeAuthMaterial {
                cert_path: PathBuf::from("/tmp/cert.pem"),
                key_path: PathBuf::from("/tmp/key.pem"),
                token: "tok".into(),
            }),
        }
    }

    #[test]
    fn test_missing_state_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path());
        let state = store.load().unwrap();
        assert_eq!(state, LocalState::default());
        assert!(!state.kube.is_running());
    }

    #[tokio::test]
    async fn test_update_persists_only_the_named_plugin() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path().join("nested"));

        let written = store
            .update(PluginType::Kube, |record| *record = sample_record())
            .await
            .unwrap();
        assert_eq!(written, sample_record());

        store
            .update(PluginType::Db, |record| record.local_port = Some(5432))
            .await
            .unwrap();

        let state = store.load().unwrap();
        assert_eq!(state.kube, sample_record());
        assert_eq!(state.db.local_port, Some(5432));
        assert_eq!(state.web, DaemonRecord::default());
    }

    #[tokio::test]
    async fn test_clear_daemon_keeps_preferences() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path());
        store
            .update(PluginType::Kube, |record| *record = sample_record())
            .await
            .unwrap();

        let record = store
            .update(PluginType::Kube, DaemonRecord::clear_daemon)
            .await
            .unwrap();
        assert!(!record.is_running());
        assert_eq!(record.local_port, Some(6100));
        assert_eq!(record.default_target_groups, vec!["devs".to_string()]);
    }

    #[tokio::test]
    async fn test_update_waits_for_state_lock_without_blocking() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path());
        let held = store.open_lock_file(&dir.path().join("state.lock")).unwrap();
        held.lock_exclusive().unwrap();

        // Released by a task on the same runtime, so a blocking wait would hang
        let release = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            held.unlock().unwrap();
        });

        let record = store
            .update(PluginType::Web, |record| record.local_port = Some(8080))
            .await
            .unwrap();
        assert_eq!(record.local_port, Some(8080));
        release.await.unwrap();
    }

    #[test]
    fn test_corrupt_state_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path());
        std::fs::write(store.path(), "[kube\n").unwrap();
        assert!(matches!(store.load(), Err(StateError::Parse(_))));
    }

    #[tokio::test]
    async fn test_plugin_lock_is_exclusive_until_dropped() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path());

        let held = store
            .lock(PluginType::Db, Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(held.plugin(), PluginType::Db);

        let err = store
            .lock(PluginType::Db, Duration::from_millis(250))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StateError::Locked {
                plugin: PluginType::Db,
                ..
            }
        ));

        // Other plugins are independent
        let _web = store
            .lock(PluginType::Web, Duration::from_millis(50))
            .await
            .unwrap();

        drop(held);
        store
            .lock(PluginType::Db, Duration::from_millis(50))
            .await
            .unwrap();
    }
}
