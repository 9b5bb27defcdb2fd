//! Local daemon supervision configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::{duration_millis, duration_secs};

/// Configuration for starting and supervising local tunnel daemons
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Directory holding the bundled daemon binaries.
    /// Defaults to the directory of the zli executable.
    pub binary_dir: Option<PathBuf>,

    /// Host daemons bind to when the target does not specify one
    pub default_local_host: String,

    /// How long to wait for a daemon to accept TCP connections
    #[serde(with = "duration_secs")]
    pub port_wait: Duration,

    /// Maximum number of readiness probes
    pub readiness_attempts: u32,

    /// Fixed delay between readiness probes
    #[serde(with = "duration_millis")]
    pub readiness_interval: Duration,

    /// How long to wait for another zli invocation to release a plugin
    #[serde(with = "duration_secs")]
    pub lock_timeout: Duration,

    /// Log file handed to daemons via `-logPath`
    pub log_path: PathBuf,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            binary_dir: None,
            default_local_host: "localhost".to_string(),
            port_wait: Duration::from_secs(20),
            readiness_attempts: 120,
            readiness_interval: Duration::from_secs(1),
            lock_timeout: Duration::from_secs(30),
            log_path: super::default_config_dir().join("bastionzero-daemon.log"),
        }
    }
}

impl DaemonConfig {
    /// Directory to look for bundled daemon binaries in
    pub fn binary_dir(&self) -> PathBuf {
        if let Some(dir) = &self.binary_dir {
            return dir.clone();
        }
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."))
    }
}
