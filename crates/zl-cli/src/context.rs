//! Per-invocation context shared by commands

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use zl_core::config::{resolve_config_path, ZliConfig};
use zl_core::StateStore;
use zl_daemon::{DaemonExecutable, DaemonSession, DaemonSupervisor};

/// Resolved configuration and where it lives
#[derive(Debug, Clone)]
pub struct CliContext {
    pub config_path: PathBuf,
    pub config: ZliConfig,
}

impl CliContext {
    /// Load the configuration named by `--config`, `ZLI_CONFIG` or the default path
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let config_path = resolve_config_path(explicit);
        let config = ZliConfig::load_or_default(&config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?;
        Ok(Self {
            config_path,
            config,
        })
    }

    /// Directory holding the config file, local state and staged daemons
    pub fn state_dir(&self) -> PathBuf {
        match self.config_path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    pub fn state_store(&self) -> StateStore {
        StateStore::new(self.state_dir())
    }

    pub fn supervisor(&self) -> Result<DaemonSupervisor> {
        let executable =
            DaemonExecutable::resolve(self.config.daemon.binary_dir(), self.state_dir());
        let supervisor = DaemonSupervisor::new(
            self.state_store(),
            DaemonSession::from_config(&self.config, &self.config_path),
            self.config.daemon.clone(),
            executable,
        )?;
        Ok(supervisor)
    }
}
