//! Configuration management for zli

mod daemon;
pub mod serde_utils;
mod service;
mod session;

pub use daemon::DaemonConfig;
pub use service::ServiceConfig;
pub use session::{InputBatchConfig, SessionConfig};

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable that points zli at a different config file
pub const CONFIG_PATH_ENV: &str = "ZLI_CONFIG";

/// Get the default configuration directory
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("zli")
}

/// Get the default configuration file path
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.toml")
}

/// Resolve the config path: explicit flag, then `ZLI_CONFIG`, then default
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    match std::env::var_os(CONFIG_PATH_ENV) {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => default_config_path(),
    }
}

/// Top-level zli configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ZliConfig {
    /// Access broker service settings
    pub service: ServiceConfig,

    /// Local daemon supervision settings
    pub daemon: DaemonConfig,

    /// Interactive session settings
    pub session: SessionConfig,
}

impl ZliConfig {
    /// Load from `path`, falling back to defaults when the file does not exist
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match load_config(path) {
            Ok(config) => Ok(config),
            Err(ConfigError::NotFound(_)) => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }
}

/// Load configuration from a file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    let config: T = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to a file
pub fn save_config<T: serde::Serialize>(path: &Path, config: &T) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ConfigError::Invalid(format!("Failed to create config dir: {}", e)))?;
    }

    std::fs::write(path, content)
        .map_err(|e| ConfigError::Invalid(format!("Failed to write config: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = ZliConfig::load_or_default(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.daemon.readiness_attempts, 120);
        assert_eq!(config.daemon.readiness_interval, Duration::from_secs(1));
        assert_eq!(config.session.batch.max_delay, Duration::from_millis(101));
    }

    #[test]
    fn test_save_then_load_preserves_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = ZliConfig::default();
        config.service.service_url = "https://example.test/".to_string();
        config.daemon.readiness_attempts = 20;
        config.session.metrics_enabled = true;
        save_config(&path, &config).unwrap();

        let loaded: ZliConfig = load_config(&path).unwrap();
        assert_eq!(loaded.service.service_url, "https://example.test/");
        assert_eq!(loaded.daemon.readiness_attempts, 20);
        assert!(loaded.session.metrics_enabled);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[daemon]\nport_wait = 5\n").unwrap();

        let config = ZliConfig::load_or_default(&path).unwrap();
        assert_eq!(config.daemon.port_wait, Duration::from_secs(5));
        assert_eq!(config.daemon.default_local_host, "localhost");
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[daemon\n").unwrap();

        assert!(matches!(
            ZliConfig::load_or_default(&path),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_explicit_config_path_wins() {
        let explicit = PathBuf::from("/tmp/custom-zli.toml");
        assert_eq!(resolve_config_path(Some(&explicit)), explicit);
    }
}
