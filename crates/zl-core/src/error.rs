//! Core error types for zli

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::types::PluginType;

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Errors from the persisted daemon state
#[derive(Error, Debug)]
pub enum StateError {
    /// Reading or writing the state file failed
    #[error("State file I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// State file contents could not be parsed
    #[error("State file is corrupt: {0}")]
    Parse(#[from] toml::de::Error),

    /// State could not be serialized
    #[error("Failed to serialize state: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Another zli invocation holds the plugin lock
    #[error("Another zli process is managing the {plugin} daemon (waited {waited:?})")]
    Locked { plugin: PluginType, waited: Duration },
}

/// Local port errors
#[derive(Error, Debug)]
pub enum PortError {
    /// The OS refused to hand out an ephemeral port
    #[error("Failed to allocate a free port on {host}: {source}")]
    Allocation {
        host: String,
        #[source]
        source: std::io::Error,
    },

    /// A requested port is held by something we could not clear
    #[error("Port {port} on {host} is already in use")]
    InUse { host: String, port: u16 },
}
