//! zl-core: Core configuration, local state and process utilities for zli
//!
//! This crate holds everything the daemon supervisor and the CLI share:
//! configuration files, the persisted per-plugin daemon records, and the
//! small cross-platform helpers for ports and processes.

pub mod config;
pub mod error;
pub mod port;
pub mod process;
pub mod state;
pub mod time;
pub mod types;

pub use error::{ConfigError, PortError, StateError};
pub use process::{ProcessControl, SystemProcessControl};
pub use state::{DaemonRecord, KubeAuthMaterial, LocalState, StateStore};
pub use types::PluginType;
