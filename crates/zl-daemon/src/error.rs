//! Daemon supervisor errors

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use zl_core::{PortError, StateError};

/// Errors surfaced by the daemon supervisor
#[derive(Error, Debug)]
pub enum DaemonError {
    /// No usable local port
    #[error(transparent)]
    PortAllocation(#[from] PortError),

    /// The bundled daemon binary could not be staged
    #[error("Failed to stage daemon executable from {source_path:?}: {source}")]
    Staging {
        source_path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The OS refused to start the daemon
    #[error("Failed to spawn daemon {program:?}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The daemon never accepted TCP connections
    #[error("Daemon did not bind {host}:{port} within {waited:?}{}", log_hint(last_log_line))]
    PortBindTimeout {
        host: String,
        port: u16,
        waited: Duration,
        last_log_line: Option<String>,
    },

    /// The readiness endpoint never reported success
    #[error(
        "Daemon was not ready after {attempts} attempts at {url}. \
         Try connecting again, and check the daemon log if it keeps failing{}",
        log_hint(last_log_line)
    )]
    ReadinessTimeout {
        attempts: u32,
        url: String,
        last_log_line: Option<String>,
    },

    /// The daemon process died before it became ready
    #[error("Daemon process {pid} exited before becoming ready (status: {status}){}", log_hint(last_log_line))]
    DaemonExited {
        pid: u32,
        status: String,
        last_log_line: Option<String>,
    },

    /// Kube daemons need localhost credentials that have not been generated
    #[error("No kube credentials found; generate a kubeconfig before connecting")]
    MissingKubeAuth,

    /// Persisted state could not be read or written
    #[error(transparent)]
    State(#[from] StateError),

    /// HTTP client could not be built
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

fn log_hint(line: &Option<String>) -> String {
    match line {
        Some(line) => format!("\nLast daemon log line: {}", line),
        None => String::new(),
    }
}
