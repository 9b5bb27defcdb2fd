//! Daemon health as reported by `/bastionzero-status`

use std::time::Duration;

use serde::Deserialize;

/// Path daemons report fatal remote-side conditions on
pub const STATUS_PATH: &str = "/bastionzero-status";

/// Body of the status endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StatusResponse {
    /// Non-empty when the daemon hit an unrecoverable error
    #[serde(rename = "ExitMessage", default)]
    pub exit_message: String,
}

/// What `zli status` reports for one plugin
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonStatus {
    /// No daemon recorded
    NotRunning,
    /// Running and not reporting problems
    Running { host: String, port: u16, pid: u32 },
    /// A pid was recorded but the process is gone; state has been repaired
    Crashed { pid: u32 },
    /// The daemon is alive but reported a fatal message
    ExitMessage { pid: u32, message: String },
    /// The daemon is alive but its status endpoint did not answer
    Unreachable { pid: u32, reason: String },
}

impl DaemonStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, DaemonStatus::Running { .. })
    }
}

/// Fetch and parse the status endpoint, giving up after `timeout`
pub async fn fetch_status(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<StatusResponse, reqwest::Error> {
    client
        .get(url)
        .timeout(timeout)
        .send()
        .await?
        .error_for_status()?
        .json::<StatusResponse>()
        .await
}
