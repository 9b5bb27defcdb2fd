//! Readiness polling against the daemon's HTTP surface

use std::time::Duration;

use tokio::time::Instant;
use zl_core::PluginType;

/// Path daemons answer with 2xx once they can serve traffic
pub const READY_PATH: &str = "/bastionzero-ready";

/// Kube daemons serve their local surface over TLS with a self-signed cert
pub fn scheme(plugin: PluginType) -> &'static str {
    match plugin {
        PluginType::Kube => "https",
        PluginType::Db | PluginType::Web => "http",
    }
}

/// URL of `path` on a local daemon
pub fn daemon_url(plugin: PluginType, host: &str, port: u16, path: &str) -> String {
    format!("{}://{}:{}{}", scheme(plugin), host, port, path)
}

/// HTTP client for local daemons
///
/// Certificates are not verified (the kube daemon's cert is self-signed)
/// and proxies are bypassed since the daemon is always local.
pub fn daemon_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .no_proxy()
        .build()
}

/// Fixed-interval readiness poller
#[derive(Debug, Clone)]
pub struct ReadinessProbe {
    client: reqwest::Client,
    attempts: u32,
    interval: Duration,
}

impl ReadinessProbe {
    pub fn new(client: reqwest::Client, attempts: u32, interval: Duration) -> Self {
        Self {
            client,
            attempts,
            interval,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Poll `url` until it answers 2xx
    ///
    /// Each attempt, including a request that hangs, occupies at most one
    /// interval, so the whole poll finishes within `attempts * interval`.
    /// Returns the 1-based attempt that succeeded, or `None`.
    pub async fn wait_ready(&self, url: &str) -> Option<u32> {
        for attempt in 1..=self.attempts {
            let started = Instant::now();
            match tokio::time::timeout(self.interval, self.client.get(url).send()).await {
                Ok(Ok(resp)) if resp.status().is_success() => {
                    tracing::debug!(attempt, url, "Daemon reported ready");
                    return Some(attempt);
                }
                Ok(Ok(resp)) => {
                    tracing::debug!(attempt, status = %resp.status(), "Daemon not ready yet");
                }
                Ok(Err(e)) => {
                    tracing::debug!(attempt, "Readiness probe failed: {}", e);
                }
                Err(_) => {
                    tracing::debug!(attempt, "Readiness probe timed out");
                }
            }

            if attempt < self.attempts {
                tokio::time::sleep_until(started + self.interval).await;
            }
        }
        None
    }
}
