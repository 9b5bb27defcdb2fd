//! Access broker service configuration

use serde::{Deserialize, Serialize};

/// Settings describing the logged-in access broker session
///
/// These values are produced by the login flow and handed to every daemon
/// on its command line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Base URL of the access broker service
    pub service_url: String,

    /// Session id issued at login
    pub session_id: String,

    /// Authorization header value forwarded to daemons
    pub auth_header: Option<String>,

    /// Command the daemon runs to refresh id tokens.
    /// Defaults to `<current executable> refresh`.
    pub refresh_token_command: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            service_url: "https://cloud.bastionzero.com/".to_string(),
            session_id: String::new(),
            auth_header: None,
            refresh_token_command: None,
        }
    }
}

impl ServiceConfig {
    /// Service URL as daemons expect it: no scheme, no trailing slash
    pub fn daemon_service_url(&self) -> String {
        let url = self.service_url.trim();
        let url = url
            .strip_prefix("https://")
            .or_else(|| url.strip_prefix("http://"))
            .unwrap_or(url);
        url.trim_end_matches('/').to_string()
    }

    /// Refresh command, defaulting to this executable's `refresh` subcommand
    pub fn refresh_command(&self) -> String {
        if let Some(cmd) = &self.refresh_token_command {
            return cmd.clone();
        }
        let exe = std::env::current_exe()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| "zli".to_string());
        format!("{} refresh", exe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_daemon_service_url_strips_scheme_and_slash() {
        let config = ServiceConfig {
            service_url: "https://cloud.example.com/".to_string(),
            ..Default::default()
        };
        assert_eq!(config.daemon_service_url(), "cloud.example.com");
    }

    #[test]
    fn test_daemon_service_url_without_scheme() {
        let config = ServiceConfig {
            service_url: "localhost:8080".to_string(),
            ..Default::default()
        };
        assert_eq!(config.daemon_service_url(), "localhost:8080");
    }

    #[test]
    fn test_explicit_refresh_command() {
        let config = ServiceConfig {
            refresh_token_command: Some("zli-dev refresh".to_string()),
            ..Default::default()
        };
        assert_eq!(config.refresh_command(), "zli-dev refresh");
    }
}
