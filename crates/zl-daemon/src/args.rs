//! Daemon command line construction
//!
//! Daemons take Go-style `-key=value` flags. Arguments are passed straight
//! to the OS without a shell, so values are never quoted.

use std::path::{Path, PathBuf};

use zl_core::config::ZliConfig;
use zl_core::{KubeAuthMaterial, PluginType};

/// Session-wide values every daemon receives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonSession {
    pub session_id: String,
    /// Service URL with scheme and trailing slash removed
    pub service_url: String,
    pub auth_header: String,
    pub config_path: PathBuf,
    pub log_path: PathBuf,
    pub refresh_token_command: String,
}

impl DaemonSession {
    /// Build from the loaded configuration and the path it came from
    pub fn from_config(config: &ZliConfig, config_path: &Path) -> Self {
        Self {
            session_id: config.service.session_id.clone(),
            service_url: config.service.daemon_service_url(),
            auth_header: config.service.auth_header.clone().unwrap_or_default(),
            config_path: config_path.to_path_buf(),
            log_path: config.daemon.log_path.clone(),
            refresh_token_command: config.service.refresh_command(),
        }
    }
}

/// Plugin-specific daemon arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginArgs {
    Kube {
        target_user: String,
        target_groups: Vec<String>,
        auth: KubeAuthMaterial,
    },
    Db {
        remote_host: String,
        remote_port: u16,
    },
    Web {
        remote_host: String,
        remote_port: u16,
    },
}

impl PluginArgs {
    pub fn plugin(&self) -> PluginType {
        match self {
            PluginArgs::Kube { .. } => PluginType::Kube,
            PluginArgs::Db { .. } => PluginType::Db,
            PluginArgs::Web { .. } => PluginType::Web,
        }
    }
}

fn flag(name: &str, value: impl std::fmt::Display) -> String {
    format!("-{}={}", name, value)
}

/// Build the full daemon argument vector
pub fn build_daemon_args(
    session: &DaemonSession,
    target_id: &str,
    local_host: &str,
    local_port: u16,
    plugin: &PluginArgs,
) -> Vec<String> {
    let mut args = vec![
        flag("sessionId", &session.session_id),
        flag("authHeader", &session.auth_header),
        flag("serviceURL", &session.service_url),
        flag("targetId", target_id),
        flag("daemonPort", local_port),
        flag("localHost", local_host),
        flag("configPath", session.config_path.display()),
        flag("logPath", session.log_path.display()),
        flag("refreshTokenCommand", &session.refresh_token_command),
    ];

    match plugin {
        PluginArgs::Kube {
            target_user,
            target_groups,
            auth,
        } => {
            args.push(flag("targetUser", target_user));
            args.push(flag("targetGroups", target_groups.join(",")));
            args.push(flag("certPath", auth.cert_path.display()));
            args.push(flag("keyPath", auth.key_path.display()));
            args.push(flag("localhostToken", &auth.token));
        }
        PluginArgs::Db {
            remote_host,
            remote_port,
        }
        | PluginArgs::Web {
            remote_host,
            remote_port,
        } => {
            args.push(flag("remoteHost", remote_host));
            args.push(flag("remotePort", remote_port));
        }
    }

    args.push(flag("plugin", plugin.plugin()));
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> DaemonSession {
        DaemonSession {
            session_id: "sess-1".into(),
            service_url: "cloud.example.com".into(),
            auth_header: "Bearer abc def".into(),
            config_path: PathBuf::from("/home/u/.config/zli/config.toml"),
            log_path: PathBuf::from("/home/u/.config/zli/bastionzero-daemon.log"),
            refresh_token_command: "/usr/bin/zli refresh".into(),
        }
    }

    #[test]
    fn test_kube_args_in_order() {
        let plugin = PluginArgs::Kube {
            target_user: "alice".into(),
            target_groups: vec!["devs".into(), "ops".into()],
            auth: KubeAuthMaterial {
                cert_path: PathBuf::from("/c.pem"),
                key_path: PathBuf::from("/k.pem"),
                token: "tok".into(),
            },
        };
        let args = build_daemon_args(&session(), "t-1", "localhost", 9000, &plugin);
        assert_eq!(
            args,
            vec![
                "-sessionId=sess-1",
                "-authHeader=Bearer abc def",
                "-serviceURL=cloud.example.com",
                "-targetId=t-1",
                "-daemonPort=9000",
                "-localHost=localhost",
                "-configPath=/home/u/.config/zli/config.toml",
                "-logPath=/home/u/.config/zli/bastionzero-daemon.log",
                "-refreshTokenCommand=/usr/bin/zli refresh",
                "-targetUser=alice",
                "-targetGroups=devs,ops",
                "-certPath=/c.pem",
                "-keyPath=/k.pem",
                "-localhostToken=tok",
                "-plugin=kube",
            ]
        );
    }

    #[test]
    fn test_db_args_end_with_remote_and_plugin() {
        let plugin = PluginArgs::Db {
            remote_host: "db.internal".into(),
            remote_port: 5432,
        };
        let args = build_daemon_args(&session(), "t-2", "127.0.0.1", 6000, &plugin);
        assert_eq!(args.len(), 12);
        assert_eq!(
            &args[9..],
            &["-remoteHost=db.internal", "-remotePort=5432", "-plugin=db"]
        );
        assert!(!args.iter().any(|a| a.contains('"')));
    }

    #[test]
    fn test_web_plugin_name() {
        let plugin = PluginArgs::Web {
            remote_host: "intranet".into(),
            remote_port: 80,
        };
        let args = build_daemon_args(&session(), "t-3", "localhost", 6001, &plugin);
        assert_eq!(args.last().map(String::as_str), Some("-plugin=web"));
    }

    #[test]
    fn test_session_from_config() {
        let mut config = ZliConfig::default();
        config.service.service_url = "https://cloud.example.com/".into();
        config.service.session_id = "s".into();
        config.service.refresh_token_command = Some("zli refresh".into());

        let session = DaemonSession::from_config(&config, Path::new("/cfg/config.toml"));
        assert_eq!(session.service_url, "cloud.example.com");
        assert_eq!(session.auth_header, "");
        assert_eq!(session.refresh_token_command, "zli refresh");
        assert_eq!(session.config_path, PathBuf::from("/cfg/config.toml"));
    }
}
