//! Connect command implementation

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand};

use zl_core::KubeAuthMaterial;
use zl_daemon::{DaemonRequest, StartOutcome, TargetDetails};

use crate::context::CliContext;
use crate::output::{print_info, print_success};

/// Local listener options shared by every plugin
#[derive(Debug, Clone, Args)]
pub struct LocalOptions {
    /// Local port to listen on (default: the remembered port, else a free one)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Local host to bind
    #[arg(long)]
    pub host: Option<String>,

    /// Run the daemon in this terminal instead of in the background
    #[arg(long)]
    pub debug: bool,
}

/// Which kind of tunnel to bring up
#[derive(Debug, Clone, Subcommand)]
pub enum ConnectTarget {
    /// Kubernetes API proxy
    Kube {
        /// Cluster target id
        target_id: String,

        /// Display name for the target
        #[arg(long)]
        name: Option<String>,

        /// Kubernetes user to act as
        #[arg(short, long)]
        user: String,

        /// Kubernetes group (repeatable; defaults to the remembered groups)
        #[arg(short, long = "group")]
        groups: Vec<String>,

        /// Client certificate for the local proxy
        #[arg(long, requires_all = ["key", "token"])]
        cert: Option<PathBuf>,

        /// Client key for the local proxy
        #[arg(long, requires_all = ["cert", "token"])]
        key: Option<PathBuf>,

        /// Token local kubectl sessions present to the proxy
        #[arg(long, env = "ZLI_KUBE_TOKEN", requires_all = ["cert", "key"])]
        token: Option<String>,

        #[command(flatten)]
        local: LocalOptions,
    },

    /// Database tunnel
    Db {
        /// Database target id
        target_id: String,

        /// Display name for the target
        #[arg(long)]
        name: Option<String>,

        /// Host the target connects to
        #[arg(long)]
        remote_host: String,

        /// Port the target connects to
        #[arg(long)]
        remote_port: u16,

        #[command(flatten)]
        local: LocalOptions,
    },

    /// Web tunnel
    Web {
        /// Web target id
        target_id: String,

        /// Display name for the target
        #[arg(long)]
        name: Option<String>,

        /// Host the target connects to
        #[arg(long)]
        remote_host: String,

        /// Port the target connects to
        #[arg(long)]
        remote_port: u16,

        #[command(flatten)]
        local: LocalOptions,
    },
}

impl ConnectTarget {
    /// Supervisor request for this target
    pub fn into_request(self) -> DaemonRequest {
        let (target_id, name, details, local, kube_auth) = match self {
            ConnectTarget::Kube {
                target_id,
                name,
                user,
                groups,
                cert,
                key,
                token,
                local,
            } => {
                let kube_auth = match (cert, key, token) {
                    (Some(cert_path), Some(key_path), Some(token)) => Some(KubeAuthMaterial {
                        cert_path,
                        key_path,
                        token,
                    }),
                    _ => None,
                };
                let details = TargetDetails::Kube {
                    target_user: user,
                    target_groups: groups,
                };
                (target_id, name, details, local, kube_auth)
            }
            ConnectTarget::Db {
                target_id,
                name,
                remote_host,
                remote_port,
                local,
            } => {
                let details = TargetDetails::Db {
                    remote_host,
                    remote_port,
                };
                (target_id, name, details, local, None)
            }
            ConnectTarget::Web {
                target_id,
                name,
                remote_host,
                remote_port,
                local,
            } => {
                let details = TargetDetails::Web {
                    remote_host,
                    remote_port,
                };
                (target_id, name, details, local, None)
            }
        };

        DaemonRequest {
            target_name: name.unwrap_or_else(|| target_id.clone()),
            target_id,
            details,
            local_host: local.host,
            local_port: local.port,
            kube_auth,
            debug: local.debug,
        }
    }
}

/// Execute the connect command
pub async fn connect_command(ctx: &CliContext, target: ConnectTarget) -> Result<u8> {
    let request = target.into_request();
    let plugin = request.details.plugin();
    let target_name = request.target_name.clone();

    if !request.debug {
        print_info(&format!("Starting {} daemon for '{}'...", plugin, target_name));
    }

    let supervisor = ctx.supervisor()?;
    let outcome = supervisor
        .start(request)
        .await
        .map_err(|e| anyhow::Error::new(e).context(format!("Failed to start {} daemon", plugin)))?;

    match outcome {
        StartOutcome::Ready(record) => {
            let host = record.local_host.unwrap_or_default();
            let port = record
                .local_port
                .map(|p| p.to_string())
                .unwrap_or_else(|| "?".to_string());
            let pid = record
                .local_pid
                .map(|p| p.to_string())
                .unwrap_or_else(|| "?".to_string());
            print_success(&format!(
                "Connected to '{}': {} daemon listening on {}:{} (pid {})",
                target_name, plugin, host, port, pid
            ));
            Ok(0)
        }
        StartOutcome::Exited { code } => {
            tracing::info!(%plugin, code, "Debug daemon exited");
            Ok(u8::try_from(code).unwrap_or(1))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zl_core::PluginType;

    fn local() -> LocalOptions {
        LocalOptions {
            port: Some(6100),
            host: None,
            debug: false,
        }
    }

    #[test]
    fn test_kube_request_with_credentials() {
        let request = ConnectTarget::Kube {
            target_id: "c1".into(),
            name: Some("prod".into()),
            user: "alice".into(),
            groups: vec!["devs".into()],
            cert: Some("/tmp/c.pem".into()),
            key: Some("/tmp/k.pem".into()),
            token: Some("tok".into()),
            local: local(),
        }
        .into_request();

        assert_eq!(request.details.plugin(), PluginType::Kube);
        assert_eq!(request.target_name, "prod");
        assert_eq!(request.local_port, Some(6100));
        assert_eq!(request.kube_auth.unwrap().token, "tok");
    }

    #[test]
    fn test_db_request_defaults_name_to_id() {
        let request = ConnectTarget::Db {
            target_id: "db-7".into(),
            name: None,
            remote_host: "10.0.0.5".into(),
            remote_port: 5432,
            local: local(),
        }
        .into_request();

        assert_eq!(request.target_name, "db-7");
        assert!(request.kube_auth.is_none());
        assert_eq!(
            request.details,
            TargetDetails::Db {
                remote_host: "10.0.0.5".into(),
                remote_port: 5432
            }
        );
    }
}
