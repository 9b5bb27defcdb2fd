//! Daemon supervisor
//!
//! # Start sequence
//!
//! 1. Take the plugin lock so no other zli invocation manages this plugin
//! 2. Tear down whatever daemon the record (or the port) still points at
//! 3. Pick a local port: explicit, else persisted, else freshly allocated
//! 4. Stage the executable and spawn it detached
//! 5. Persist the pid right away so a crash can still be cleaned up
//! 6. Wait for the port to accept connections, then poll readiness
//! 7. Persist the final record
//!
//! In debug mode the daemon instead runs attached to the terminal and the
//! call returns its exit code.

use std::process::Child;
use std::time::Duration;

use zl_core::config::DaemonConfig;
use zl_core::port::{find_free_port, is_port_available, wait_for_port};
use zl_core::state::PluginLock;
use zl_core::{
    DaemonRecord, KubeAuthMaterial, PluginType, PortError, ProcessControl, StateStore,
    SystemProcessControl,
};

use crate::args::{build_daemon_args, DaemonSession, PluginArgs};
use crate::error::DaemonError;
use crate::readiness::{daemon_client, daemon_url, ReadinessProbe, READY_PATH};
use crate::spawn::{last_log_line, run_attached, spawn_detached};
use crate::staging::DaemonExecutable;
use crate::status::{fetch_status, DaemonStatus, STATUS_PATH};

const PORT_POLL_INTERVAL: Duration = Duration::from_millis(100);
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);
const STATUS_TIMEOUT: Duration = Duration::from_secs(5);

/// Target-specific part of a connect request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetDetails {
    Kube {
        target_user: String,
        /// Empty means "use the remembered default groups"
        target_groups: Vec<String>,
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

impl TargetDetails {
    pub fn plugin(&self) -> PluginType {
        match self {
            TargetDetails::Kube { .. } => PluginType::Kube,
            TargetDetails::Db { .. } => PluginType::Db,
            TargetDetails::Web { .. } => PluginType::Web,
        }
    }
}

/// An authorized request to bring up a daemon
#[derive(Debug, Clone)]
pub struct DaemonRequest {
    pub target_id: String,
    pub target_name: String,
    pub details: TargetDetails,
    /// Host to bind; the configured default when unset
    pub local_host: Option<String>,
    /// Port to bind; must be free when set
    pub local_port: Option<u16>,
    /// Fresh kube credentials; the remembered ones are used when unset
    pub kube_auth: Option<KubeAuthMaterial>,
    /// Run attached to the terminal instead of detached
    pub debug: bool,
}

/// Result of [`DaemonSupervisor::start`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// Detached daemon is serving traffic
    Ready(DaemonRecord),
    /// Debug-mode daemon exited with this code
    Exited { code: i32 },
}

/// Brings daemons up and down, one per plugin type
pub struct DaemonSupervisor<P = SystemProcessControl> {
    store: StateStore,
    session: DaemonSession,
    config: DaemonConfig,
    executable: DaemonExecutable,
    process: P,
    http: reqwest::Client,
}

impl DaemonSupervisor<SystemProcessControl> {
    pub fn new(
        store: StateStore,
        session: DaemonSession,
        config: DaemonConfig,
        executable: DaemonExecutable,
    ) -> Result<Self, DaemonError> {
        Self::with_process_control(store, session, config, executable, SystemProcessControl)
    }
}

impl<P: ProcessControl> DaemonSupervisor<P> {
    /// Create a supervisor using a custom [`ProcessControl`]
    pub fn with_process_control(
        store: StateStore,
        session: DaemonSession,
        config: DaemonConfig,
        executable: DaemonExecutable,
        process: P,
    ) -> Result<Self, DaemonError> {
        Ok(Self {
            store,
            session,
            config,
            executable,
            process,
            http: daemon_client()?,
        })
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    async fn lock(&self, plugin: PluginType) -> Result<PluginLock, DaemonError> {
        Ok(self.store.lock(plugin, self.config.lock_timeout).await?)
    }

    /// Bring up the daemon described by `request`
    pub async fn start(&self, request: DaemonRequest) -> Result<StartOutcome, DaemonError> {
        let plugin = request.details.plugin();
        let _lock = self.lock(plugin).await?;
        let previous = self.store.record(plugin)?;

        let plugin_args = self.plugin_args(&request, &previous)?;

        // Supersede whatever ran before, tracked or not
        if let Some(pid) = previous.local_pid {
            tracing::info!(%plugin, pid, "Stopping previous daemon");
            self.process.kill_by_pid(pid);
        }
        if let Some(port) = previous.local_port {
            self.process.sweep_port(port);
        }
        if previous.is_running() {
            self.store.update(plugin, DaemonRecord::clear_daemon).await?;
        }

        let host = request
            .local_host
            .clone()
            .unwrap_or_else(|| self.config.default_local_host.clone());
        let port = self.resolve_port(&host, request.local_port, previous.local_port)?;

        let args = build_daemon_args(&self.session, &request.target_id, &host, port, &plugin_args);
        let launch = self.executable.prepare()?;

        if request.debug {
            tracing::warn!(%plugin, host = %host, port, "Starting daemon in debug mode");
            let code = run_attached(&launch, &args, &self.process).await?;
            return Ok(StartOutcome::Exited { code });
        }

        let mut child = spawn_detached(&launch, &args)?;
        let pid = child.id();
        self.store
            .update(plugin, |record| {
                record.local_host = Some(host.clone());
                record.local_port = Some(port);
                record.local_pid = Some(pid);
            })
            .await?;
        tracing::info!(%plugin, pid, host = %host, port, "Daemon spawned, waiting for it to bind");

        if let Err(e) = self.await_ready(plugin, &mut child, &host, port).await {
            if matches!(e, DaemonError::DaemonExited { .. }) {
                self.store.update(plugin, DaemonRecord::clear_daemon).await?;
            }
            return Err(e);
        }

        let record = self
            .store
            .update(plugin, |record| {
                record.target_name = Some(request.target_name.clone());
                record.target_id = Some(request.target_id.clone());
                if let PluginArgs::Kube {
                    target_user,
                    target_groups,
                    auth,
                } = &plugin_args
                {
                    record.target_user = Some(target_user.clone());
                    record.target_groups = target_groups.clone();
                    record.kube_auth = Some(auth.clone());
                }
            })
            .await?;

        tracing::info!(%plugin, pid, host = %host, port, "Daemon is ready");
        Ok(StartOutcome::Ready(record))
    }

    fn plugin_args(
        &self,
        request: &DaemonRequest,
        previous: &DaemonRecord,
    ) -> Result<PluginArgs, DaemonError> {
        Ok(match &request.details {
            TargetDetails::Kube {
                target_user,
                target_groups,
            } => {
                let auth = request
                    .kube_auth
                    .clone()
                    .or_else(|| previous.kube_auth.clone())
                    .ok_or(DaemonError::MissingKubeAuth)?;
                let target_groups = if target_groups.is_empty() {
                    previous.default_target_groups.clone()
                } else {
                    target_groups.clone()
                };
                PluginArgs::Kube {
                    target_user: target_user.clone(),
                    target_groups,
                    auth,
                }
            }
            TargetDetails::Db {
                remote_host,
                remote_port,
            } => PluginArgs::Db {
                remote_host: remote_host.clone(),
                remote_port: *remote_port,
            },
            TargetDetails::Web {
                remote_host,
                remote_port,
            } => PluginArgs::Web {
                remote_host: remote_host.clone(),
                remote_port: *remote_port,
            },
        })
    }

    fn resolve_port(
        &self,
        host: &str,
        explicit: Option<u16>,
        persisted: Option<u16>,
    ) -> Result<u16, DaemonError> {
        if let Some(port) = explicit {
            if !is_port_available(host, port) {
                return Err(PortError::InUse {
                    host: host.to_string(),
                    port,
                }
                .into());
            }
            return Ok(port);
        }

        match persisted {
            Some(port) if is_port_available(host, port) => Ok(port),
            Some(port) => {
                tracing::warn!(port, "Persisted port is still occupied, allocating a new one");
                Ok(find_free_port(host)?)
            }
            None => Ok(find_free_port(host)?),
        }
    }

    async fn await_ready(
        &self,
        plugin: PluginType,
        child: &mut Child,
        host: &str,
        port: u16,
    ) -> Result<(), DaemonError> {
        let pid = child.id();
        let log_path = &self.session.log_path;

        let bound = tokio::select! {
            bound = wait_for_port(host, port, self.config.port_wait, PORT_POLL_INTERVAL) => bound,
            status = until_exit(child) => {
                return Err(DaemonError::DaemonExited {
                    pid,
                    status,
                    last_log_line: last_log_line(log_path),
                });
            }
        };
        if !bound {
            return Err(DaemonError::PortBindTimeout {
                host: host.to_string(),
                port,
                waited: self.config.port_wait,
                last_log_line: last_log_line(log_path),
            });
        }

        tracing::info!(%plugin, "Waiting for daemon to become ready...");
        let url = daemon_url(plugin, host, port, READY_PATH);
        let probe = ReadinessProbe::new(
            self.http.clone(),
            self.config.readiness_attempts,
            self.config.readiness_interval,
        );

        let ready = tokio::select! {
            ready = probe.wait_ready(&url) => ready,
            status = until_exit(child) => {
                return Err(DaemonError::DaemonExited {
                    pid,
                    status,
                    last_log_line: last_log_line(log_path),
                });
            }
        };
        match ready {
            Some(_) => Ok(()),
            None => Err(DaemonError::ReadinessTimeout {
                attempts: probe.attempts(),
                url,
                last_log_line: last_log_line(log_path),
            }),
        }
    }

    /// Stop the plugin's daemon and forget its pid
    ///
    /// Sweeps the recorded port even when no pid is known. Safe to call
    /// repeatedly. Returns whether a pid was cleared.
    pub async fn teardown(&self, plugin: PluginType) -> Result<bool, DaemonError> {
        let _lock = self.lock(plugin).await?;
        let record = self.store.record(plugin)?;

        if let Some(pid) = record.local_pid {
            tracing::info!(%plugin, pid, "Killing daemon");
            self.process.kill_by_pid(pid);
        }
        if let Some(port) = record.local_port {
            self.process.sweep_port(port);
        }

        if record.is_running() {
            self.store.update(plugin, DaemonRecord::clear_daemon).await?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Report the plugin's daemon health, repairing state for crashed daemons
    pub async fn check_status(&self, plugin: PluginType) -> Result<DaemonStatus, DaemonError> {
        let record = self.store.record(plugin)?;
        let Some(pid) = record.local_pid else {
            return Ok(DaemonStatus::NotRunning);
        };

        if !self.process.is_alive(pid) {
            tracing::warn!(%plugin, pid, "Daemon quit unexpectedly");
            let _lock = self.lock(plugin).await?;
            if let Some(port) = record.local_port {
                self.process.sweep_port(port);
            }
            self.store.update(plugin, DaemonRecord::clear_daemon).await?;
            return Ok(DaemonStatus::Crashed { pid });
        }

        let host = record
            .local_host
            .clone()
            .unwrap_or_else(|| self.config.default_local_host.clone());
        let Some(port) = record.local_port else {
            return Ok(DaemonStatus::Unreachable {
                pid,
                reason: "no local port recorded".to_string(),
            });
        };

        // Only the kube daemon reports remote-side failures
        if plugin != PluginType::Kube {
            return Ok(DaemonStatus::Running { host, port, pid });
        }

        let url = daemon_url(plugin, &host, port, STATUS_PATH);
        match fetch_status(&self.http, &url, STATUS_TIMEOUT).await {
            Ok(status) if !status.exit_message.is_empty() => Ok(DaemonStatus::ExitMessage {
                pid,
                message: status.exit_message,
            }),
            Ok(_) => Ok(DaemonStatus::Running { host, port, pid }),
            Err(e) => Ok(DaemonStatus::Unreachable {
                pid,
                reason: e.to_string(),
            }),
        }
    }
}

/// Resolve once `child` has exited, with a printable exit status
async fn until_exit(child: &mut Child) -> String {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return status.to_string(),
            Ok(None) => tokio::time::sleep(EXIT_POLL_INTERVAL).await,
            Err(e) => {
                tracing::debug!("Cannot poll daemon process: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }
}
