//! Status command implementation

use anyhow::{Context, Result};

use zl_core::PluginType;
use zl_daemon::DaemonStatus;

use crate::context::CliContext;
use crate::output::{format_daemon_status, print_warning, DaemonStatusView};

/// Execute the status command
pub async fn status_command(ctx: &CliContext, plugin: Option<PluginType>) -> Result<u8> {
    let supervisor = ctx.supervisor()?;
    let store = ctx.state_store();
    let plugins = plugin.map(|p| vec![p]).unwrap_or_else(|| PluginType::ALL.to_vec());

    let mut views = Vec::with_capacity(plugins.len());
    for plugin in plugins {
        let status = supervisor
            .check_status(plugin)
            .await
            .with_context(|| format!("Failed to check {} daemon", plugin))?;

        match &status {
            DaemonStatus::Crashed { pid } => print_warning(&format!(
                "The {} daemon (pid {}) quit unexpectedly; its record has been cleared",
                plugin, pid
            )),
            DaemonStatus::Unreachable { reason, .. } => {
                tracing::debug!(%plugin, "Status endpoint unreachable: {}", reason);
            }
            _ => {}
        }

        views.push(DaemonStatusView {
            plugin,
            target: store.record(plugin)?.target_name,
            status,
        });
    }

    println!("{}", format_daemon_status(&views));
    Ok(0)
}
