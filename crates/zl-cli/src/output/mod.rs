//! Output formatting utilities for the CLI
//!
//! Status tables and colored one-line messages. Messages meant for the
//! user's eyes go to stderr when stdout may be carrying session output.

use std::io::Write;

use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};
use tabled::{settings::Style, Table, Tabled};

use zl_core::PluginType;
use zl_daemon::DaemonStatus;

/// One line of `zli status`
#[derive(Debug, Clone)]
pub struct DaemonStatusView {
    pub plugin: PluginType,
    pub status: DaemonStatus,
    pub target: Option<String>,
}

/// Format daemon status as an ASCII table
pub fn format_daemon_status(views: &[DaemonStatusView]) -> String {
    #[derive(Tabled)]
    struct StatusRow {
        #[tabled(rename = "PLUGIN")]
        plugin: String,
        #[tabled(rename = "STATE")]
        state: String,
        #[tabled(rename = "ADDRESS")]
        address: String,
        #[tabled(rename = "PID")]
        pid: String,
        #[tabled(rename = "TARGET")]
        target: String,
    }

    let rows: Vec<StatusRow> = views
        .iter()
        .map(|view| {
            let (state, address, pid) = match &view.status {
                DaemonStatus::NotRunning => ("not running".to_string(), None, None),
                DaemonStatus::Running { host, port, pid } => {
                    ("running".to_string(), Some(format!("{}:{}", host, port)), Some(*pid))
                }
                DaemonStatus::Crashed { pid } => ("crashed".to_string(), None, Some(*pid)),
                DaemonStatus::ExitMessage { pid, message } => {
                    (format!("failed: {}", message), None, Some(*pid))
                }
                DaemonStatus::Unreachable { pid, .. } => {
                    ("unreachable".to_string(), None, Some(*pid))
                }
            };
            StatusRow {
                plugin: view.plugin.to_string(),
                state,
                address: address.unwrap_or_else(|| "-".to_string()),
                pid: pid.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string()),
                target: view.target.clone().unwrap_or_else(|| "-".to_string()),
            }
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

fn print_prefixed(mut out: impl Write, color: Color, prefix: &str, msg: &str) {
    let _ = crossterm::execute!(
        out,
        SetForegroundColor(color),
        Print(prefix),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Green check mark, stdout
pub fn print_success(msg: &str) {
    print_prefixed(std::io::stdout(), Color::Green, "✓ ", msg);
}

/// Red cross, stderr
pub fn print_error(msg: &str) {
    print_prefixed(std::io::stderr(), Color::Red, "✗ ", msg);
}

/// Yellow warning sign, stderr
pub fn print_warning(msg: &str) {
    print_prefixed(std::io::stderr(), Color::Yellow, "⚠ ", msg);
}

/// Cyan info sign, stdout
pub fn print_info(msg: &str) {
    print_prefixed(std::io::stdout(), Color::Cyan, "ℹ ", msg);
}

/// Info sign on stderr, for use while stdout belongs to a session
pub fn print_notice(msg: &str) {
    print_prefixed(std::io::stderr(), Color::Cyan, "ℹ ", msg);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_table_rows() {
        let table = format_daemon_status(&[
            DaemonStatusView {
                plugin: PluginType::Kube,
                status: DaemonStatus::Running {
                    host: "localhost".into(),
                    port: 6443,
                    pid: 4321,
                },
                target: Some("prod-cluster".into()),
            },
            DaemonStatusView {
                plugin: PluginType::Db,
                status: DaemonStatus::NotRunning,
                target: None,
            },
        ]);

        assert!(table.contains("PLUGIN"));
        assert!(table.contains("localhost:6443"));
        assert!(table.contains("4321"));
        assert!(table.contains("prod-cluster"));
        assert!(table.contains("not running"));
    }

    #[test]
    fn test_exit_message_is_shown() {
        let table = format_daemon_status(&[DaemonStatusView {
            plugin: PluginType::Kube,
            status: DaemonStatus::ExitMessage {
                pid: 7,
                message: "token expired".into(),
            },
            target: None,
        }]);
        assert!(table.contains("failed: token expired"));
    }
}
