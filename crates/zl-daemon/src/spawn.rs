//! Starting daemon processes

use std::path::Path;
use std::process::{Child, Command, Stdio};

use zl_core::ProcessControl;

use crate::error::DaemonError;
use crate::staging::LaunchCommand;

#[cfg(windows)]
const DETACHED_PROCESS: u32 = 0x0000_0008;
#[cfg(windows)]
const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;

fn base_command(launch: &LaunchCommand, args: &[String]) -> Command {
    let mut cmd = Command::new(&launch.program);
    cmd.args(&launch.leading_args).args(args);
    if let Some(cwd) = &launch.cwd {
        cmd.current_dir(cwd);
    }
    cmd
}

fn spawn_error(launch: &LaunchCommand) -> impl FnOnce(std::io::Error) -> DaemonError + '_ {
    move |source| DaemonError::Spawn {
        program: launch.program.clone(),
        source,
    }
}

/// Spawn the daemon so it outlives this process
///
/// The daemon gets its own session (its pid doubles as the process group
/// id) and all stdio is discarded. The returned [`Child`] is only used to
/// notice an early exit; dropping it leaves the daemon running.
pub fn spawn_detached(launch: &LaunchCommand, args: &[String]) -> Result<Child, DaemonError> {
    let mut cmd = base_command(launch, args);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // SAFETY: pre-exec runs in the child before exec; setsid is async-signal-safe.
        unsafe {
            cmd.pre_exec(|| {
                if libc::setsid() == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
    }

    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        cmd.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
    }

    let child = cmd.spawn().map_err(spawn_error(launch))?;
    tracing::debug!(pid = child.id(), program = ?launch.program, "Spawned detached daemon");
    Ok(child)
}

/// Run the daemon attached to this terminal until it exits
///
/// The daemon runs in its own process group. Ctrl-C kills that whole group
/// so nothing the daemon started outlives the CLI. Returns the exit code.
pub async fn run_attached(
    launch: &LaunchCommand,
    args: &[String],
    process: &dyn ProcessControl,
) -> Result<i32, DaemonError> {
    let mut cmd = base_command(launch, args);
    cmd.stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
    }

    let mut child = tokio::process::Command::from(cmd)
        .spawn()
        .map_err(spawn_error(launch))?;
    let pid = child.id().unwrap_or_default();
    tracing::debug!(pid, "Daemon running attached");

    let status = tokio::select! {
        status = child.wait() => status,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(pid, "Interrupted, killing daemon process group");
            process.kill_by_pid(pid);
            child.wait().await
        }
    };
    let status = status.map_err(spawn_error(launch))?;

    Ok(status.code().unwrap_or(1))
}

/// Last non-empty line of the daemon log, if there is one
pub fn last_log_line(path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    content
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_last_log_line_skips_blank_tail() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("daemon.log");
        std::fs::write(&path, "starting\nfailed to dial service\n\n").unwrap();
        assert_eq!(
            last_log_line(&path).as_deref(),
            Some("failed to dial service")
        );
    }

    #[test]
    fn test_last_log_line_missing_file() {
        assert_eq!(last_log_line(Path::new("/nonexistent/daemon.log")), None);
    }

    #[test]
    fn test_spawn_missing_program_is_spawn_error() {
        let launch = LaunchCommand {
            program: "/nonexistent/bctl-daemon".into(),
            leading_args: Vec::new(),
            cwd: None,
        };
        let err = spawn_detached(&launch, &[]).unwrap_err();
        assert!(matches!(err, DaemonError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_attached_returns_exit_code() {
        let launch = LaunchCommand {
            program: "sh".into(),
            leading_args: vec!["-c".into(), "exit 3".into()],
            cwd: None,
        };
        let code = run_attached(&launch, &[], &zl_core::SystemProcessControl)
            .await
            .unwrap();
        assert_eq!(code, 3);
    }

    #[cfg(unix)]
    #[test]
    fn test_detached_daemon_leads_its_own_session() {
        let launch = LaunchCommand {
            program: "sleep".into(),
            leading_args: Vec::new(),
            cwd: None,
        };
        let mut child = spawn_detached(&launch, &["30".to_string()]).unwrap();
        let pid = child.id() as libc::pid_t;

        // setsid runs before exec, so poll briefly for it to take effect
        let mut sid = -1;
        for _ in 0..50 {
            sid = unsafe { libc::getsid(pid) };
            if sid == pid {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        assert_eq!(sid, pid);

        zl_core::SystemProcessControl.kill_by_pid(child.id());
        child.wait().unwrap();
    }
}
