//! Cross-platform process utilities
//!
//! Killing daemons and finding whatever holds a local port are the only
//! OS-specific operations the supervisor needs. They sit behind the
//! [`ProcessControl`] trait so supervisor logic can be exercised without
//! touching real processes.
//!
//! None of the kill operations fail: a process that is already gone is the
//! common case, so failures are logged at warn level and otherwise ignored.

use std::process::Command;

/// Capability interface over OS process control
pub trait ProcessControl: Send + Sync {
    /// Check if a process with the given PID is still alive
    fn is_alive(&self, pid: u32) -> bool;

    /// Hard-kill a process (and the process group it leads, if any)
    fn kill_by_pid(&self, pid: u32);

    /// PIDs of processes listening on a local TCP port
    fn pids_on_port(&self, port: u16) -> Vec<u32>;

    /// Kill every process listening on `port`, tracked by us or not
    fn sweep_port(&self, port: u16) {
        let own_pid = std::process::id();
        for pid in self.pids_on_port(port) {
            if pid == own_pid {
                continue;
            }
            tracing::debug!(pid, port, "Killing process bound to port");
            self.kill_by_pid(pid);
        }
    }
}

/// [`ProcessControl`] backed by the host operating system
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcessControl;

impl ProcessControl for SystemProcessControl {
    fn is_alive(&self, pid: u32) -> bool {
        is_process_alive(pid)
    }

    fn kill_by_pid(&self, pid: u32) {
        if pid == 0 {
            tracing::warn!("Refusing to kill pid 0");
            return;
        }
        if let Err(e) = kill_process(pid) {
            tracing::warn!(
                pid,
                "Attempt to kill daemon process failed; this is expected if it already exited: {}",
                e
            );
        }
    }

    fn pids_on_port(&self, port: u16) -> Vec<u32> {
        match list_port_pids(port) {
            Ok(pids) => pids,
            Err(e) => {
                tracing::warn!(port, "Failed to enumerate processes on port: {}", e);
                Vec::new()
            }
        }
    }
}

/// Check if a process with the given PID is still alive
///
/// On Unix, uses kill(pid, 0) to check if the process exists.
/// On Windows, uses OpenProcess to check if the process exists.
#[cfg(unix)]
pub fn is_process_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // ESRCH means gone; EPERM means it exists but belongs to someone else
    unsafe {
        if libc::kill(pid, 0) == 0 {
            return true;
        }
        let err = std::io::Error::last_os_error();
        err.raw_os_error() == Some(libc::EPERM)
    }
}

#[cfg(windows)]
pub fn is_process_alive(pid: u32) -> bool {
    use std::ptr;
    use windows_sys::Win32::Foundation::{CloseHandle, INVALID_HANDLE_VALUE};
    use windows_sys::Win32::System::Threading::{OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION};

    unsafe {
        let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
        if handle == INVALID_HANDLE_VALUE || handle == ptr::null_mut() {
            return false;
        }
        CloseHandle(handle);
        true
    }
}

#[cfg(unix)]
fn kill_process(pid: u32) -> std::io::Result<()> {
    let pid = libc::pid_t::try_from(pid)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    // Daemons are spawned as session leaders, so their pid is also their
    // process group id. Plain pids (e.g. found via port sweep) fall through.
    let rc = unsafe { libc::kill(-pid, libc::SIGKILL) };
    if rc == 0 {
        return Ok(());
    }
    let rc = unsafe { libc::kill(pid, libc::SIGKILL) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(windows)]
fn kill_process(pid: u32) -> std::io::Result<()> {
    let output = Command::new("taskkill")
        .args(["/F", "/T", "/PID", &pid.to_string()])
        .output()?;
    if output.status.success() {
        Ok(())
    } else {
        Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ))
    }
}

#[cfg(unix)]
fn list_port_pids(port: u16) -> std::io::Result<Vec<u32>> {
    let output = match Command::new("lsof")
        .args(["-t", &format!("-iTCP:{}", port), "-sTCP:LISTEN"])
        .output()
    {
        Ok(output) => output,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("lsof not installed, skipping port sweep");
            return Ok(Vec::new());
        }
        Err(e) => return Err(e),
    };
    // lsof exits 1 when nothing matches
    Ok(parse_lsof_pids(&String::from_utf8_lossy(&output.stdout)))
}

#[cfg(windows)]
fn list_port_pids(port: u16) -> std::io::Result<Vec<u32>> {
    let output = Command::new("netstat").args(["-ano", "-p", "tcp"]).output()?;
    Ok(parse_netstat_listeners(
        &String::from_utf8_lossy(&output.stdout),
        port,
    ))
}

/// Parse `lsof -t` output: one pid per line
pub fn parse_lsof_pids(output: &str) -> Vec<u32> {
    let mut pids: Vec<u32> = output
        .lines()
        .filter_map(|line| line.trim().parse().ok())
        .collect();
    pids.sort_unstable();
    pids.dedup();
    pids
}

/// Parse `netstat -ano -p tcp` output for listeners on `port`
///
/// Lines look like `TCP    127.0.0.1:9000    0.0.0.0:0    LISTENING    4242`.
pub fn parse_netstat_listeners(output: &str, port: u16) -> Vec<u32> {
    let suffix = format!(":{}", port);
    let mut pids: Vec<u32> = output
        .lines()
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            match cols.as_slice() {
                [proto, local, _remote, state, pid]
                    if proto.eq_ignore_ascii_case("tcp")
                        && local.ends_with(&suffix)
                        && state.eq_ignore_ascii_case("listening") =>
                {
                    pid.parse().ok()
                }
                _ => None,
            }
        })
        .filter(|pid| *pid != 0)
        .collect();
    pids.sort_unstable();
    pids.dedup();
    pids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_process_is_alive() {
        let pid = std::process::id();
        assert!(is_process_alive(pid));
    }

    #[test]
    fn test_invalid_pid_not_alive() {
        // Use a very high PID that's unlikely to be a real process
        assert!(!is_process_alive(999999999));
    }

    #[test]
    fn test_kill_missing_pid_does_not_panic() {
        let control = SystemProcessControl;
        control.kill_by_pid(999999999);
        control.kill_by_pid(999999999);
    }

    #[test]
    fn test_sweep_unused_port_is_noop() {
        let port = crate::port::find_free_port("127.0.0.1").unwrap();
        SystemProcessControl.sweep_port(port);
        SystemProcessControl.sweep_port(port);
        assert!(crate::port::is_port_available("127.0.0.1", port));
    }

    #[cfg(unix)]
    #[test]
    fn test_kill_by_pid_terminates_child() {
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        let pid = child.id();
        assert!(is_process_alive(pid));

        SystemProcessControl.kill_by_pid(pid);
        let status = child.wait().unwrap();
        assert!(!status.success());
    }

    #[test]
    fn test_parse_lsof_pids() {
        assert_eq!(parse_lsof_pids("123\n456\n123\n"), vec![123, 456]);
        assert!(parse_lsof_pids("").is_empty());
    }

    #[test]
    fn test_parse_netstat_listeners() {
        let output = "\
Active Connections

  Proto  Local Address          Foreign Address        State           PID
  TCP    0.0.0.0:135            0.0.0.0:0              LISTENING       1000
  TCP    127.0.0.1:9000         0.0.0.0:0              LISTENING       4242
  TCP    127.0.0.1:9000         127.0.0.1:51000        ESTABLISHED     4242
  TCP    127.0.0.1:51000        127.0.0.1:9000         ESTABLISHED     7
  TCP    [::1]:9000             [::]:0                 LISTENING       4243
  TCP    127.0.0.1:19000        0.0.0.0:0              LISTENING       5000
";
        assert_eq!(parse_netstat_listeners(output, 9000), vec![4242, 4243]);
        assert!(parse_netstat_listeners(output, 8080).is_empty());
    }

    struct RecordingControl {
        own_and_other: Vec<u32>,
        killed: std::sync::Mutex<Vec<u32>>,
    }

    impl ProcessControl for RecordingControl {
        fn is_alive(&self, _pid: u32) -> bool {
            false
        }
        fn kill_by_pid(&self, pid: u32) {
            self.killed.lock().unwrap().push(pid);
        }
        fn pids_on_port(&self, _port: u16) -> Vec<u32> {
            self.own_and_other.clone()
        }
    }

    #[test]
    fn test_sweep_never_kills_self() {
        let control = RecordingControl {
            own_and_other: vec![std::process::id(), 4242],
            killed: std::sync::Mutex::new(Vec::new()),
        };
        control.sweep_port(9000);
        assert_eq!(*control.killed.lock().unwrap(), vec![4242]);
    }
}
