//! Locating and staging the daemon executable

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::error::DaemonError;

/// Environment variable pointing at a daemon source checkout
pub const CUSTOM_DAEMON_PATH_ENV: &str = "ZLI_CUSTOM_DAEMON_PATH";

/// File name of the bundled daemon binary for this platform
pub fn daemon_binary_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "bctl-daemon-windows.exe"
    } else if cfg!(target_os = "macos") {
        "bctl-daemon-macos"
    } else {
        "bctl-daemon-linux"
    }
}

/// Copy `source` into `staging_dir`, replacing any stale copy
///
/// The existing file is removed first so a running old binary (or a
/// read-only leftover) never blocks the write.
pub fn stage_executable(source: &Path, staging_dir: &Path) -> Result<PathBuf, DaemonError> {
    let staging_error = |source_err| DaemonError::Staging {
        source_path: source.to_path_buf(),
        source: source_err,
    };

    let file_name = source.file_name().ok_or_else(|| {
        staging_error(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "daemon path has no file name",
        ))
    })?;
    let dest = staging_dir.join(file_name);

    std::fs::create_dir_all(staging_dir).map_err(staging_error)?;
    let canonical_source = source.canonicalize().map_err(staging_error)?;
    if dest.canonicalize().ok().as_ref() == Some(&canonical_source) {
        // Already staged in place; removing dest would delete the source
        mark_executable(&dest).map_err(staging_error)?;
        tracing::debug!(dest = ?dest, "Daemon executable already in staging directory");
        return Ok(dest);
    }

    match std::fs::remove_file(&dest) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(staging_error(e)),
    }
    std::fs::copy(source, &dest).map_err(staging_error)?;
    mark_executable(&dest).map_err(staging_error)?;

    tracing::debug!(source = ?source, dest = ?dest, "Staged daemon executable");
    Ok(dest)
}

#[cfg(unix)]
fn mark_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn mark_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Where the daemon comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonExecutable {
    /// Bundled binary, copied beside the config file before each start
    Bundled {
        source_dir: PathBuf,
        staging_dir: PathBuf,
    },
    /// Daemon source checkout, run with `go run daemon.go`
    Source { dir: PathBuf },
}

/// Program, leading arguments and working directory for a daemon start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub program: PathBuf,
    pub leading_args: Vec<OsString>,
    pub cwd: Option<PathBuf>,
}

impl DaemonExecutable {
    /// Pick the executable, honouring `ZLI_CUSTOM_DAEMON_PATH`
    pub fn resolve(source_dir: PathBuf, staging_dir: PathBuf) -> Self {
        match std::env::var_os(CUSTOM_DAEMON_PATH_ENV) {
            Some(dir) if !dir.is_empty() => DaemonExecutable::Source {
                dir: PathBuf::from(dir),
            },
            _ => DaemonExecutable::Bundled {
                source_dir,
                staging_dir,
            },
        }
    }

    /// Stage (if needed) and return how to launch the daemon
    pub fn prepare(&self) -> Result<LaunchCommand, DaemonError> {
        match self {
            DaemonExecutable::Bundled {
                source_dir,
                staging_dir,
            } => {
                let staged = stage_executable(&source_dir.join(daemon_binary_name()), staging_dir)?;
                Ok(LaunchCommand {
                    program: staged,
                    leading_args: Vec::new(),
                    cwd: None,
                })
            }
            DaemonExecutable::Source { dir } => {
                tracing::warn!(dir = ?dir, "Running daemon from source checkout");
                Ok(LaunchCommand {
                    program: PathBuf::from("go"),
                    leading_args: vec!["run".into(), "daemon.go".into()],
                    cwd: Some(dir.clone()),
                })
            }
        }
    }
}
