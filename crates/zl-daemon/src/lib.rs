//! zl-daemon: Local tunnel daemon supervision
//!
//! Brings up exactly one daemon process per plugin type (kube, db, web),
//! confirms it is serving traffic, and tears it down again. The daemon
//! itself is an opaque external binary; this crate only stages it, builds
//! its command line, and watches it from the outside.

pub mod args;
pub mod error;
pub mod readiness;
pub mod spawn;
pub mod staging;
pub mod status;
pub mod supervisor;

pub use args::{DaemonSession, PluginArgs};
pub use error::DaemonError;
pub use staging::DaemonExecutable;
pub use status::DaemonStatus;
pub use supervisor::{DaemonRequest, DaemonSupervisor, StartOutcome, TargetDetails};
