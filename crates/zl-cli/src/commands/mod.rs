//! CLI command implementations
//!
//! Commands return the process exit code on success; errors are printed by
//! `main` and exit with 1.

mod config;
mod connect;
mod default_groups;
mod disconnect;
mod refresh;
mod shell;
mod status;

pub use config::{config_get, config_init, config_set, config_show};
pub use connect::{connect_command, ConnectTarget, LocalOptions};
pub use default_groups::default_groups_command;
pub use disconnect::{disconnect_command, PluginSelection};
pub use refresh::refresh_command;
pub use shell::shell_command;
pub use status::status_command;
