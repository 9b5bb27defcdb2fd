//! zli
//!
//! Local runtime for access broker targets:
//! - Tunnel daemons for kube, db and web targets (connect, disconnect, status)
//! - Interactive shells on remote connections
//! - Configuration management

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use zl_cli::commands::{self, ConnectTarget, PluginSelection};
use zl_cli::context::CliContext;
use zl_cli::output::print_error;
use zl_core::config::resolve_config_path;
use zl_core::PluginType;

#[derive(Parser)]
#[command(name = "zli")]
#[command(author, version, about = "Local runtime for access broker tunnels and shells")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a local tunnel daemon for a target
    Connect {
        #[command(subcommand)]
        target: ConnectTarget,
    },

    /// Stop local tunnel daemons
    Disconnect {
        /// kube, db, web or all
        #[arg(default_value = "all")]
        target: PluginSelection,
    },

    /// Show local tunnel daemon status
    Status {
        /// Only this plugin (kube, db or web)
        plugin: Option<PluginType>,
    },

    /// Open an interactive shell on a remote connection
    /// Alias: attach
    #[command(alias = "attach")]
    Shell {
        /// Connection id to attach to
        connection_id: String,
    },

    /// Set the kube groups used when `connect kube` names none
    /// Alias: default-groups
    #[command(name = "default-target-group", alias = "default-groups")]
    DefaultTargetGroup {
        /// Kube group (repeatable); none clears the defaults
        #[arg(short, long = "group")]
        groups: Vec<String>,

        /// Show the current default groups instead of setting them
        #[arg(long, conflicts_with = "groups")]
        view: bool,
    },

    /// Print the id token daemons use to refresh their session
    Refresh,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Get specific config value
    Get { key: String },
    /// Set config value
    Set { key: String, value: String },
    /// Write the default configuration
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
    /// Show config file path
    Path,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    // stdout carries session output, so logs go to stderr
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            print_error(&format!("{:#}", e));
            1
        }
    };

    // Exit directly: a blocking stdin read may still be parked on the runtime
    std::process::exit(i32::from(code));
}

async fn run(cli: Cli) -> Result<u8> {
    // Config commands must work even when the file does not parse
    if let Commands::Config { action } = cli.command {
        let path = resolve_config_path(cli.config.as_deref());
        return match action {
            ConfigAction::Show => commands::config_show(&path),
            ConfigAction::Get { key } => commands::config_get(&path, &key),
            ConfigAction::Set { key, value } => commands::config_set(&path, &key, &value),
            ConfigAction::Init { force } => commands::config_init(&path, force),
            ConfigAction::Path => {
                println!("{}", path.display());
                Ok(0)
            }
        };
    }

    let ctx = CliContext::load(cli.config.as_deref())?;
    match cli.command {
        Commands::Connect { target } => commands::connect_command(&ctx, target).await,
        Commands::Disconnect { target } => commands::disconnect_command(&ctx, target).await,
        Commands::Status { plugin } => commands::status_command(&ctx, plugin).await,
        Commands::Shell { connection_id } => commands::shell_command(&ctx, &connection_id).await,
        Commands::DefaultTargetGroup { groups, view } => {
            commands::default_groups_command(&ctx, groups, view).await
        }
        Commands::Refresh => commands::refresh_command(&ctx),
        Commands::Config { .. } => Ok(0),
    }
}
