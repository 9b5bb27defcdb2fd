//! Disconnect command implementation

use std::str::FromStr;

use anyhow::{Context, Result};

use zl_core::PluginType;

use crate::context::CliContext;
use crate::output::{print_info, print_success};

/// `all` or a single plugin type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginSelection {
    All,
    One(PluginType),
}

impl PluginSelection {
    pub fn plugins(&self) -> Vec<PluginType> {
        match self {
            PluginSelection::All => PluginType::ALL.to_vec(),
            PluginSelection::One(plugin) => vec![*plugin],
        }
    }
}

impl FromStr for PluginSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("all") {
            return Ok(PluginSelection::All);
        }
        PluginType::from_str(s).map(PluginSelection::One)
    }
}

/// Execute the disconnect command
pub async fn disconnect_command(ctx: &CliContext, selection: PluginSelection) -> Result<u8> {
    let supervisor = ctx.supervisor()?;

    let mut stopped = 0;
    for plugin in selection.plugins() {
        let cleared = supervisor
            .teardown(plugin)
            .await
            .with_context(|| format!("Failed to stop {} daemon", plugin))?;
        if cleared {
            print_success(&format!("Stopped {} daemon", plugin));
            stopped += 1;
        }
    }

    if stopped == 0 {
        print_info("No running daemons");
    }
    Ok(0)
}
