//! Default kube target groups
//!
//! `zli connect kube` without `-g` impersonates these groups.

use anyhow::{Context, Result};

use zl_core::PluginType;

use crate::context::CliContext;
use crate::output::{print_info, print_success};

/// Show or replace the default kube target groups
///
/// An empty `groups` list clears the defaults unless `view` is set.
pub async fn default_groups_command(
    ctx: &CliContext,
    groups: Vec<String>,
    view: bool,
) -> Result<u8> {
    let store = ctx.state_store();

    if view {
        let record = store.record(PluginType::Kube)?;
        println!("{}", describe_groups(&record.default_target_groups));
        return Ok(0);
    }

    let _lock = store
        .lock(PluginType::Kube, ctx.config.daemon.lock_timeout)
        .await
        .context("Failed to lock kube daemon state")?;
    let record = store
        .update(PluginType::Kube, |record| {
            record.default_target_groups = groups;
        })
        .await
        .context("Failed to save default target groups")?;

    if record.default_target_groups.is_empty() {
        print_info("Cleared default target groups");
    } else {
        print_success(&format!(
            "Default target groups set to: {}",
            describe_groups(&record.default_target_groups)
        ));
    }
    Ok(0)
}

fn describe_groups(groups: &[String]) -> String {
    if groups.is_empty() {
        "(none)".to_string()
    } else {
        groups.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_groups() {
        assert_eq!(describe_groups(&[]), "(none)");
        assert_eq!(
            describe_groups(&["devs".to_string(), "system:masters".to_string()]),
            "devs, system:masters"
        );
    }
}
