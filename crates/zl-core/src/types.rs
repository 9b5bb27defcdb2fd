//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of local tunnel daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginType {
    /// Kubernetes API proxy
    Kube,
    /// Database TCP tunnel
    Db,
    /// Web (HTTP) tunnel
    Web,
}

impl PluginType {
    /// All plugin types, in teardown order
    pub const ALL: [PluginType; 3] = [PluginType::Kube, PluginType::Db, PluginType::Web];

    /// Name passed to the daemon via `-plugin`
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginType::Kube => "kube",
            PluginType::Db => "db",
            PluginType::Web => "web",
        }
    }
}

impl fmt::Display for PluginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PluginType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "kube" => Ok(PluginType::Kube),
            "db" => Ok(PluginType::Db),
            "web" => Ok(PluginType::Web),
            other => Err(format!(
                "unknown plugin type '{}', expected one of: kube, db, web",
                other
            )),
        }
    }
}
