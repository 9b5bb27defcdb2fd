//! Interactive session configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::duration_millis;

/// Configuration for interactive shell sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Address of the local connection bridge (JSON lines over TCP)
    pub bridge_address: String,

    /// Keyboard input batching
    pub batch: InputBatchConfig,

    /// Whether to collect keystroke latency samples
    pub metrics_enabled: bool,

    /// Connection node URL latency samples are posted to.
    /// Samples are only logged when unset.
    pub metrics_url: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            bridge_address: "127.0.0.1:7714".to_string(),
            batch: InputBatchConfig::default(),
            metrics_enabled: false,
            metrics_url: None,
        }
    }
}

/// Adaptive input batching parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputBatchConfig {
    /// Delay used for isolated keystrokes
    #[serde(with = "duration_millis")]
    pub min_delay: Duration,

    /// Gaps shorter than this count as a burst (paste)
    #[serde(with = "duration_millis")]
    pub burst_threshold: Duration,

    /// How much each burst input grows the delay
    #[serde(with = "duration_millis")]
    pub delay_step: Duration,

    /// Upper bound for the delay
    #[serde(with = "duration_millis")]
    pub max_delay: Duration,

    /// Maximum number of input chunks joined into one write
    pub max_chunks_per_write: usize,
}

impl Default for InputBatchConfig {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(1),
            burst_threshold: Duration::from_millis(5),
            delay_step: Duration::from_millis(5),
            max_delay: Duration::from_millis(101),
            max_chunks_per_write: 10_000,
        }
    }
}
