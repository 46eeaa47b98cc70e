//! Configuration model.
//!
//! Loaded from `~/.config/stich/config.toml` by the infrastructure layer.
//! Every field has a default so partial files are valid.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use strum::{Display, EnumString};

/// How a message-log listener is fed when several entries land between two
/// dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MessageDelivery {
    /// Only the lexicographically-last entry is delivered; intermediate
    /// entries stay in the log but are not pushed.
    #[default]
    Latest,
    /// Every entry newer than the last one delivered is pushed, in key order.
    Every,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    /// Delay after each scripted phase.
    pub phase_delay_ms: u64,
    /// Delay after each synthetic file is produced.
    pub file_delay_ms: u64,
    /// How long listeners stay attached after a run finishes.
    pub teardown_grace_ms: u64,
    pub message_delivery: MessageDelivery,
    /// Cap on messages retained by a generation client. `None` keeps all.
    pub message_history_limit: Option<usize>,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            phase_delay_ms: 1000,
            file_delay_ms: 500,
            teardown_grace_ms: 5000,
            message_delivery: MessageDelivery::Latest,
            message_history_limit: None,
        }
    }
}

impl GenerationSettings {
    pub fn phase_delay(&self) -> Duration {
        Duration::from_millis(self.phase_delay_ms)
    }

    pub fn file_delay(&self) -> Duration {
        Duration::from_millis(self.file_delay_ms)
    }

    pub fn teardown_grace(&self) -> Duration {
        Duration::from_millis(self.teardown_grace_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Fallback filter when `RUST_LOG` is unset.
    pub level: String,
    /// Write to a daily rolling file under the logs directory instead of stderr.
    pub file: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: false,
        }
    }
}

/// Root of `config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RootConfig {
    pub generation: GenerationSettings,
    pub logging: LoggingSettings,
}
