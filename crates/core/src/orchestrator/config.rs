//! Orchestrator configuration.

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::file::{NotificationLog, DEFAULT_TEMPLATE};

/// Configuration for the conversion orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Download filename template (`%name%`, `%date%`, `%extension%`).
    #[serde(default = "default_filename_format")]
    pub filename_format: String,

    /// How many user-facing notifications are kept.
    #[serde(default = "default_notification_capacity")]
    pub notification_capacity: usize,
}

fn default_filename_format() -> String {
    DEFAULT_TEMPLATE.to_string()
}

fn default_notification_capacity() -> usize {
    NotificationLog::DEFAULT_CAPACITY
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            filename_format: default_filename_format(),
            notification_capacity: default_notification_capacity(),
        }
    }
}

impl From<&Config> for OrchestratorConfig {
    fn from(config: &Config) -> Self {
        Self {
            filename_format: config.conversion.filename_format.clone(),
            ..Self::default()
        }
    }
}
