//! UI dispatcher settings.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Maximum number of work items waiting for the UI thread
    /// (valid range: 1-1000000).
    pub queue_capacity: u32,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 4096,
        }
    }
}
