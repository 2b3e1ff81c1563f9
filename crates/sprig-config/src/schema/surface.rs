//! Native surface settings.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceConfig {
    /// Whether the background should be transparent.
    pub transparent: bool,
    /// Whether to enable dev tools (on by default in debug builds).
    pub devtools: bool,
    pub user_agent: Option<String>,
    pub clipboard: bool,
    pub autoplay: bool,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            transparent: false,
            devtools: cfg!(debug_assertions),
            user_agent: Some("Sprig/0.1".to_string()),
            clipboard: true,
            autoplay: false,
        }
    }
}
