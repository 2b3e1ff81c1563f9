//! Startup handshake settings.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StartupConfig {
    /// Name of the `window` flag set once content has been started.
    pub started_flag: String,
    /// Script that starts the embedded application.
    pub start_script: String,
    /// Reload the page when it is restored from the back/forward cache.
    pub reload_on_pageshow: bool,
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            started_flag: "__sprigStarted".into(),
            start_script: "window.dispatchEvent(new Event('sprig:start'));".into(),
            reload_on_pageshow: true,
        }
    }
}
