//! Bundled content settings.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    /// Directory holding the bundled assets.
    pub root: String,
    /// Entry document, relative to `root`.
    pub host_page: String,
    /// Path navigated to once the surface is created.
    pub start_path: String,
    /// `Cache-Control` header attached to every served asset.
    pub cache_control: String,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            root: "wwwroot".into(),
            host_page: "index.html".into(),
            start_path: "/".into(),
            cache_control: "no-cache, max-age=0, must-revalidate, no-store".into(),
        }
    }
}
