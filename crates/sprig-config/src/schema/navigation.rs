//! Navigation interception settings.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    /// Hand out-of-origin links to the platform at all.
    pub allow_external: bool,
    /// Schemes the system opener has a handler for.
    pub external_schemes: Vec<String>,
    /// Schemes that are never handed to the platform.
    pub blocked_schemes: Vec<String>,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            allow_external: true,
            external_schemes: vec![
                "http".into(),
                "https".into(),
                "mailto".into(),
                "tel".into(),
            ],
            blocked_schemes: vec![
                "javascript".into(),
                "data".into(),
                "file".into(),
                "blob".into(),
                "about".into(),
            ],
        }
    }
}
