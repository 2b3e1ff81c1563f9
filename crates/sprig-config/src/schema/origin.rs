//! Virtual origin settings.

use serde::{Deserialize, Serialize};

/// The synthetic authority content is served from.
///
/// Using an IP literal as the host keeps renderers from attempting a DNS
/// lookup before the request reaches the interceptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OriginConfig {
    pub scheme: String,
    pub host: String,
    /// Extra base URLs the platform may rewrite the origin to
    /// (e.g. `http://app.localhost/` on WebView2).
    pub aliases: Vec<String>,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            scheme: "app".into(),
            host: "0.0.0.0".into(),
            aliases: Vec::new(),
        }
    }
}

impl OriginConfig {
    /// `scheme://host/`
    pub fn base_url(&self) -> String {
        format!("{}://{}/", self.scheme, self.host)
    }
}
