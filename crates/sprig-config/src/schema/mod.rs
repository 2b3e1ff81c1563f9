//! Configuration schema types for sprig.
//!
//! All structs use `serde(default)` so partial configs work correctly.

mod content;
mod dispatcher;
mod navigation;
mod origin;
mod startup;
mod surface;
mod system;

pub use content::*;
pub use dispatcher::*;
pub use navigation::*;
pub use origin::*;
pub use startup::*;
pub use surface::*;
pub use system::*;

use serde::{Deserialize, Serialize};

/// Top-level bridge configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SprigConfig {
    pub origin: OriginConfig,
    pub content: ContentConfig,
    pub navigation: NavigationConfig,
    pub dispatcher: DispatcherConfig,
    pub startup: StartupConfig,
    pub surface: SurfaceConfig,
    pub logging: LoggingConfig,
}
