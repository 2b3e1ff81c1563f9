//! Sprig configuration system.
//!
//! TOML-based configuration for the hybrid content bridge. Every section
//! has defaults, so an empty or partial file is a valid config.

pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::SprigConfig;

use sprig_common::ConfigError;

/// Load config from the platform default path, creating it if missing.
pub fn load_config() -> Result<SprigConfig, ConfigError> {
    let config = toml_loader::load_default()?;
    validation::validate(&config)?;
    Ok(config)
}
