//! Tests for TOML config loading, creation, and path resolution.

use super::template::default_config_toml;
use super::*;
use crate::schema::{LogLevel, SprigConfig};
use std::path::Path;

#[test]
fn load_from_nonexistent_returns_file_not_found() {
    let result = load_from_path(Path::new("/tmp/nonexistent_sprig_config.toml"));
    assert!(matches!(
        result,
        Err(sprig_common::ConfigError::FileNotFound(_))
    ));
}

#[test]
fn load_valid_partial_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[origin]
scheme = "https"

[content]
root = "assets"

[logging]
level = "debug"
"#,
    )
    .unwrap();

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.origin.scheme, "https");
    assert_eq!(config.content.root, "assets");
    assert_eq!(config.logging.level, LogLevel::Debug);
    // Defaults preserved
    assert_eq!(config.origin.host, "0.0.0.0");
    assert_eq!(config.content.host_page, "index.html");
    assert_eq!(config.dispatcher.queue_capacity, 4096);
}

#[test]
fn load_invalid_toml_returns_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "this is not valid toml {{{").unwrap();

    let result = load_from_path(&path);
    assert!(matches!(
        result,
        Err(sprig_common::ConfigError::ParseError(_))
    ));
}

#[test]
fn load_config_with_invalid_values_falls_back_to_default() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[dispatcher]
queue_capacity = 0
"#,
    )
    .unwrap();

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.dispatcher.queue_capacity, 4096);
}

#[test]
fn create_and_load_default_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sprig").join("config.toml");

    create_default_config(&path).unwrap();
    assert!(path.exists());

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.origin.base_url(), "app://0.0.0.0/");
}

#[test]
fn create_default_config_keeps_an_existing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[dispatcher]\nqueue_capacity = 64\n").unwrap();

    create_default_config(&path).unwrap();

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.dispatcher.queue_capacity, 64);
}

#[test]
fn default_config_toml_is_valid() {
    let config: SprigConfig = toml::from_str(&default_config_toml()).unwrap();
    assert_eq!(config.startup.started_flag, "__sprigStarted");
}

#[test]
fn default_config_path_is_reasonable() {
    if let Ok(path) = default_config_path() {
        let path_str = path.to_string_lossy();
        assert!(path_str.contains("sprig"));
        assert!(path_str.ends_with("config.toml"));
    }
}
