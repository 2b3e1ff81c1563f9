use super::helpers::{is_js_identifier, is_uri_scheme};
use super::*;

#[test]
fn default_config_is_valid() {
    assert!(validate(&SprigConfig::default()).is_ok());
}

#[test]
fn scheme_syntax() {
    assert!(is_uri_scheme("app"));
    assert!(is_uri_scheme("ms-settings"));
    assert!(is_uri_scheme("coap+tcp"));
    assert!(!is_uri_scheme(""));
    assert!(!is_uri_scheme("1app"));
    assert!(!is_uri_scheme("my app"));
}

#[test]
fn js_identifier_syntax() {
    assert!(is_js_identifier("__sprigStarted"));
    assert!(is_js_identifier("$ready"));
    assert!(!is_js_identifier("9lives"));
    assert!(!is_js_identifier("a-b"));
    assert!(!is_js_identifier(""));
}

#[test]
fn bad_origin_is_reported() {
    let mut config = SprigConfig::default();
    config.origin.scheme = "not a scheme".into();
    config.origin.host = "0.0.0.0/x".into();
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("origin.scheme"));
    assert!(err.contains("origin.host"));
}

#[test]
fn host_page_must_stay_inside_root() {
    let mut config = SprigConfig::default();
    config.content.host_page = "../secrets.html".into();
    assert!(validate(&config).is_err());

    config.content.host_page = "/index.html".into();
    assert!(validate(&config).is_err());

    config.content.host_page = "pages/index.html".into();
    assert!(validate(&config).is_ok());
}

#[test]
fn start_path_must_be_absolute() {
    let mut config = SprigConfig::default();
    config.content.start_path = "counter".into();
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("content.start_path"));
}

#[test]
fn queue_capacity_range() {
    let mut config = SprigConfig::default();
    config.dispatcher.queue_capacity = 0;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("dispatcher.queue_capacity = 0 is out of range"));
}

#[test]
fn scheme_cannot_be_external_and_blocked() {
    let mut config = SprigConfig::default();
    config.navigation.external_schemes.push("file".into());
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("both external and blocked"));
}

#[test]
fn all_errors_are_collected() {
    let mut config = SprigConfig::default();
    config.dispatcher.queue_capacity = 0;
    config.startup.started_flag = "not-valid".into();
    config.content.root = "  ".into();
    let err = validate(&config).unwrap_err().to_string();
    assert_eq!(err.matches("; ").count(), 2);
}
