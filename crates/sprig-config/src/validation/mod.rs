//! Full configuration validation.
//!
//! Each section is checked independently and every problem is collected
//! into a single `ConfigError`.

mod helpers;

#[cfg(test)]
mod tests;

use crate::schema::SprigConfig;
use sprig_common::ConfigError;

use helpers::{is_js_identifier, is_uri_scheme, validate_range};

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &SprigConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    validate_origin(&mut errors, config);
    validate_content(&mut errors, config);
    validate_navigation(&mut errors, config);

    validate_range(
        &mut errors,
        "dispatcher.queue_capacity",
        config.dispatcher.queue_capacity,
        1,
        1_000_000,
    );

    if !is_js_identifier(&config.startup.started_flag) {
        errors.push(format!(
            "startup.started_flag = {:?} is not a valid JavaScript identifier",
            config.startup.started_flag
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}

fn validate_origin(errors: &mut Vec<String>, config: &SprigConfig) {
    let origin = &config.origin;
    if !is_uri_scheme(&origin.scheme) {
        errors.push(format!("origin.scheme = {:?} is not a valid URI scheme", origin.scheme));
    }
    if origin.host.is_empty() || origin.host.contains(['/', '?', '#', ' ']) {
        errors.push(format!("origin.host = {:?} is not a bare host", origin.host));
    }
    for alias in &origin.aliases {
        if !alias.contains("://") {
            errors.push(format!("origin.aliases entry {alias:?} is not an absolute URL"));
        }
    }
}

fn validate_content(errors: &mut Vec<String>, config: &SprigConfig) {
    let content = &config.content;
    if content.root.trim().is_empty() {
        errors.push("content.root is empty".into());
    }
    let page = &content.host_page;
    if page.is_empty() {
        errors.push("content.host_page is empty".into());
    } else if page.starts_with('/') || page.starts_with('\\') {
        errors.push(format!("content.host_page = {page:?} must be relative"));
    } else if page.split(['/', '\\']).any(|seg| seg == "..") {
        errors.push(format!("content.host_page = {page:?} must stay inside content.root"));
    }
    if !content.start_path.starts_with('/') {
        errors.push(format!(
            "content.start_path = {:?} must start with '/'",
            content.start_path
        ));
    }
}

fn validate_navigation(errors: &mut Vec<String>, config: &SprigConfig) {
    let nav = &config.navigation;
    for scheme in nav.external_schemes.iter().chain(&nav.blocked_schemes) {
        if !is_uri_scheme(scheme) {
            errors.push(format!("navigation scheme {scheme:?} is not a valid URI scheme"));
        }
    }
    if let Some(both) = nav
        .external_schemes
        .iter()
        .find(|s| nav.blocked_schemes.iter().any(|b| b.eq_ignore_ascii_case(s)))
    {
        errors.push(format!(
            "navigation scheme {both:?} is both external and blocked"
        ));
    }
}
