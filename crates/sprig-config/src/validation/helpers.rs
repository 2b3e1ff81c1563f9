//! Shared validation helpers.

use std::sync::OnceLock;

use regex::Regex;

/// Push an error if `value` is outside `[min, max]`.
pub(crate) fn validate_range(errors: &mut Vec<String>, name: &str, value: u32, min: u32, max: u32) {
    if value < min || value > max {
        errors.push(format!("{name} = {value} is out of range [{min}, {max}]"));
    }
}

/// RFC 3986 scheme: a letter followed by letters, digits, `+`, `-` or `.`.
pub(crate) fn is_uri_scheme(s: &str) -> bool {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(s))
}

pub(crate) fn is_js_identifier(s: &str) -> bool {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(s))
}
