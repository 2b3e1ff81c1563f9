//! The virtual origin: a synthetic authority that scopes local resolution.
//!
//! Nothing under the origin ever reaches a real network. Requests are matched
//! against the primary base URL (`app://0.0.0.0/` by default) and any aliases
//! the platform may rewrite custom schemes to.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use sprig_config::schema::OriginConfig;

/// Borrowed view over the pieces of an absolute URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UriParts<'a> {
    pub scheme: &'a str,
    pub authority: &'a str,
    /// Path including its leading `/`; empty when the URI has none.
    pub path: &'a str,
    pub query: Option<&'a str>,
}

/// Split `scheme://authority/path?query#fragment`.
///
/// Returns `None` for anything without a `scheme://` prefix.
pub fn split_uri(uri: &str) -> Option<UriParts<'_>> {
    let (scheme, rest) = uri.split_once("://")?;
    if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphanumeric() || "+-.".contains(c)) {
        return None;
    }
    let rest = rest.split('#').next().unwrap_or_default();
    let authority_end = rest.find(['/', '?']).unwrap_or(rest.len());
    let (authority, tail) = rest.split_at(authority_end);
    let (path, query) = match tail.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (tail, None),
    };
    Some(UriParts {
        scheme,
        authority,
        path,
        query,
    })
}

/// Drop the query string and fragment. Query strings are routing hints for
/// the embedded content, not part of an asset's identity.
pub fn remove_query_string(uri: &str) -> &str {
    let end = uri.find(['?', '#']).unwrap_or(uri.len());
    &uri[..end]
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Base {
    scheme: String,
    authority: String,
    path: String,
}

impl Base {
    fn parse(url: &str) -> Option<Self> {
        let parts = split_uri(url)?;
        let mut path = if parts.path.is_empty() {
            "/".to_string()
        } else {
            parts.path.to_string()
        };
        if !path.ends_with('/') {
            path.push('/');
        }
        Some(Self {
            scheme: parts.scheme.to_ascii_lowercase(),
            authority: parts.authority.to_ascii_lowercase(),
            path,
        })
    }

    /// The path below this base, or `None` when `parts` is elsewhere.
    fn strip<'a>(&self, parts: &UriParts<'a>) -> Option<&'a str> {
        if !parts.scheme.eq_ignore_ascii_case(&self.scheme)
            || !parts.authority.eq_ignore_ascii_case(&self.authority)
        {
            return None;
        }
        let path = if parts.path.is_empty() { "/" } else { parts.path };
        if let Some(rest) = path.strip_prefix(self.path.as_str()) {
            return Some(rest);
        }
        // `app://host/sub` is inside base `app://host/sub/`
        (path.len() + 1 == self.path.len() && self.path.starts_with(path)).then_some("")
    }
}

/// Synthetic authority plus the bundled content it serves.
#[derive(Debug, Clone)]
pub struct VirtualOrigin {
    primary: Base,
    aliases: Vec<Base>,
    content_root: PathBuf,
    host_page: String,
}

impl VirtualOrigin {
    pub fn new(
        scheme: &str,
        host: &str,
        content_root: impl Into<PathBuf>,
        host_page: impl Into<String>,
    ) -> Self {
        Self {
            primary: Base {
                scheme: scheme.to_ascii_lowercase(),
                authority: host.to_ascii_lowercase(),
                path: "/".into(),
            },
            aliases: Vec::new(),
            content_root: content_root.into(),
            host_page: host_page.into().trim_start_matches('/').replace('\\', "/"),
        }
    }

    pub fn from_config(
        config: &OriginConfig,
        content_root: impl Into<PathBuf>,
        host_page: impl Into<String>,
    ) -> Self {
        config
            .aliases
            .iter()
            .fold(Self::new(&config.scheme, &config.host, content_root, host_page), |o, a| {
                o.with_alias(a)
            })
    }

    /// Accept `base_url` as another spelling of this origin.
    ///
    /// Unparseable aliases are ignored.
    pub fn with_alias(mut self, base_url: &str) -> Self {
        match Base::parse(base_url) {
            Some(base) if base != self.primary && !self.aliases.contains(&base) => {
                self.aliases.push(base);
            }
            Some(_) => {}
            None => tracing::warn!(alias = base_url, "ignoring unparseable origin alias"),
        }
        self
    }

    pub fn scheme(&self) -> &str {
        &self.primary.scheme
    }

    pub fn host(&self) -> &str {
        &self.primary.authority
    }

    /// `scheme://host/`
    pub fn base_url(&self) -> String {
        format!("{}://{}/", self.primary.scheme, self.primary.authority)
    }

    pub fn content_root(&self) -> &Path {
        &self.content_root
    }

    /// Host page path relative to the content root, `/`-separated.
    pub fn host_page(&self) -> &str {
        &self.host_page
    }

    /// Absolute URL for a path inside the origin.
    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path.trim_start_matches('/'))
    }

    fn strip<'a>(&self, parts: &UriParts<'a>) -> Option<&'a str> {
        std::iter::once(&self.primary)
            .chain(&self.aliases)
            .find_map(|base| base.strip(parts))
    }

    /// Whether `uri` is within this origin.
    pub fn contains(&self, uri: &str) -> bool {
        split_uri(uri).is_some_and(|parts| self.strip(&parts).is_some())
    }

    /// Whether `uri` is a page navigation inside the origin, i.e. its last
    /// path segment carries no file extension.
    pub fn is_page(&self, uri: &str) -> bool {
        let Some(parts) = split_uri(uri) else {
            return false;
        };
        let Some(rest) = self.strip(&parts) else {
            return false;
        };
        let last = rest.rsplit('/').next().unwrap_or_default();
        !has_extension(last)
    }

    /// Decoded path of `uri` relative to the origin root, without a leading
    /// slash. `None` when `uri` is outside the origin or not valid UTF-8
    /// after percent-decoding.
    pub fn relative_path(&self, uri: &str) -> Option<String> {
        let parts = split_uri(uri)?;
        let rest = self.strip(&parts)?;
        let decoded: Cow<'_, str> = urlencoding::decode(rest).ok()?;
        Some(decoded.trim_start_matches('/').to_string())
    }
}

fn has_extension(segment: &str) -> bool {
    segment
        .rfind('.')
        .is_some_and(|dot| dot + 1 < segment.len())
}
