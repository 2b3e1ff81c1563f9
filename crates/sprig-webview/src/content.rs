//! Local content serving for the virtual origin.
//!
//! The renderer never reaches a network for origin URLs: every request is
//! resolved against an index of the bundled content root built once when the
//! provider is created. Because only indexed files can be served, `..`,
//! absolute paths and symlinks pointing outside the root never resolve.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::origin::{remove_query_string, VirtualOrigin};

pub const DEFAULT_CACHE_CONTROL: &str = "no-cache, max-age=0, must-revalidate, no-store";

/// A fetch issued by the renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRequest {
    pub uri: String,
    /// Serve the host page on a miss (client-side routing). Only set for page
    /// navigations inside the origin, never for sub-resource fetches.
    pub allow_fallback_to_host_page: bool,
}

impl ResourceRequest {
    /// Build a request for `uri`, deriving the fallback flag from the origin.
    pub fn for_uri(origin: &VirtualOrigin, uri: impl Into<String>) -> Self {
        let uri = uri.into();
        let allow_fallback_to_host_page = origin.is_page(&uri);
        Self {
            uri,
            allow_fallback_to_host_page,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceResponse {
    pub status_code: u16,
    pub status_message: String,
    pub content_type: String,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

/// Outcome of resolving a request against the virtual origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found(ResourceResponse),
    /// Not an error: the renderer should treat it as an ordinary failed fetch.
    Miss,
}

impl Resolution {
    pub fn is_miss(&self) -> bool {
        matches!(self, Self::Miss)
    }

    pub fn response(&self) -> Option<&ResourceResponse> {
        match self {
            Self::Found(response) => Some(response),
            Self::Miss => None,
        }
    }
}

/// Serves the bundled content root under the virtual origin.
///
/// Immutable once shared; concurrent `resolve` calls need no locking.
pub struct VirtualOriginResourceProvider {
    origin: VirtualOrigin,
    /// Relative `/`-separated path -> file on disk.
    index: HashMap<String, PathBuf>,
    /// In-memory overrides (for dynamically generated content).
    overrides: HashMap<String, (String, Vec<u8>)>, // path -> (mime, data)
    cache_control: String,
}

impl VirtualOriginResourceProvider {
    /// Index the origin's content root.
    ///
    /// A missing or unreadable root yields an empty index rather than an
    /// error: every request then misses, which the renderer handles as a
    /// failed fetch.
    pub fn new(origin: VirtualOrigin) -> Self {
        let index = build_index(origin.content_root());
        debug!(
            root = %origin.content_root().display(),
            assets = index.len(),
            "content root indexed"
        );
        Self {
            origin,
            index,
            overrides: HashMap::new(),
            cache_control: DEFAULT_CACHE_CONTROL.to_string(),
        }
    }

    pub fn with_cache_control(mut self, value: impl Into<String>) -> Self {
        self.cache_control = value.into();
        self
    }

    /// Register an in-memory asset override.
    pub fn add_override(
        &mut self,
        path: impl Into<String>,
        mime: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) {
        let path = path.into();
        self.overrides.insert(
            path.trim_start_matches('/').to_string(),
            (mime.into(), data.into()),
        );
    }

    pub fn origin(&self) -> &VirtualOrigin {
        &self.origin
    }

    /// Number of files found under the content root.
    pub fn asset_count(&self) -> usize {
        self.index.len()
    }

    pub fn contains_asset(&self, relative_path: &str) -> bool {
        let key = relative_path.trim_start_matches('/');
        self.overrides.contains_key(key) || self.index.contains_key(key)
    }

    /// Resolve a renderer request.
    pub fn resolve(&self, request: &ResourceRequest) -> Resolution {
        let uri = remove_query_string(&request.uri);
        let Some(path) = self.origin.relative_path(uri) else {
            return Resolution::Miss;
        };

        if let Some(response) = self.lookup(&path) {
            return Resolution::Found(response);
        }

        if request.allow_fallback_to_host_page {
            let host_page = self.origin.host_page();
            debug!(path = %path, host_page, "falling back to host page");
            if let Some(response) = self.lookup(host_page) {
                return Resolution::Found(response);
            }
            warn!(host_page, "host page is missing from the content root");
        }

        Resolution::Miss
    }

    fn lookup(&self, path: &str) -> Option<ResourceResponse> {
        if let Some((mime, data)) = self.overrides.get(path) {
            return Some(self.respond(mime, data.clone()));
        }

        let file = self.index.get(path)?;
        match std::fs::read(file) {
            Ok(data) => Some(self.respond(mime_from_extension(file), data)),
            Err(e) => {
                warn!(path, error = %e, "indexed asset could not be read");
                None
            }
        }
    }

    fn respond(&self, mime: &str, body: Vec<u8>) -> ResourceResponse {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), mime.to_string());
        headers.insert("Content-Length".to_string(), body.len().to_string());
        headers.insert("Cache-Control".to_string(), self.cache_control.clone());
        headers.insert(
            "Access-Control-Allow-Origin".to_string(),
            self.origin.base_url().trim_end_matches('/').to_string(),
        );
        ResourceResponse {
            status_code: 200,
            status_message: "OK".to_string(),
            content_type: mime.to_string(),
            headers,
            body,
        }
    }
}

/// Walk `root` and map every regular file to its relative path.
fn build_index(root: &Path) -> HashMap<String, PathBuf> {
    let mut index = HashMap::new();
    let Ok(canonical_root) = std::fs::canonicalize(root) else {
        warn!(root = %root.display(), "content root does not exist");
        return index;
    };

    let mut pending = vec![canonical_root.clone()];
    while let Some(dir) = pending.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "skipping unreadable directory");
                continue;
            }
        };
        for entry in entries.flatten() {
            // Resolve symlinks and drop anything that escapes the root.
            let Ok(path) = std::fs::canonicalize(entry.path()) else {
                continue;
            };
            if !path.starts_with(&canonical_root) {
                debug!(path = %entry.path().display(), "skipping link outside content root");
                continue;
            }
            if path.is_dir() {
                // A link back into the tree would otherwise loop forever.
                if entry.file_type().is_ok_and(|t| !t.is_symlink()) {
                    pending.push(path);
                }
            } else if path.is_file() {
                let Ok(relative) = entry.path().strip_prefix(&canonical_root).map(Path::to_path_buf)
                else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                index.insert(key, path);
            }
        }
    }
    index
}

/// Guess MIME type from file extension.
fn mime_from_extension(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js") | Some("mjs") => "text/javascript; charset=utf-8",
        Some("json") | Some("map") => "application/json",
        Some("wasm") => "application/wasm",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        Some("webp") => "image/webp",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",
        Some("otf") => "font/otf",
        Some("mp3") => "audio/mpeg",
        Some("ogg") => "audio/ogg",
        Some("wav") => "audio/wav",
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        Some("txt") => "text/plain; charset=utf-8",
        Some("xml") => "application/xml",
        _ => "application/octet-stream",
    }
}
