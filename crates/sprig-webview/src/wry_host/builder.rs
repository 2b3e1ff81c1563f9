use std::borrow::Cow;

use sprig_common::BridgeError;
use sprig_config::schema::SurfaceConfig;
use tracing::{debug, warn};
use wry::http::{header, Response, StatusCode};
use wry::raw_window_handle::HasWindowHandle;
use wry::{Rect, WebViewBuilder};

use crate::content::Resolution;
use crate::manager::Surface;
use crate::transport::TRANSPORT_JS;

use super::{route_ipc, WryHost};

/// Renders a [`Surface`] as a `wry` webview.
///
/// Meant to be called from the `attach` closure of
/// [`BridgeManager::create_surface`](crate::BridgeManager::create_surface),
/// on the UI thread.
pub struct WrySurfaceBuilder<'a> {
    config: &'a SurfaceConfig,
    bounds: Option<Rect>,
}

impl<'a> WrySurfaceBuilder<'a> {
    pub fn new(config: &'a SurfaceConfig) -> Self {
        Self {
            config,
            bounds: None,
        }
    }

    /// Build as a child positioned at `bounds` instead of filling the window.
    pub fn with_bounds(mut self, bounds: Rect) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn build<W: HasWindowHandle>(
        &self,
        surface: &Surface<WryHost>,
        window: &W,
    ) -> Result<WryHost, BridgeError> {
        let key = WryHost::next_key();
        let origin = surface.origin();

        let mut builder = WebViewBuilder::new()
            .with_transparent(self.config.transparent)
            .with_devtools(self.config.devtools)
            .with_clipboard(self.config.clipboard)
            .with_autoplay(self.config.autoplay)
            .with_initialization_script(TRANSPORT_JS);

        if let Some(ua) = &self.config.user_agent {
            builder = builder.with_user_agent(ua);
        }

        // Resource requests under the virtual origin
        let resources = surface.clone();
        builder = builder.with_custom_protocol(origin.scheme().to_string(), move |_id, request| {
            let uri = request.uri().to_string();
            respond(resources.handle_resource(&uri))
        });

        // Navigation: serve in place, hand to the platform, or drop
        let navigations = surface.clone();
        builder = builder.with_navigation_handler(move |url| {
            navigations.handle_navigation(&url).allows_renderer()
        });

        // `target=_blank` and `window.open` never get a window of their own
        let popups = surface.clone();
        builder = builder.with_new_window_req_handler(move |url| {
            popups.handle_navigation(&url);
            false
        });

        let loads = surface.clone();
        builder = builder.with_on_page_load_handler(move |event, url| {
            let _ = loads.handle_page_load(event.into(), &url);
        });

        builder = builder.with_ipc_handler(move |request| route_ipc(key, request.body()));

        let webview = match self.bounds {
            Some(bounds) => builder.with_bounds(bounds).build_as_child(window),
            None => builder.build(window),
        }
        .map_err(|e| BridgeError::Host(e.to_string()))?;

        debug!(surface = %surface.id(), webview = key, "webview created");
        Ok(WryHost::register(webview, key, platform_rewrite(surface)))
    }
}

/// WebView2 serves custom schemes as `http://<scheme>.localhost/`.
#[cfg(windows)]
fn platform_rewrite(surface: &Surface<WryHost>) -> Option<(String, String)> {
    let origin = surface.origin();
    Some((
        origin.base_url(),
        format!("http://{}.localhost/", origin.scheme()),
    ))
}

#[cfg(not(windows))]
fn platform_rewrite(_surface: &Surface<WryHost>) -> Option<(String, String)> {
    None
}

fn respond(resolution: Resolution) -> Response<Cow<'static, [u8]>> {
    match resolution {
        Resolution::Found(found) => {
            let mut builder = Response::builder().status(found.status_code);
            for (name, value) in &found.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            builder.body(Cow::from(found.body)).unwrap_or_else(|e| {
                warn!(error = %e, "invalid response headers");
                status_only(StatusCode::INTERNAL_SERVER_ERROR)
            })
        }
        Resolution::Miss => Response::builder()
            .status(StatusCode::NOT_FOUND)
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Cow::from(b"Not Found".to_vec()))
            .unwrap_or_else(|_| status_only(StatusCode::NOT_FOUND)),
    }
}

fn status_only(status: StatusCode) -> Response<Cow<'static, [u8]>> {
    let mut response = Response::new(Cow::from(Vec::new()));
    *response.status_mut() = status;
    response
}
