//! Native renderer backend on top of `wry`.
//!
//! `wry::WebView` is neither `Send` nor `Sync`, so webviews live in a
//! registry local to the UI thread and [`WryHost`] only carries a key into
//! it. Every [`ContentHost`] call runs on the UI thread (it is scheduled
//! through the dispatcher), which is the only thread that can see the
//! registry.
//!
//! wry has no native `MessageChannel`; ports are emulated with the
//! [`transport`](crate::transport) shim.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::thread::ThreadId;

use sprig_common::BridgeError;
use tracing::{debug, trace, warn};
use wry::WebView;

use crate::host::{ContentHost, MessagePort, PortReceiver, Script, ScriptCallback};
use crate::transport::{self, IpcEnvelope};

mod builder;

pub use builder::WrySurfaceBuilder;

static NEXT_KEY: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static WEBVIEWS: RefCell<HashMap<u64, WebView>> = RefCell::new(HashMap::new());
    static RECEIVERS: RefCell<HashMap<(u64, u64), PortReceiver>> = RefCell::new(HashMap::new());
}

fn with_webview<T>(
    key: u64,
    f: impl FnOnce(&WebView) -> Result<T, wry::Error>,
) -> Result<T, BridgeError> {
    WEBVIEWS.with(|webviews| {
        let webviews = webviews.borrow();
        let webview = webviews.get(&key).ok_or(BridgeError::SurfaceGone)?;
        f(webview).map_err(|e| BridgeError::Host(e.to_string()))
    })
}

/// Route an IPC body from webview `key` to the host end of its port.
pub(crate) fn route_ipc(key: u64, body: &str) {
    let envelope = match IpcEnvelope::parse(body) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(webview = key, body_len = body.len(), error = %e, "IPC message rejected");
            return;
        }
    };
    let Some(port) = envelope.port else {
        debug!(webview = key, "default transport message from content ignored");
        return;
    };

    let receiver = RECEIVERS.with(|r| r.borrow_mut().remove(&(key, port)));
    let Some(mut receiver) = receiver else {
        debug!(webview = key, port, "message for a port without receiver dropped");
        return;
    };
    trace!(webview = key, port, len = envelope.data.len(), "message from content");
    receiver(envelope.data);
    // The receiver may have been replaced or the port dropped meanwhile.
    RECEIVERS.with(|r| {
        r.borrow_mut().entry((key, port)).or_insert(receiver);
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Host,
    Content,
}

/// One end of an emulated channel.
#[derive(Debug)]
pub struct WryPort {
    webview: u64,
    id: u64,
    side: Side,
}

impl MessagePort for WryPort {
    fn post(&self, message: &str) -> Result<(), BridgeError> {
        match self.side {
            Side::Host => {
                let script = transport::deliver_script(self.id, message);
                with_webview(self.webview, |wv| wv.evaluate_script(&script))
            }
            // The content end lives in the page; this handle only names it.
            Side::Content => Err(BridgeError::ProtocolMisuse(
                "content port used from the host".into(),
            )),
        }
    }

    fn set_receiver(&mut self, receiver: PortReceiver) {
        match self.side {
            Side::Host => RECEIVERS.with(|r| {
                r.borrow_mut().insert((self.webview, self.id), receiver);
            }),
            Side::Content => debug!(port = self.id, "receiver on content port ignored"),
        }
    }
}

impl Drop for WryPort {
    fn drop(&mut self) {
        if self.side == Side::Host {
            // The registry may already be gone during thread teardown.
            let _ = RECEIVERS.try_with(|r| r.borrow_mut().remove(&(self.webview, self.id)));
        }
    }
}

/// A `wry` webview driven through the UI-thread registry.
pub struct WryHost {
    key: u64,
    ui_thread: ThreadId,
    next_port: AtomicU64,
    /// Platform spelling of the origin, e.g. `http://app.localhost/` on
    /// WebView2, as `(canonical, platform)` base URLs.
    rewrite: Option<(String, String)>,
    closed: Mutex<bool>,
}

impl WryHost {
    pub(crate) fn register(webview: WebView, key: u64, rewrite: Option<(String, String)>) -> Self {
        WEBVIEWS.with(|w| {
            w.borrow_mut().insert(key, webview);
        });
        Self {
            key,
            ui_thread: std::thread::current().id(),
            next_port: AtomicU64::new(1),
            rewrite,
            closed: Mutex::new(false),
        }
    }

    pub(crate) fn next_key() -> u64 {
        NEXT_KEY.fetch_add(1, Ordering::Relaxed)
    }

    pub fn key(&self) -> u64 {
        self.key
    }

    /// Run `f` against the webview. UI thread only.
    pub fn with_webview<T>(
        &self,
        f: impl FnOnce(&WebView) -> Result<T, wry::Error>,
    ) -> Result<T, BridgeError> {
        self.on_ui_thread()?;
        with_webview(self.key, f)
    }

    /// The registry is invisible from other threads; fail loudly instead of
    /// reporting the webview as gone.
    fn on_ui_thread(&self) -> Result<(), BridgeError> {
        if std::thread::current().id() == self.ui_thread {
            return Ok(());
        }
        Err(BridgeError::WrongThread(format!(
            "webview {} used off its UI thread",
            self.key
        )))
    }

    fn platform_url(&self, url: &str) -> String {
        match &self.rewrite {
            Some((canonical, platform)) => match url.strip_prefix(canonical.as_str()) {
                Some(rest) => format!("{platform}{rest}"),
                None => url.to_string(),
            },
            None => url.to_string(),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.lock().map(|c| *c).unwrap_or(true)
    }
}

impl ContentHost for WryHost {
    type Port = WryPort;

    fn navigate(&self, url: &str) -> Result<(), BridgeError> {
        self.on_ui_thread()?;
        let url = self.platform_url(url);
        debug!(webview = self.key, url = %url, "loading");
        with_webview(self.key, |wv| wv.load_url(&url))
    }

    fn evaluate_script(&self, script: &Script, callback: ScriptCallback) -> Result<(), BridgeError> {
        self.on_ui_thread()?;
        if self.is_closed() {
            return Err(BridgeError::SurfaceGone);
        }
        let wrapped = transport::wrap_script(&script.source);
        // wry wants `Fn`; the completion fires once.
        let callback = Mutex::new(Some(callback));
        with_webview(self.key, move |wv| {
            wv.evaluate_script_with_callback(&wrapped, move |raw| {
                let pending = callback.lock().ok().and_then(|mut c| c.take());
                if let Some(callback) = pending {
                    callback(transport::decode_script_result(&raw));
                }
            })
        })
    }

    fn create_channel(&self) -> Result<(WryPort, WryPort), BridgeError> {
        if self.is_closed() {
            return Err(BridgeError::SurfaceGone);
        }
        let id = self.next_port.fetch_add(1, Ordering::Relaxed);
        Ok((
            WryPort {
                webview: self.key,
                id,
                side: Side::Host,
            },
            WryPort {
                webview: self.key,
                id,
                side: Side::Content,
            },
        ))
    }

    fn post_message(&self, message: &str, transfer: Vec<WryPort>) -> Result<(), BridgeError> {
        self.on_ui_thread()?;
        let ids: Vec<u64> = transfer
            .iter()
            .map(|port| match port.side {
                Side::Content if port.webview == self.key => Ok(port.id),
                _ => Err(BridgeError::ProtocolMisuse(
                    "only this webview's content ports can be transferred".into(),
                )),
            })
            .collect::<Result<_, _>>()?;
        let script = transport::post_script(message, &ids);
        with_webview(self.key, |wv| wv.evaluate_script(&script))
    }

    fn close(&self) {
        if let Ok(mut closed) = self.closed.lock() {
            *closed = true;
        }
        let key = self.key;
        let _ = RECEIVERS.try_with(|r| r.borrow_mut().retain(|(wv, _), _| *wv != key));
        let webview = WEBVIEWS
            .try_with(|w| w.borrow_mut().remove(&key))
            .ok()
            .flatten();
        // Dropped outside the borrow; teardown may call back into handlers.
        drop(webview);
        debug!(webview = key, "webview released");
    }
}
