use std::sync::{Arc, Mutex, OnceLock};

use sprig_common::{BridgeError, BridgeEvent, EventBus, SurfaceId};
use tracing::{debug, error, info, warn};

use crate::bridge::{MessageBridge, MessageSink};
use crate::content::{Resolution, ResourceRequest, VirtualOriginResourceProvider};
use crate::dispatcher::{DispatchHandle, Dispatcher};
use crate::events::PageLoadState;
use crate::host::{evaluate, ContentHost, Script};
use crate::navigation::{NavigationDecision, NavigationInterceptor};
use crate::origin::VirtualOrigin;
use crate::startup::{BridgeState, HandshakeContext, StartupSequencer};

/// Completion of a handshake started by a page load.
pub type HandshakeHandle = DispatchHandle<Result<(), BridgeError>>;

pub(super) struct SurfaceInner<H: ContentHost> {
    pub(super) id: SurfaceId,
    pub(super) provider: VirtualOriginResourceProvider,
    pub(super) interceptor: NavigationInterceptor,
    pub(super) sequencer: StartupSequencer,
    pub(super) bridge: Arc<Mutex<MessageBridge<H::Port>>>,
    pub(super) sink: MessageSink,
    pub(super) host: OnceLock<Arc<H>>,
    pub(super) dispatcher: Dispatcher,
    pub(super) events: EventBus,
    pub(super) start_url: String,
}

/// One rendered surface and its bridge.
///
/// Cheap to clone; all clones refer to the same surface. Renderer backends
/// call the `handle_*` hooks from their callbacks.
pub struct Surface<H: ContentHost> {
    inner: Arc<SurfaceInner<H>>,
}

impl<H: ContentHost> Clone for Surface<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<H: ContentHost> Surface<H> {
    pub(super) fn from_inner(inner: SurfaceInner<H>) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    pub(super) fn attach_host(&self, host: H) -> Result<(), BridgeError> {
        self.inner
            .host
            .set(Arc::new(host))
            .map_err(|_| BridgeError::ProtocolMisuse("surface already has a host".into()))
    }

    pub fn id(&self) -> &SurfaceId {
        &self.inner.id
    }

    pub fn origin(&self) -> &VirtualOrigin {
        self.inner.provider.origin()
    }

    pub fn start_url(&self) -> &str {
        &self.inner.start_url
    }

    pub fn state(&self) -> BridgeState {
        self.inner.sequencer.state()
    }

    /// Handshakes admitted over the surface's lifetime.
    pub fn handshake_count(&self) -> usize {
        self.inner.sequencer.handshake_count()
    }

    pub fn is_disposed(&self) -> bool {
        self.state() == BridgeState::Disposed
    }

    /// The attached renderer, once `create_surface` has finished.
    pub fn host(&self) -> Option<&Arc<H>> {
        self.inner.host.get()
    }

    fn require_host(&self) -> Result<Arc<H>, BridgeError> {
        if self.is_disposed() {
            return Err(BridgeError::SurfaceGone);
        }
        self.inner
            .host
            .get()
            .cloned()
            .ok_or_else(|| BridgeError::Host("surface has no renderer attached".into()))
    }

    // -------------------------------------------------------------------------
    // Host-facing API
    // -------------------------------------------------------------------------

    /// Send `message` to content. Only valid once the bridge is active.
    ///
    /// Callable from any thread. Sends are serialized through the dispatcher,
    /// so content sees them in call order.
    pub fn send(&self, message: impl Into<String>) -> Result<(), BridgeError> {
        let state = self.state();
        match state {
            BridgeState::Active => {}
            BridgeState::Disposed => return Err(BridgeError::SurfaceGone),
            _ => {
                error!(surface = %self.inner.id, ?state, "send before the bridge is active");
                return Err(BridgeError::ProtocolMisuse(format!(
                    "send while bridge is {state:?}"
                )));
            }
        }

        let bridge = Arc::clone(&self.inner.bridge);
        let surface = self.inner.id.clone();
        let message = message.into();
        self.inner.dispatcher.post(move || {
            let result = bridge
                .lock()
                .map_err(|_| BridgeError::Host("bridge lock poisoned".into()))
                .and_then(|bridge| bridge.send(&message));
            if let Err(e) = result {
                warn!(surface = %surface, error = %e, "message to content dropped");
            }
        })?;
        Ok(())
    }

    /// Register the receiver for content messages. Messages that arrived
    /// earlier are replayed to it first.
    pub fn on_message(&self, handler: impl FnMut(String) + Send + 'static) {
        self.inner.sink.set_handler(Box::new(handler));
    }

    /// Evaluate arbitrary script in the current document.
    pub fn evaluate_script(&self, source: impl Into<String>) -> DispatchHandle<Result<String, BridgeError>> {
        let surface = self.clone();
        let script = Script::custom(source);
        self.inner.dispatcher.invoke_async(move || async move {
            let host = surface.require_host()?;
            evaluate(&*host, &surface.inner.dispatcher, script).await
        })
    }

    /// Navigate to `path` inside the origin.
    pub fn navigate(&self, path: &str) -> Result<(), BridgeError> {
        let host = self.require_host()?;
        let url = self.origin().url_for(path);
        let surface = self.inner.id.clone();
        self.inner.dispatcher.post(move || {
            if let Err(e) = host.navigate(&url) {
                warn!(surface = %surface, url = %url, error = %e, "navigation failed");
            }
        })?;
        Ok(())
    }

    /// Tear the surface down. Ports are released, no further messages are
    /// delivered, and pending handshakes resolve as `SurfaceGone`.
    pub fn dispose(&self) {
        let previous = self.inner.sequencer.dispose();
        if previous == BridgeState::Disposed {
            return;
        }
        if let Ok(mut bridge) = self.inner.bridge.lock() {
            bridge.close();
        }
        self.inner.sink.close();

        if let Some(host) = self.inner.host.get() {
            let host = Arc::clone(host);
            if self.inner.dispatcher.check_access() {
                host.close();
            } else if self.inner.dispatcher.post(move || host.close()).is_err() {
                debug!(surface = %self.inner.id, "UI loop gone, renderer already released");
            }
        }
        info!(surface = %self.inner.id, ?previous, "surface disposed");
        self.inner
            .events
            .publish(BridgeEvent::SurfaceDisposed(self.inner.id.clone()));
    }

    // -------------------------------------------------------------------------
    // Renderer hooks
    // -------------------------------------------------------------------------

    /// Classify a navigation the renderer is about to perform.
    pub fn handle_navigation(&self, uri: &str) -> NavigationDecision {
        let decision = self.inner.interceptor.should_handle(uri);
        match decision {
            NavigationDecision::Serve => {}
            NavigationDecision::Delegate => {
                self.inner.events.publish(BridgeEvent::NavigationDelegated {
                    surface: self.inner.id.clone(),
                    url: uri.to_string(),
                });
            }
            NavigationDecision::Ignore(reason) => {
                self.inner.events.publish(BridgeEvent::NavigationIgnored {
                    surface: self.inner.id.clone(),
                    url: uri.to_string(),
                    reason,
                });
            }
        }
        decision
    }

    /// Resolve a resource fetch against the content root.
    pub fn handle_resource(&self, uri: &str) -> Resolution {
        let request = ResourceRequest::for_uri(self.origin(), uri);
        let resolution = self.inner.provider.resolve(&request);
        if resolution.is_miss() {
            debug!(surface = %self.inner.id, uri, "resource miss");
            self.inner.events.publish(BridgeEvent::ResourceMissed {
                surface: self.inner.id.clone(),
                path: uri.to_string(),
            });
        }
        resolution
    }

    /// React to a page load event. Returns the handshake this load started,
    /// if any.
    pub fn handle_page_load(&self, state: PageLoadState, url: &str) -> Option<HandshakeHandle> {
        match state {
            PageLoadState::Started => {
                // Held across the rearm: a superseded handshake checks its
                // generation under this lock before establishing.
                let Ok(mut bridge) = self.inner.bridge.lock() else {
                    return None;
                };
                if self.inner.sequencer.rearm() {
                    debug!(surface = %self.inner.id, url, "new document, bridge rearmed");
                    bridge.close();
                    *bridge = MessageBridge::new(self.inner.sink.clone());
                }
                None
            }
            PageLoadState::Finished => {
                let generation = self.inner.sequencer.admit(self.origin(), url)?;
                Some(self.start_handshake(generation))
            }
        }
    }

    fn start_handshake(&self, generation: u64) -> HandshakeHandle {
        let pending = PendingHandshake {
            surface: Some(self.clone()),
            generation,
        };
        self.inner.dispatcher.invoke_async(move || {
            let surface = pending.claim();
            async move {
                let surface = surface.ok_or(BridgeError::SurfaceGone)?;
                let host = match surface.require_host() {
                    Ok(host) => host,
                    Err(e) => {
                        surface.inner.sequencer.abandon(generation);
                        return Err(e);
                    }
                };
                let ctx = HandshakeContext {
                    surface: surface.inner.id.clone(),
                    host,
                    dispatcher: surface.inner.dispatcher.clone(),
                    bridge: Arc::clone(&surface.inner.bridge),
                    events: surface.inner.events.clone(),
                };
                surface.inner.sequencer.run(&ctx, generation).await
            }
        })
    }
}

/// An admitted handshake on its way to the UI thread. If the dispatcher
/// drops it unrun, the admission is handed back so the next load-finished
/// can try again.
struct PendingHandshake<H: ContentHost> {
    surface: Option<Surface<H>>,
    generation: u64,
}

impl<H: ContentHost> PendingHandshake<H> {
    fn claim(mut self) -> Option<Surface<H>> {
        self.surface.take()
    }
}

impl<H: ContentHost> Drop for PendingHandshake<H> {
    fn drop(&mut self) {
        if let Some(surface) = self.surface.take() {
            warn!(surface = %surface.inner.id, "handshake never reached the UI thread");
            surface.inner.sequencer.abandon(self.generation);
        }
    }
}

impl<H: ContentHost> std::fmt::Debug for Surface<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Surface")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("start_url", &self.inner.start_url)
            .finish()
    }
}
