//! Surface lifecycle management.
//!
//! `BridgeManager` is the composition root of the bridge. For every surface
//! it builds a resource provider, a navigation interceptor, a startup
//! sequencer and a message bridge, lets the caller attach a renderer, and
//! tracks the result until it is disposed.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};

use sprig_common::{BridgeError, BridgeEvent, EventBus, SurfaceId};
use sprig_config::SprigConfig;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::bridge::{MessageBridge, MessageSink};
use crate::content::VirtualOriginResourceProvider;
use crate::dispatcher::Dispatcher;
use crate::host::ContentHost;
use crate::navigation::{ExternalOpener, NavigationInterceptor, SystemOpener};
use crate::origin::VirtualOrigin;
use crate::scripts::StartupScripts;
use crate::startup::StartupSequencer;

mod surface;

pub use surface::{HandshakeHandle, Surface};

use surface::SurfaceInner;

const EVENT_CAPACITY: usize = 256;

/// Owns every surface of one UI thread.
pub struct BridgeManager<H: ContentHost> {
    config: Arc<SprigConfig>,
    dispatcher: Dispatcher,
    events: EventBus,
    opener: Arc<dyn ExternalOpener>,
    surfaces: Mutex<HashMap<SurfaceId, Surface<H>>>,
}

impl<H: ContentHost> BridgeManager<H> {
    /// Create a manager whose external navigations go to the system opener.
    pub fn new(config: SprigConfig, dispatcher: Dispatcher) -> Self {
        let opener = Arc::new(SystemOpener::from_config(&config.navigation));
        Self::with_opener(config, dispatcher, opener)
    }

    pub fn with_opener(
        config: SprigConfig,
        dispatcher: Dispatcher,
        opener: Arc<dyn ExternalOpener>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            dispatcher,
            events: EventBus::new(EVENT_CAPACITY),
            opener,
            surfaces: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &SprigConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Lifecycle and routing events of every surface.
    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.events.subscribe()
    }

    /// Create a surface serving `content_root` with `host_page` as entry
    /// document.
    ///
    /// `attach` renders the native surface; the renderer should route its
    /// callbacks to the surface's `handle_*` hooks. Once attached, the
    /// surface starts loading the configured start path.
    pub fn create_surface<F>(
        &self,
        content_root: impl Into<PathBuf>,
        host_page: impl Into<String>,
        attach: F,
    ) -> Result<Surface<H>, BridgeError>
    where
        F: FnOnce(&Surface<H>) -> Result<H, BridgeError>,
    {
        let origin = VirtualOrigin::from_config(&self.config.origin, content_root, host_page);
        let start_url = origin.url_for(&self.config.content.start_path);
        let provider = VirtualOriginResourceProvider::new(origin.clone())
            .with_cache_control(self.config.content.cache_control.clone());
        let interceptor = NavigationInterceptor::from_config(
            origin,
            Arc::clone(&self.opener),
            &self.config.navigation,
        );
        let sequencer = StartupSequencer::new(StartupScripts::from_config(&self.config.startup));
        let sink = MessageSink::new();

        let surface = Surface::from_inner(SurfaceInner {
            id: SurfaceId::new(),
            provider,
            interceptor,
            sequencer,
            bridge: Arc::new(Mutex::new(MessageBridge::new(sink.clone()))),
            sink,
            host: OnceLock::new(),
            dispatcher: self.dispatcher.clone(),
            events: self.events.clone(),
            start_url,
        });

        let host = attach(&surface)?;
        surface.attach_host(host)?;

        if let Ok(mut surfaces) = self.surfaces.lock() {
            surfaces.insert(surface.id().clone(), surface.clone());
        }
        info!(
            surface = %surface.id(),
            origin = %surface.origin().base_url(),
            root = %surface.origin().content_root().display(),
            "surface created"
        );
        self.events
            .publish(BridgeEvent::SurfaceCreated(surface.id().clone()));

        surface.navigate(&self.config.content.start_path)?;
        Ok(surface)
    }

    pub fn surface(&self, id: &SurfaceId) -> Option<Surface<H>> {
        self.surfaces.lock().ok()?.get(id).cloned()
    }

    pub fn surface_ids(&self) -> Vec<SurfaceId> {
        self.surfaces
            .lock()
            .map(|s| s.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn count(&self) -> usize {
        self.surfaces.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// Dispose one surface and stop tracking it.
    pub fn dispose(&self, id: &SurfaceId) -> bool {
        let removed = self.surfaces.lock().ok().and_then(|mut s| s.remove(id));
        match removed {
            Some(surface) => {
                surface.dispose();
                true
            }
            None => {
                debug!(surface = %id, "dispose for unknown surface");
                false
            }
        }
    }

    pub fn dispose_all(&self) {
        let drained: Vec<_> = self
            .surfaces
            .lock()
            .map(|mut s| s.drain().map(|(_, surface)| surface).collect())
            .unwrap_or_default();
        for surface in drained {
            surface.dispose();
        }
    }
}

impl<H: ContentHost> Drop for BridgeManager<H> {
    fn drop(&mut self) {
        self.dispose_all();
    }
}
