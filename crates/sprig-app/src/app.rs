//! `ApplicationHandler` for the winit event loop.
//!
//! The winit thread is the UI thread: it owns the [`DispatchLoop`] and pumps
//! it whenever the dispatcher wakes the loop.

use std::path::PathBuf;

use sprig_common::BridgeEvent;
use sprig_config::SprigConfig;
use sprig_webview::{BridgeManager, DispatchLoop, Dispatcher, Surface, WryHost, WrySurfaceBuilder};
use tokio::sync::broadcast;
use tracing::{debug, error, info, trace, warn};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window, WindowId};
use wry::{dpi, Rect};

#[derive(Debug, Clone, Copy)]
pub enum UserEvent {
    /// Work was queued on the dispatcher.
    Wake,
}

pub struct SprigApp {
    content_root: PathBuf,
    host_page: String,
    surface_config: sprig_config::schema::SurfaceConfig,
    dispatch: DispatchLoop,
    manager: BridgeManager<WryHost>,
    events: broadcast::Receiver<BridgeEvent>,
    surface: Option<Surface<WryHost>>,
    window: Option<Window>,
}

impl SprigApp {
    pub fn new(config: SprigConfig, dispatch: DispatchLoop, dispatcher: Dispatcher) -> Self {
        let content_root = PathBuf::from(&config.content.root);
        let host_page = config.content.host_page.clone();
        let surface_config = config.surface.clone();
        let manager = BridgeManager::new(config, dispatcher);
        let events = manager.subscribe();
        Self {
            content_root,
            host_page,
            surface_config,
            dispatch,
            manager,
            events,
            surface: None,
            window: None,
        }
    }

    fn create_surface(&mut self, window: &Window) -> bool {
        let builder = WrySurfaceBuilder::new(&self.surface_config).with_bounds(bounds_for(window.inner_size()));
        let created = self.manager.create_surface(
            self.content_root.clone(),
            self.host_page.clone(),
            |surface| builder.build(surface, window),
        );
        match created {
            Ok(surface) => {
                let replies = surface.clone();
                surface.on_message(move |message| {
                    info!(message = %message, "message from content");
                    if let Err(e) = replies.send(format!("echo: {message}")) {
                        warn!(error = %e, "echo failed");
                    }
                });
                self.surface = Some(surface);
                true
            }
            Err(e) => {
                error!(error = %e, "failed to create surface");
                false
            }
        }
    }

    fn pump(&mut self) {
        let ran = self.dispatch.pump();
        if ran > 0 {
            trace!(ran, "dispatched work");
        }
        loop {
            match self.events.try_recv() {
                Ok(event) => debug!(?event, "bridge event"),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!(skipped = n, "bridge events dropped");
                }
                Err(_) => break,
            }
        }
    }

    fn sync_bounds(&self, size: PhysicalSize<u32>) {
        let Some(host) = self.surface.as_ref().and_then(|s| s.host()) else {
            return;
        };
        if let Err(e) = host.with_webview(|wv| wv.set_bounds(bounds_for(size))) {
            warn!(error = %e, "failed to update webview bounds");
        }
    }

    fn shutdown(&mut self) {
        self.manager.dispose_all();
        self.surface = None;
        self.pump();
        self.dispatch.dispatcher().shutdown();
    }
}

fn bounds_for(size: PhysicalSize<u32>) -> Rect {
    Rect {
        position: dpi::Position::Physical(dpi::PhysicalPosition::new(0, 0)),
        size: dpi::Size::Physical(dpi::PhysicalSize::new(size.width, size.height)),
    }
}

impl ApplicationHandler<UserEvent> for SprigApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attributes = Window::default_attributes().with_title("Sprig");
        let window = match event_loop.create_window(attributes) {
            Ok(window) => window,
            Err(e) => {
                error!(error = %e, "failed to create window");
                event_loop.exit();
                return;
            }
        };

        if !self.create_surface(&window) {
            event_loop.exit();
            return;
        }
        self.window = Some(window);
        self.pump();
    }

    fn user_event(&mut self, _event_loop: &ActiveEventLoop, event: UserEvent) {
        match event {
            UserEvent::Wake => self.pump(),
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Window close requested");
                self.shutdown();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if size.width > 0 && size.height > 0 {
                    self.sync_bounds(size);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        // Wakes can coalesce; never sleep on queued work.
        if self.dispatch.dispatcher().pending() > 0 {
            self.pump();
        }
    }
}
