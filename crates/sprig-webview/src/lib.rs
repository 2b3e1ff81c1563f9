//! Hybrid content bridge for embedding web content in native surfaces.
//!
//! Provides:
//! - A virtual origin that serves bundled content without a network
//! - Navigation interception (serve, hand to the platform, or ignore)
//! - A UI-thread dispatcher for marshalling work from any thread
//! - A dedicated ordered message channel between host and content
//! - The startup handshake that wires the channel once the page loads
//!
//! Renderers plug in through [`ContentHost`]. [`LoopbackHost`] simulates one
//! in process; the `wry` feature adds a native backend.

pub mod bridge;
pub mod content;
pub mod dispatcher;
pub mod events;
pub mod host;
pub mod loopback;
pub mod manager;
pub mod navigation;
pub mod origin;
pub mod scripts;
pub mod startup;
pub mod transport;

#[cfg(feature = "wry")]
pub mod wry_host;

pub use bridge::{MessageBridge, MessageSink};
pub use content::{Resolution, ResourceRequest, ResourceResponse, VirtualOriginResourceProvider};
pub use dispatcher::{DispatchHandle, DispatchLoop, Dispatcher, UiThread};
pub use events::PageLoadState;
pub use host::{ContentHost, MessagePort, Script, ScriptKind};
pub use loopback::{LoopbackHost, LoopbackPort};
pub use manager::{BridgeManager, HandshakeHandle, Surface};
pub use navigation::{ExternalOpener, NavigationDecision, NavigationInterceptor, SystemOpener};
pub use origin::VirtualOrigin;
pub use startup::BridgeState;

#[cfg(feature = "wry")]
pub use wry_host::{WryHost, WryPort, WrySurfaceBuilder};
