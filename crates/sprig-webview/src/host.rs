//! The seam between the bridge and a platform renderer.
//!
//! Everything the bridge needs from a web-rendering surface is expressed by
//! [`ContentHost`] and [`MessagePort`]. Host methods are only ever called on
//! the UI thread, from work scheduled through the [`Dispatcher`].

use sprig_common::BridgeError;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::dispatcher::Dispatcher;

/// Receive callback registered on a port.
pub type PortReceiver = Box<dyn FnMut(String) + Send>;

/// Completion for a script evaluation: the script's result as a JSON string.
pub type ScriptCallback = Box<dyn FnOnce(Result<String, BridgeError>) + Send>;

/// One end of a message channel.
///
/// Messages posted on one end are delivered to the other end's receiver in
/// the order they were posted, exactly once.
pub trait MessagePort: Send + 'static {
    fn post(&self, message: &str) -> Result<(), BridgeError>;

    /// Register the single receive callback, replacing any previous one.
    fn set_receiver(&mut self, receiver: PortReceiver);
}

/// What a script is for. Renderers evaluate [`Script::source`]; the kind lets
/// simulated renderers act without a JavaScript engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptKind {
    /// Reports whether content was already started.
    ProbeStarted,
    /// Installs the content-side relay.
    InstallRelay,
    /// Marks content as started and starts the application.
    StartApplication,
    Custom,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub kind: ScriptKind,
    pub source: String,
}

impl Script {
    pub fn new(kind: ScriptKind, source: impl Into<String>) -> Self {
        Self {
            kind,
            source: source.into(),
        }
    }

    pub fn custom(source: impl Into<String>) -> Self {
        Self::new(ScriptKind::Custom, source)
    }
}

/// A platform web-rendering surface.
pub trait ContentHost: Send + Sync + 'static {
    type Port: MessagePort;

    /// Load `url` in the surface.
    fn navigate(&self, url: &str) -> Result<(), BridgeError>;

    /// Evaluate a script in the current document. `callback` is invoked once
    /// with the JSON-encoded result, possibly after this call returns.
    fn evaluate_script(&self, script: &Script, callback: ScriptCallback) -> Result<(), BridgeError>;

    /// Create an entangled pair of ports.
    fn create_channel(&self) -> Result<(Self::Port, Self::Port), BridgeError>;

    /// Post `message` on the default transport, transferring `transfer` to
    /// the content.
    fn post_message(&self, message: &str, transfer: Vec<Self::Port>) -> Result<(), BridgeError>;

    /// Release native resources. No callbacks fire afterwards.
    fn close(&self);
}

/// Evaluate `script` and wait for its result.
///
/// The completion is routed back through `dispatcher`, so the await resumes
/// on the UI thread however the host delivers it. Resolves to `SurfaceGone`
/// if the host drops the callback.
pub async fn evaluate<H: ContentHost>(
    host: &H,
    dispatcher: &Dispatcher,
    script: Script,
) -> Result<String, BridgeError> {
    let (tx, rx) = oneshot::channel();
    let completion = dispatcher.clone();
    let kind = script.kind;
    trace!(?kind, "evaluating script");
    host.evaluate_script(
        &script,
        Box::new(move |result| {
            if let Err(e) = completion.post(move || {
                let _ = tx.send(result);
            }) {
                debug!(?kind, error = %e, "script result dropped");
            }
        }),
    )?;
    rx.await.map_err(|_| BridgeError::SurfaceGone)?
}
