//! In-process renderer.
//!
//! [`LoopbackHost`] plays the content side of the bridge without a web
//! engine: it keeps the started flag, honours the relay and the port-capture
//! sentinel, and runs an optional content application that can answer
//! messages. Every delivery goes through the [`Dispatcher`], so ordering and
//! threading match a real renderer.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, Weak};

use sprig_common::BridgeError;
use tracing::{debug, trace};

use crate::dispatcher::Dispatcher;
use crate::host::{ContentHost, MessagePort, PortReceiver, Script, ScriptCallback, ScriptKind};
use crate::scripts::CAPTURE_PORT;

/// Content application logic: optionally answers each message it receives.
pub type ContentApp = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

#[derive(Default)]
struct PortSlot {
    receiver: Option<PortReceiver>,
    queued: VecDeque<String>,
    closed: bool,
}

type Slot = Arc<Mutex<PortSlot>>;

/// One end of an in-process channel.
///
/// Messages wait in the receiving end until it has a receiver, as on a web
/// `MessagePort` that has not been started. Dropping an end closes it.
pub struct LoopbackPort {
    inbox: Slot,
    peer: Slot,
    dispatcher: Dispatcher,
}

impl LoopbackPort {
    fn pair(dispatcher: &Dispatcher) -> (Self, Self) {
        let a: Slot = Arc::default();
        let b: Slot = Arc::default();
        (
            Self {
                inbox: Arc::clone(&a),
                peer: Arc::clone(&b),
                dispatcher: dispatcher.clone(),
            },
            Self {
                inbox: b,
                peer: a,
                dispatcher: dispatcher.clone(),
            },
        )
    }
}

impl MessagePort for LoopbackPort {
    fn post(&self, message: &str) -> Result<(), BridgeError> {
        if self.peer.lock().map(|p| p.closed).unwrap_or(true) {
            return Err(BridgeError::Host("port is closed".into()));
        }
        let peer = Arc::clone(&self.peer);
        let message = message.to_string();
        self.dispatcher.post(move || deliver(&peer, message))?;
        Ok(())
    }

    fn set_receiver(&mut self, mut receiver: PortReceiver) {
        let queued = match self.inbox.lock() {
            Ok(mut slot) => std::mem::take(&mut slot.queued),
            Err(_) => return,
        };
        for message in queued {
            receiver(message);
        }
        if let Ok(mut slot) = self.inbox.lock() {
            if !slot.closed {
                slot.receiver = Some(receiver);
            }
        }
    }
}

impl Drop for LoopbackPort {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.inbox.lock() {
            slot.closed = true;
            slot.receiver = None;
            slot.queued.clear();
        }
    }
}

fn deliver(slot: &Slot, message: String) {
    let mut receiver = {
        let Ok(mut slot) = slot.lock() else {
            return;
        };
        if slot.closed {
            return;
        }
        match slot.receiver.take() {
            Some(receiver) => receiver,
            None => {
                slot.queued.push_back(message);
                return;
            }
        }
    };
    receiver(message);
    if let Ok(mut slot) = slot.lock() {
        if !slot.closed && slot.receiver.is_none() {
            slot.receiver = Some(receiver);
        }
    }
}

/// What the simulated page currently holds.
#[derive(Default)]
struct ContentState {
    url: Option<String>,
    started: bool,
    relay_installed: bool,
    port: Option<LoopbackPort>,
    /// Sent by content before its port arrived.
    outbox: Vec<String>,
    received: Vec<String>,
    scripts: Vec<ScriptKind>,
    navigations: Vec<String>,
    closed: bool,
}

impl ContentState {
    /// A new document replaces the old one.
    fn reset_document(&mut self) {
        self.started = false;
        self.relay_installed = false;
        self.port = None;
        self.outbox.clear();
    }
}

/// A [`ContentHost`] that simulates the content side in process.
pub struct LoopbackHost {
    dispatcher: Dispatcher,
    content: Arc<Mutex<ContentState>>,
    app: Option<ContentApp>,
    failing: Mutex<HashSet<ScriptKind>>,
    holding: Mutex<HashSet<ScriptKind>>,
    held: Mutex<Vec<(ScriptKind, ScriptCallback)>>,
}

impl LoopbackHost {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            content: Arc::default(),
            app: None,
            failing: Mutex::default(),
            holding: Mutex::default(),
            held: Mutex::default(),
        }
    }

    /// Install content application logic.
    pub fn with_app(mut self, app: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        self.app = Some(Arc::new(app));
        self
    }

    /// Make every evaluation of `kind` fail.
    pub fn fail_script(&self, kind: ScriptKind) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(kind);
        }
    }

    /// Park evaluations of `kind` until [`release_held`](Self::release_held).
    pub fn hold_script(&self, kind: ScriptKind) {
        if let Ok(mut holding) = self.holding.lock() {
            holding.insert(kind);
        }
    }

    /// Complete all parked evaluations and stop holding.
    pub fn release_held(&self) {
        if let Ok(mut holding) = self.holding.lock() {
            holding.clear();
        }
        let held = self
            .held
            .lock()
            .map(|mut held| std::mem::take(&mut *held))
            .unwrap_or_default();
        for (kind, callback) in held {
            self.complete(kind, callback);
        }
    }

    /// Pretend the current document already ran the start script.
    pub fn set_content_started(&self, started: bool) {
        if let Ok(mut content) = self.content.lock() {
            content.started = started;
        }
    }

    /// Content calls `window.external.sendMessage(message)`.
    pub fn content_send(&self, message: impl Into<String>) -> Result<(), BridgeError> {
        let content = Arc::downgrade(&self.content);
        let message = message.into();
        self.dispatcher.post(move || content_send(&content, message))?;
        Ok(())
    }

    /// Reload the current document.
    pub fn reload(&self) -> Result<(), BridgeError> {
        let url = self.current_url().unwrap_or_else(|| "about:blank".into());
        self.navigate(&url)
    }

    /// Messages the content received, across documents.
    pub fn content_received(&self) -> Vec<String> {
        self.read(|c| c.received.clone())
    }

    pub fn scripts_run(&self) -> Vec<ScriptKind> {
        self.read(|c| c.scripts.clone())
    }

    pub fn navigations(&self) -> Vec<String> {
        self.read(|c| c.navigations.clone())
    }

    pub fn current_url(&self) -> Option<String> {
        self.read(|c| c.url.clone())
    }

    pub fn content_started(&self) -> bool {
        self.read(|c| c.started)
    }

    pub fn has_captured_port(&self) -> bool {
        self.read(|c| c.port.is_some())
    }

    pub fn is_closed(&self) -> bool {
        self.read(|c| c.closed)
    }

    fn read<T: Default>(&self, f: impl FnOnce(&ContentState) -> T) -> T {
        self.content.lock().map(|c| f(&c)).unwrap_or_default()
    }

    fn complete(&self, kind: ScriptKind, callback: ScriptCallback) {
        let content = Arc::clone(&self.content);
        let fail = self
            .failing
            .lock()
            .map(|f| f.contains(&kind))
            .unwrap_or(false);
        let posted = self.dispatcher.post(move || {
            let result = {
                let Ok(mut content) = content.lock() else {
                    return;
                };
                // A closed surface never answers.
                if content.closed {
                    return;
                }
                content.scripts.push(kind);
                if fail {
                    Err(BridgeError::Script(format!("{kind:?} threw")))
                } else {
                    Ok(run_script(&mut content, kind))
                }
            };
            callback(result);
        });
        if let Err(e) = posted {
            debug!(?kind, error = %e, "script evaluation dropped");
        }
    }
}

/// Side effects of the scripts on the document. Returns the JSON result.
fn run_script(content: &mut ContentState, kind: ScriptKind) -> String {
    match kind {
        ScriptKind::ProbeStarted => content.started.to_string(),
        ScriptKind::InstallRelay => {
            content.relay_installed = true;
            "true".into()
        }
        ScriptKind::StartApplication => {
            content.started = true;
            "true".into()
        }
        ScriptKind::Custom => "null".into(),
    }
}

/// The relay hands a message to the content application.
fn content_receive(content: &Weak<Mutex<ContentState>>, app: Option<&ContentApp>, message: String) {
    let Some(strong) = content.upgrade() else {
        return;
    };
    if let Ok(mut state) = strong.lock() {
        trace!(len = message.len(), "content received message");
        state.received.push(message.clone());
    }
    if let Some(reply) = app.and_then(|app| app(&message)) {
        content_send(content, reply);
    }
}

fn content_send(content: &Weak<Mutex<ContentState>>, message: String) {
    let Some(strong) = content.upgrade() else {
        return;
    };
    let Ok(mut state) = strong.lock() else {
        return;
    };
    match &state.port {
        Some(port) => {
            if let Err(e) = port.post(&message) {
                debug!(error = %e, "content message dropped");
            }
        }
        None => state.outbox.push(message),
    }
}

impl ContentHost for LoopbackHost {
    type Port = LoopbackPort;

    fn navigate(&self, url: &str) -> Result<(), BridgeError> {
        let mut content = self
            .content
            .lock()
            .map_err(|_| BridgeError::Host("content state poisoned".into()))?;
        if content.closed {
            return Err(BridgeError::SurfaceGone);
        }
        debug!(url, "loopback navigate");
        content.reset_document();
        content.url = Some(url.to_string());
        content.navigations.push(url.to_string());
        Ok(())
    }

    fn evaluate_script(&self, script: &Script, callback: ScriptCallback) -> Result<(), BridgeError> {
        if self.is_closed() {
            return Err(BridgeError::SurfaceGone);
        }
        let hold = self
            .holding
            .lock()
            .map(|h| h.contains(&script.kind))
            .unwrap_or(false);
        if hold {
            if let Ok(mut held) = self.held.lock() {
                held.push((script.kind, callback));
            }
            return Ok(());
        }
        self.complete(script.kind, callback);
        Ok(())
    }

    fn create_channel(&self) -> Result<(LoopbackPort, LoopbackPort), BridgeError> {
        if self.is_closed() {
            return Err(BridgeError::SurfaceGone);
        }
        Ok(LoopbackPort::pair(&self.dispatcher))
    }

    fn post_message(&self, message: &str, mut transfer: Vec<LoopbackPort>) -> Result<(), BridgeError> {
        if self.is_closed() {
            return Err(BridgeError::SurfaceGone);
        }
        let content = Arc::downgrade(&self.content);
        let app = self.app.clone();
        let message = message.to_string();
        self.dispatcher.post(move || {
            let Some(strong) = content.upgrade() else {
                return;
            };
            let relay_installed = strong.lock().map(|c| c.relay_installed).unwrap_or(false);
            // Without the relay nobody listens on the default transport.
            if !relay_installed {
                debug!("default transport message dropped, relay not installed");
                return;
            }
            if message != CAPTURE_PORT {
                content_receive(&content, app.as_ref(), message);
                return;
            }
            let Some(mut port) = transfer.pop() else {
                return;
            };
            if strong.lock().map(|c| c.port.is_some()).unwrap_or(true) {
                return;
            }
            let receiver_content = content.clone();
            port.set_receiver(Box::new(move |m| {
                content_receive(&receiver_content, app.as_ref(), m);
            }));
            if let Ok(mut state) = strong.lock() {
                for pending in std::mem::take(&mut state.outbox) {
                    if let Err(e) = port.post(&pending) {
                        debug!(error = %e, "queued content message dropped");
                    }
                }
                state.port = Some(port);
                debug!("content captured its port");
            };
        })?;
        Ok(())
    }

    fn close(&self) {
        if let Ok(mut content) = self.content.lock() {
            content.closed = true;
            content.reset_document();
        }
        if let Ok(mut held) = self.held.lock() {
            held.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::UiThread;
    use crate::host::evaluate;

    fn ui() -> UiThread {
        UiThread::spawn("loopback-test", 256).unwrap()
    }

    async fn flush(dispatcher: &Dispatcher) {
        // Two round trips: deliveries may schedule further deliveries.
        dispatcher.invoke(|| ()).await.unwrap();
        dispatcher.invoke(|| ()).await.unwrap();
    }

    #[tokio::test]
    async fn port_pair_delivers_in_order() {
        let ui = ui();
        let dispatcher = ui.dispatcher().clone();
        let (a, mut b) = LoopbackPort::pair(&dispatcher);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let out = Arc::clone(&seen);

        a.post("early").unwrap();
        flush(&dispatcher).await;
        b.set_receiver(Box::new(move |m| out.lock().unwrap().push(m)));
        for i in 0..10 {
            a.post(&i.to_string()).unwrap();
        }
        flush(&dispatcher).await;

        let mut expected = vec!["early".to_string()];
        expected.extend((0..10).map(|i| i.to_string()));
        assert_eq!(*seen.lock().unwrap(), expected);
    }

    #[tokio::test]
    async fn posting_to_a_dropped_port_fails() {
        let ui = ui();
        let (a, b) = LoopbackPort::pair(ui.dispatcher());
        drop(b);
        assert!(matches!(a.post("x"), Err(BridgeError::Host(_))));
    }

    #[tokio::test]
    async fn scripts_drive_the_document() {
        let ui = ui();
        let dispatcher = ui.dispatcher().clone();
        let host = LoopbackHost::new(dispatcher.clone());
        host.navigate("app://0.0.0.0/").unwrap();

        let probe = Script::new(ScriptKind::ProbeStarted, "");
        assert_eq!(evaluate(&host, &dispatcher, probe.clone()).await.unwrap(), "false");
        evaluate(&host, &dispatcher, Script::new(ScriptKind::StartApplication, ""))
            .await
            .unwrap();
        assert_eq!(evaluate(&host, &dispatcher, probe).await.unwrap(), "true");
        assert_eq!(
            host.scripts_run(),
            vec![
                ScriptKind::ProbeStarted,
                ScriptKind::StartApplication,
                ScriptKind::ProbeStarted
            ]
        );
    }

    #[tokio::test]
    async fn navigation_resets_the_document() {
        let ui = ui();
        let host = LoopbackHost::new(ui.dispatcher().clone());
        host.navigate("app://0.0.0.0/").unwrap();
        host.set_content_started(true);
        host.reload().unwrap();
        assert!(!host.content_started());
        assert_eq!(host.navigations(), vec!["app://0.0.0.0/", "app://0.0.0.0/"]);
    }

    #[tokio::test]
    async fn failing_script_reports_an_error() {
        let ui = ui();
        let dispatcher = ui.dispatcher().clone();
        let host = LoopbackHost::new(dispatcher.clone());
        host.fail_script(ScriptKind::InstallRelay);
        let result = evaluate(&host, &dispatcher, Script::new(ScriptKind::InstallRelay, "")).await;
        assert!(matches!(result, Err(BridgeError::Script(_))));
    }

    #[tokio::test]
    async fn closing_drops_held_callbacks() {
        let ui = ui();
        let dispatcher = ui.dispatcher().clone();
        let host = Arc::new(LoopbackHost::new(dispatcher.clone()));
        host.hold_script(ScriptKind::Custom);

        let pending = {
            let host = Arc::clone(&host);
            let d = dispatcher.clone();
            dispatcher.invoke_async(move || async move {
                evaluate(&*host, &d, Script::custom("1 + 1")).await
            })
        };
        flush(&dispatcher).await;
        host.close();

        let result = pending.await.unwrap();
        assert!(matches!(result, Err(BridgeError::SurfaceGone)));
        assert!(host.is_closed());
    }

    #[tokio::test]
    async fn capture_requires_the_relay() {
        let ui = ui();
        let dispatcher = ui.dispatcher().clone();
        let host = LoopbackHost::new(dispatcher.clone());
        host.navigate("app://0.0.0.0/").unwrap();

        let (_p0, p1) = host.create_channel().unwrap();
        host.post_message(CAPTURE_PORT, vec![p1]).unwrap();
        flush(&dispatcher).await;
        assert!(!host.has_captured_port());

        evaluate(&host, &dispatcher, Script::new(ScriptKind::InstallRelay, ""))
            .await
            .unwrap();
        let (_p0, p1) = host.create_channel().unwrap();
        host.post_message(CAPTURE_PORT, vec![p1]).unwrap();
        flush(&dispatcher).await;
        assert!(host.has_captured_port());
    }

    #[tokio::test]
    async fn content_app_replies_over_the_captured_port() {
        let ui = ui();
        let dispatcher = ui.dispatcher().clone();
        let host = LoopbackHost::new(dispatcher.clone())
            .with_app(|m| (m == "ping").then(|| "pong".to_string()));
        host.navigate("app://0.0.0.0/").unwrap();
        evaluate(&host, &dispatcher, Script::new(ScriptKind::InstallRelay, ""))
            .await
            .unwrap();

        // Content talks before it has a port; the relay holds the message.
        host.content_send("hello").unwrap();

        let (mut p0, p1) = host.create_channel().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let out = Arc::clone(&seen);
        p0.set_receiver(Box::new(move |m| out.lock().unwrap().push(m)));
        host.post_message(CAPTURE_PORT, vec![p1]).unwrap();
        p0.post("ping").unwrap();
        flush(&dispatcher).await;
        flush(&dispatcher).await;

        assert_eq!(host.content_received(), vec!["ping"]);
        assert_eq!(*seen.lock().unwrap(), vec!["hello", "pong"]);
    }

    #[tokio::test]
    async fn non_sentinel_default_messages_still_reach_content() {
        let ui = ui();
        let dispatcher = ui.dispatcher().clone();
        let host = LoopbackHost::new(dispatcher.clone());
        host.navigate("app://0.0.0.0/").unwrap();
        evaluate(&host, &dispatcher, Script::new(ScriptKind::InstallRelay, ""))
            .await
            .unwrap();
        host.post_message("legacy", Vec::new()).unwrap();
        flush(&dispatcher).await;
        assert_eq!(host.content_received(), vec!["legacy"]);
    }
}
