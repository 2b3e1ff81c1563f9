//! The dedicated host <-> content message channel.
//!
//! Content starts out reachable only through the renderer's default message
//! transport. [`MessageBridge::establish`] upgrades that to a private port
//! pair: the host keeps one end and hands the other to content with the
//! `capturePort` sentinel. Ports are single-use, so a bridge can be
//! established at most once.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use sprig_common::BridgeError;
use tracing::{debug, error, trace};

use crate::host::{ContentHost, MessagePort};
use crate::scripts::CAPTURE_PORT;

/// Host-side handler for content messages.
pub type MessageHandler = Box<dyn FnMut(String) + Send>;

#[derive(Default)]
struct SinkState {
    handler: Option<MessageHandler>,
    buffered: VecDeque<String>,
    closed: bool,
}

/// Delivers content messages to the host's handler.
///
/// Messages arriving before a handler is registered are buffered and
/// replayed, in order, to the first handler.
#[derive(Clone, Default)]
pub struct MessageSink {
    state: Arc<Mutex<SinkState>>,
}

impl MessageSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deliver(&self, message: String) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if state.closed {
            return;
        }
        match state.handler.take() {
            Some(handler) => {
                drop(state);
                self.drain(handler, Some(message));
            }
            None => state.buffered.push_back(message),
        }
    }

    /// Register `handler`, replacing any previous one.
    pub fn set_handler(&self, handler: MessageHandler) {
        {
            let Ok(mut state) = self.state.lock() else {
                return;
            };
            if state.closed {
                return;
            }
            state.handler = None;
        }
        self.drain(handler, None);
    }

    /// Run `handler` over `first` and anything buffered, then park it.
    ///
    /// The lock is never held while the handler runs, so a handler may send
    /// or register handlers itself.
    fn drain(&self, mut handler: MessageHandler, first: Option<String>) {
        if let Some(message) = first {
            handler(message);
        }
        loop {
            let Ok(mut state) = self.state.lock() else {
                return;
            };
            if state.closed {
                return;
            }
            match state.buffered.pop_front() {
                Some(message) => {
                    drop(state);
                    handler(message);
                }
                None => {
                    // A handler registered meanwhile wins.
                    if state.handler.is_none() {
                        state.handler = Some(handler);
                    }
                    return;
                }
            }
        }
    }

    pub fn buffered(&self) -> usize {
        self.state.lock().map(|s| s.buffered.len()).unwrap_or(0)
    }

    /// Drop the handler and anything buffered. Later messages are discarded.
    pub fn close(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.closed = true;
            state.handler = None;
            state.buffered.clear();
        }
    }
}

enum PortState<P> {
    Unbound,
    Bound(P),
    Closed,
}

/// One bridge per page lifetime.
pub struct MessageBridge<P: MessagePort> {
    port: PortState<P>,
    sink: MessageSink,
}

impl<P: MessagePort> MessageBridge<P> {
    pub fn new(sink: MessageSink) -> Self {
        Self {
            port: PortState::Unbound,
            sink,
        }
    }

    /// Run the two-port handshake against `host`.
    ///
    /// A second call is protocol misuse and is rejected without touching the
    /// host.
    pub fn establish<H>(&mut self, host: &H) -> Result<(), BridgeError>
    where
        H: ContentHost<Port = P>,
    {
        if !matches!(self.port, PortState::Unbound) {
            error!("message bridge established twice");
            return Err(BridgeError::ProtocolMisuse(
                "establish called on a bridge whose ports were already taken".into(),
            ));
        }
        // From here on the ports are spent, whatever happens.
        self.port = PortState::Closed;

        let (mut host_port, content_port) = host.create_channel()?;
        let sink = self.sink.clone();
        host_port.set_receiver(Box::new(move |message| {
            trace!(len = message.len(), "message from content");
            sink.deliver(message);
        }));
        host.post_message(CAPTURE_PORT, vec![content_port])?;

        self.port = PortState::Bound(host_port);
        debug!("message bridge established");
        Ok(())
    }

    pub fn send(&self, message: &str) -> Result<(), BridgeError> {
        match &self.port {
            PortState::Bound(port) => port.post(message),
            PortState::Unbound => {
                error!("send on a bridge that was never established");
                Err(BridgeError::ProtocolMisuse(
                    "send before the bridge is established".into(),
                ))
            }
            PortState::Closed => Err(BridgeError::SurfaceGone),
        }
    }

    pub fn is_established(&self) -> bool {
        matches!(self.port, PortState::Bound(_))
    }

    pub fn sink(&self) -> &MessageSink {
        &self.sink
    }

    /// Release the port. The sink is shared with later bridges and stays open.
    pub fn close(&mut self) {
        if matches!(self.port, PortState::Bound(_)) {
            debug!("message bridge closed");
        }
        self.port = PortState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::host::{PortReceiver, Script, ScriptCallback};

    /// Ports that deliver synchronously; enough for bridge-level tests.
    #[derive(Clone, Default)]
    struct SyncPort {
        receiver: Arc<Mutex<Option<PortReceiver>>>,
        peer: Arc<Mutex<Option<PortReceiver>>>,
        posted: Arc<Mutex<Vec<String>>>,
    }

    impl MessagePort for SyncPort {
        fn post(&self, message: &str) -> Result<(), BridgeError> {
            self.posted.lock().unwrap().push(message.to_string());
            if let Some(receiver) = self.peer.lock().unwrap().as_mut() {
                receiver(message.to_string());
            }
            Ok(())
        }

        fn set_receiver(&mut self, receiver: PortReceiver) {
            *self.receiver.lock().unwrap() = Some(receiver);
        }
    }

    #[derive(Default)]
    struct SyncHost {
        channels: AtomicUsize,
        default_posts: Mutex<Vec<(String, usize)>>,
        content_port: Mutex<Option<SyncPort>>,
    }

    impl ContentHost for SyncHost {
        type Port = SyncPort;

        fn navigate(&self, _url: &str) -> Result<(), BridgeError> {
            Ok(())
        }

        fn evaluate_script(&self, _script: &Script, callback: ScriptCallback) -> Result<(), BridgeError> {
            callback(Ok("null".into()));
            Ok(())
        }

        fn create_channel(&self) -> Result<(SyncPort, SyncPort), BridgeError> {
            self.channels.fetch_add(1, Ordering::SeqCst);
            let a = SyncPort::default();
            let b = SyncPort {
                receiver: Arc::clone(&a.peer),
                peer: Arc::clone(&a.receiver),
                posted: Arc::default(),
            };
            Ok((a, b))
        }

        fn post_message(&self, message: &str, transfer: Vec<SyncPort>) -> Result<(), BridgeError> {
            self.default_posts
                .lock()
                .unwrap()
                .push((message.to_string(), transfer.len()));
            *self.content_port.lock().unwrap() = transfer.into_iter().next();
            Ok(())
        }

        fn close(&self) {}
    }

    fn collecting(sink: &MessageSink) -> Arc<Mutex<Vec<String>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let out = Arc::clone(&seen);
        sink.set_handler(Box::new(move |m| out.lock().unwrap().push(m)));
        seen
    }

    // -- MessageSink --

    #[test]
    fn sink_buffers_until_a_handler_is_registered() {
        let sink = MessageSink::new();
        sink.deliver("a".into());
        sink.deliver("b".into());
        assert_eq!(sink.buffered(), 2);

        let seen = collecting(&sink);
        sink.deliver("c".into());
        assert_eq!(*seen.lock().unwrap(), vec!["a", "b", "c"]);
        assert_eq!(sink.buffered(), 0);
    }

    #[test]
    fn sink_handler_can_be_replaced() {
        let sink = MessageSink::new();
        let first = collecting(&sink);
        sink.deliver("one".into());
        let second = collecting(&sink);
        sink.deliver("two".into());
        assert_eq!(*first.lock().unwrap(), vec!["one"]);
        assert_eq!(*second.lock().unwrap(), vec!["two"]);
    }

    #[test]
    fn closed_sink_discards() {
        let sink = MessageSink::new();
        let seen = collecting(&sink);
        sink.close();
        sink.deliver("late".into());
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(sink.buffered(), 0);
    }

    // -- MessageBridge --

    #[test]
    fn establish_hands_content_the_second_port() {
        let host = SyncHost::default();
        let mut bridge = MessageBridge::new(MessageSink::new());
        bridge.establish(&host).unwrap();

        assert!(bridge.is_established());
        assert_eq!(host.channels.load(Ordering::SeqCst), 1);
        assert_eq!(
            *host.default_posts.lock().unwrap(),
            vec![(CAPTURE_PORT.to_string(), 1)]
        );
        assert!(host.content_port.lock().unwrap().is_some());
    }

    #[test]
    fn second_establish_is_protocol_misuse() {
        let host = SyncHost::default();
        let mut bridge = MessageBridge::new(MessageSink::new());
        bridge.establish(&host).unwrap();

        let err = bridge.establish(&host).unwrap_err();
        assert!(matches!(err, BridgeError::ProtocolMisuse(_)));
        // The host was not asked for another channel.
        assert_eq!(host.channels.load(Ordering::SeqCst), 1);
        assert!(bridge.is_established());
    }

    #[test]
    fn send_before_establish_is_protocol_misuse() {
        let bridge: MessageBridge<SyncPort> = MessageBridge::new(MessageSink::new());
        assert!(matches!(
            bridge.send("early"),
            Err(BridgeError::ProtocolMisuse(_))
        ));
    }

    #[test]
    fn messages_flow_both_ways() {
        let host = SyncHost::default();
        let sink = MessageSink::new();
        let seen = collecting(&sink);
        let mut bridge = MessageBridge::new(sink);
        bridge.establish(&host).unwrap();

        let mut content = host.content_port.lock().unwrap().take().unwrap();
        let to_content = Arc::new(Mutex::new(Vec::new()));
        let out = Arc::clone(&to_content);
        content.set_receiver(Box::new(move |m| out.lock().unwrap().push(m)));

        bridge.send("ping").unwrap();
        content.post("pong").unwrap();

        assert_eq!(*to_content.lock().unwrap(), vec!["ping"]);
        assert_eq!(*seen.lock().unwrap(), vec!["pong"]);
    }

    #[test]
    fn closed_bridge_cannot_send_or_reestablish() {
        let host = SyncHost::default();
        let mut bridge = MessageBridge::new(MessageSink::new());
        bridge.establish(&host).unwrap();
        bridge.close();

        assert!(!bridge.is_established());
        assert!(matches!(bridge.send("x"), Err(BridgeError::SurfaceGone)));
        assert!(matches!(
            bridge.establish(&host),
            Err(BridgeError::ProtocolMisuse(_))
        ));
    }
}
