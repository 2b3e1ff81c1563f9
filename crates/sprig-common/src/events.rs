use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::id::SurfaceId;

/// Why a navigation ended up inert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    MalformedTarget,
    NoHandler,
    BlockedScheme,
    ExternalDisabled,
}

impl IgnoreReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MalformedTarget => "malformed_target",
            Self::NoHandler => "no_handler",
            Self::BlockedScheme => "blocked_scheme",
            Self::ExternalDisabled => "external_disabled",
        }
    }
}

/// Lifecycle and routing events published by the bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum BridgeEvent {
    SurfaceCreated(SurfaceId),
    HandshakeStarted(SurfaceId),
    HandshakeCompleted(SurfaceId),
    HandshakeFailed { surface: SurfaceId, reason: String },
    NavigationDelegated { surface: SurfaceId, url: String },
    NavigationIgnored {
        surface: SurfaceId,
        url: String,
        reason: IgnoreReason,
    },
    ResourceMissed { surface: SurfaceId, path: String },
    SurfaceDisposed(SurfaceId),
    #[serde(other)]
    Unknown,
}

pub struct EventBus {
    sender: broadcast::Sender<BridgeEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: BridgeEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}
