//! Startup handshake state machine.
//!
//! Once an in-origin page finishes loading, the sequencer wires the message
//! bridge and starts the content application:
//!
//! 1. probe the started flag, abort if content is already running
//! 2. install the content-side relay
//! 3. establish the message bridge (on the UI thread)
//! 4. run the start script, which sets the flag
//!
//! Admission is a single compare-and-set under the state lock, so repeated
//! or concurrent load-finished signals start at most one handshake. Each
//! admission carries a generation; a new document bumps it, and a handshake
//! whose generation is stale stops at its next step without touching the
//! state or the new document's bridge.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use sprig_common::{new_correlation_id, BridgeError, BridgeEvent, EventBus, SurfaceId};
use tracing::{debug, info, warn};

use crate::bridge::MessageBridge;
use crate::dispatcher::Dispatcher;
use crate::host::{evaluate, ContentHost};
use crate::origin::VirtualOrigin;
use crate::scripts::{decode_started, StartupScripts};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    NotStarted,
    HandshakeInFlight,
    Active,
    /// The handshake failed after the ports were spent. Cleared by the next
    /// page load.
    Faulted,
    Disposed,
}

/// Everything a handshake touches.
pub struct HandshakeContext<H: ContentHost> {
    pub surface: SurfaceId,
    pub host: Arc<H>,
    pub dispatcher: Dispatcher,
    pub bridge: Arc<Mutex<MessageBridge<H::Port>>>,
    pub events: EventBus,
}

enum Outcome {
    Completed,
    AlreadyStarted,
}

pub struct StartupSequencer {
    state: Mutex<BridgeState>,
    /// Bumped under the state lock. Callers that swap the bridge hold the
    /// bridge lock across [`rearm`](Self::rearm), which lets the establish
    /// step check it under that same lock.
    generation: Arc<AtomicU64>,
    handshakes: AtomicUsize,
    scripts: StartupScripts,
}

impl StartupSequencer {
    pub fn new(scripts: StartupScripts) -> Self {
        Self {
            state: Mutex::new(BridgeState::NotStarted),
            generation: Arc::new(AtomicU64::new(0)),
            handshakes: AtomicUsize::new(0),
            scripts,
        }
    }

    pub fn state(&self) -> BridgeState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(BridgeState::Disposed)
    }

    /// Number of handshakes admitted so far.
    pub fn handshake_count(&self) -> usize {
        self.handshakes.load(Ordering::Acquire)
    }

    /// React to a load-finished signal for `url`.
    ///
    /// Returns the generation of the handshake when this call moved the
    /// state to `HandshakeInFlight`; the caller must then [`run`](Self::run)
    /// it, or [`abandon`](Self::abandon) it if it never gets to.
    pub fn admit(&self, origin: &VirtualOrigin, url: &str) -> Option<u64> {
        if !origin.contains(url) {
            debug!(url, "load finished outside the origin");
            return None;
        }
        let mut state = self.state.lock().ok()?;
        if *state != BridgeState::NotStarted {
            debug!(url, state = ?*state, "load finished, handshake not needed");
            return None;
        }
        *state = BridgeState::HandshakeInFlight;
        self.handshakes.fetch_add(1, Ordering::AcqRel);
        Some(self.generation.load(Ordering::Acquire))
    }

    /// A new document started loading. Its content has lost the old ports,
    /// so any bridge state short of `Disposed` goes back to `NotStarted`
    /// and an in-flight handshake is superseded.
    ///
    /// Returns `true` when the caller must replace the bridge.
    pub fn rearm(&self) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        match *state {
            BridgeState::HandshakeInFlight | BridgeState::Active | BridgeState::Faulted => {
                if *state == BridgeState::HandshakeInFlight {
                    debug!("new document while a handshake is in flight");
                }
                *state = BridgeState::NotStarted;
                self.generation.fetch_add(1, Ordering::AcqRel);
                true
            }
            BridgeState::NotStarted | BridgeState::Disposed => false,
        }
    }

    /// Give up an admitted handshake before any step ran.
    pub fn abandon(&self, generation: u64) {
        if let Err(e) = self.settle(generation, BridgeState::NotStarted) {
            debug!(generation, error = %e, "abandoned handshake was already stale");
        }
    }

    /// Mark the bridge as torn down. Returns the previous state.
    pub fn dispose(&self) -> BridgeState {
        match self.state.lock() {
            Ok(mut state) => std::mem::replace(&mut *state, BridgeState::Disposed),
            Err(_) => BridgeState::Disposed,
        }
    }

    /// Run the handshake admitted as `generation` to completion. Must be
    /// awaited on the UI thread.
    pub async fn run<H: ContentHost>(
        &self,
        ctx: &HandshakeContext<H>,
        generation: u64,
    ) -> Result<(), BridgeError> {
        let handshake = new_correlation_id();
        info!(surface = %ctx.surface, %handshake, "handshake started");
        ctx.events
            .publish(BridgeEvent::HandshakeStarted(ctx.surface.clone()));

        let mut established = false;
        match self.steps(ctx, generation, &handshake, &mut established).await {
            Ok(Outcome::Completed) => {
                if let Err(e) = self.settle(generation, BridgeState::Active) {
                    info!(surface = %ctx.surface, %handshake, error = %e, "handshake finished too late");
                    return Err(e);
                }
                info!(surface = %ctx.surface, %handshake, "handshake completed, bridge active");
                ctx.events
                    .publish(BridgeEvent::HandshakeCompleted(ctx.surface.clone()));
                Ok(())
            }
            Ok(Outcome::AlreadyStarted) => {
                self.settle(generation, BridgeState::NotStarted)?;
                info!(surface = %ctx.surface, %handshake, "content already started, handshake aborted");
                Ok(())
            }
            Err(e) => {
                let next = if established {
                    BridgeState::Faulted
                } else {
                    BridgeState::NotStarted
                };
                let settled = self.settle(generation, next);
                if matches!(settled, Err(BridgeError::Superseded)) {
                    info!(surface = %ctx.surface, %handshake, error = %e, "handshake superseded by a new document");
                    return Err(BridgeError::Superseded);
                }
                warn!(
                    surface = %ctx.surface,
                    %handshake,
                    error = %e,
                    state = ?next,
                    "handshake failed"
                );
                ctx.events.publish(BridgeEvent::HandshakeFailed {
                    surface: ctx.surface.clone(),
                    reason: e.to_string(),
                });
                settled?;
                Err(e)
            }
        }
    }

    async fn steps<H: ContentHost>(
        &self,
        ctx: &HandshakeContext<H>,
        generation: u64,
        handshake: &str,
        established: &mut bool,
    ) -> Result<Outcome, BridgeError> {
        let probe = evaluate(&*ctx.host, &ctx.dispatcher, self.scripts.probe()).await?;
        self.ensure_current(generation)?;
        if decode_started(&probe)? {
            return Ok(Outcome::AlreadyStarted);
        }

        evaluate(&*ctx.host, &ctx.dispatcher, self.scripts.relay()).await?;
        debug!(surface = %ctx.surface, handshake, "relay installed");
        self.ensure_current(generation)?;

        let bridge = Arc::clone(&ctx.bridge);
        let host = Arc::clone(&ctx.host);
        let current = Arc::clone(&self.generation);
        let establish = ctx.dispatcher.invoke(move || {
            let mut bridge = bridge
                .lock()
                .map_err(|_| BridgeError::Host("bridge lock poisoned".into()))?;
            // The bridge belongs to whichever document is current.
            if current.load(Ordering::Acquire) != generation {
                return Err(BridgeError::Superseded);
            }
            bridge.establish(&*host)
        });
        // Only work that actually ran can have spent the ports.
        let result = establish.await?;
        *established = true;
        result?;
        debug!(surface = %ctx.surface, handshake, "ports captured");
        self.ensure_current(generation)?;

        evaluate(&*ctx.host, &ctx.dispatcher, self.scripts.start()).await?;
        debug!(surface = %ctx.surface, handshake, "start script confirmed");
        self.ensure_current(generation)?;
        Ok(Outcome::Completed)
    }

    /// Fails once the surface is gone or a newer document took over.
    fn ensure_current(&self, generation: u64) -> Result<(), BridgeError> {
        let Ok(state) = self.state.lock() else {
            return Err(BridgeError::SurfaceGone);
        };
        if *state == BridgeState::Disposed {
            return Err(BridgeError::SurfaceGone);
        }
        if self.generation.load(Ordering::Acquire) != generation {
            return Err(BridgeError::Superseded);
        }
        Ok(())
    }

    /// Leave `HandshakeInFlight` for `next`, unless the surface went away or
    /// the handshake was superseded.
    fn settle(&self, generation: u64, next: BridgeState) -> Result<(), BridgeError> {
        let Ok(mut state) = self.state.lock() else {
            return Err(BridgeError::SurfaceGone);
        };
        if *state == BridgeState::Disposed {
            return Err(BridgeError::SurfaceGone);
        }
        if self.generation.load(Ordering::Acquire) != generation {
            return Err(BridgeError::Superseded);
        }
        match *state {
            BridgeState::HandshakeInFlight => {
                *state = next;
                Ok(())
            }
            other => {
                debug!(state = ?other, ?next, "handshake settled after state changed");
                Ok(())
            }
        }
    }
}
