use std::thread::JoinHandle;

use sprig_common::DispatchError;
use tracing::warn;

use super::{DispatchLoop, Dispatcher};

/// A dedicated thread running a [`DispatchLoop`].
///
/// For embeddings without a native event loop of their own (headless
/// surfaces, tests). Dropping it shuts the loop down and joins the thread.
pub struct UiThread {
    dispatcher: Dispatcher,
    join: Option<JoinHandle<()>>,
}

impl UiThread {
    pub fn spawn(name: impl Into<String>, capacity: usize) -> Result<Self, DispatchError> {
        // A std channel: spawning may happen inside an async context.
        let (ready_tx, ready_rx) = std::sync::mpsc::sync_channel(1);
        let join = std::thread::Builder::new()
            .name(name.into())
            .spawn(move || match DispatchLoop::new(capacity) {
                Ok((ui_loop, dispatcher)) => {
                    if ready_tx.send(Ok(dispatcher)).is_ok() {
                        ui_loop.run();
                    }
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(|e| DispatchError::Runtime(e.to_string()))?;

        let dispatcher = ready_rx
            .recv()
            .map_err(|_| DispatchError::Runtime("UI thread exited during startup".into()))??;
        Ok(Self {
            dispatcher,
            join: Some(join),
        })
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Stop the loop and wait for the thread to exit.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.dispatcher.shutdown();
        let Some(join) = self.join.take() else {
            return;
        };
        // Joining from the loop's own thread would never return.
        if self.dispatcher.check_access() {
            return;
        }
        if join.join().is_err() {
            warn!("UI thread panicked");
        }
    }
}

impl Drop for UiThread {
    fn drop(&mut self) {
        self.stop();
    }
}
