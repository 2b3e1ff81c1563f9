use std::sync::Arc;

use sprig_common::DispatchError;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tokio::task::LocalSet;
use tracing::{debug, info};

use super::{Dispatcher, Job, Shared};

/// The consuming end of a [`Dispatcher`]. Lives on, and defines, the UI
/// thread: it must be created on the thread that will drive it.
pub struct DispatchLoop {
    runtime: Runtime,
    local: LocalSet,
    rx: mpsc::UnboundedReceiver<Job>,
    shared: Arc<Shared>,
}

impl DispatchLoop {
    /// Bind a new loop to the calling thread.
    pub fn new(capacity: usize) -> Result<(Self, Dispatcher), DispatchError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| DispatchError::Runtime(e.to_string()))?;
        let (shared, rx) = super::shared(capacity);
        let dispatcher = Dispatcher::from_shared(Arc::clone(&shared));
        Ok((
            Self {
                runtime,
                local: LocalSet::new(),
                rx,
                shared,
            },
            dispatcher,
        ))
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::from_shared(Arc::clone(&self.shared))
    }

    /// Block the current thread running work until shutdown.
    pub fn run(mut self) {
        info!("UI dispatch loop running");
        let rx = &mut self.rx;
        let shared = &self.shared;
        self.local.block_on(&self.runtime, async move {
            while let Some(job) = rx.recv().await {
                match job {
                    Job::Run(job) => {
                        shared.job_started();
                        tokio::task::spawn_local(job());
                    }
                    Job::Shutdown => break,
                }
            }
        });
        info!("UI dispatch loop stopped");
    }

    /// Start everything currently queued and let it make progress without
    /// blocking for new work. Returns the number of items started.
    ///
    /// Work that suspends stays parked in the loop and resumes on a later
    /// pump once it is woken.
    pub fn pump(&mut self) -> usize {
        if self.shared.closed.load(std::sync::atomic::Ordering::Acquire) {
            return 0;
        }
        let rx = &mut self.rx;
        let shared = &self.shared;
        self.local.block_on(&self.runtime, async move {
            let mut started = 0;
            loop {
                let mut batch = 0;
                while let Ok(job) = rx.try_recv() {
                    match job {
                        Job::Run(job) => {
                            shared.job_started();
                            tokio::task::spawn_local(job());
                            batch += 1;
                        }
                        Job::Shutdown => {
                            debug!("UI dispatch loop shut down from pump");
                            shared.close();
                            rx.close();
                            return started + batch;
                        }
                    }
                }
                // Yield so spawned and freshly woken tasks get polled.
                tokio::task::yield_now().await;
                started += batch;
                if batch == 0 {
                    return started;
                }
            }
        })
    }
}

impl Drop for DispatchLoop {
    fn drop(&mut self) {
        self.shared.close();
        self.rx.close();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[test]
    fn pump_drains_and_completes_sync_work() {
        let (mut ui_loop, dispatcher) = DispatchLoop::new(16).unwrap();
        let mut handle = dispatcher.invoke(|| "hi");
        assert_eq!(handle.try_result(), None);
        assert_eq!(ui_loop.pump(), 1);
        assert_eq!(handle.try_result(), Some(Ok("hi")));
        assert_eq!(dispatcher.pending(), 0);
    }

    #[test]
    fn pump_runs_work_scheduled_by_work() {
        let (mut ui_loop, dispatcher) = DispatchLoop::new(16).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let inner = dispatcher.clone();
        let outer_seen = Arc::clone(&seen);
        dispatcher
            .post(move || {
                outer_seen.lock().unwrap().push("outer");
                let inner_seen = Arc::clone(&outer_seen);
                inner.post(move || inner_seen.lock().unwrap().push("inner")).unwrap();
            })
            .unwrap();

        assert_eq!(ui_loop.pump(), 2);
        assert_eq!(*seen.lock().unwrap(), vec!["outer", "inner"]);
    }

    #[test]
    fn pump_on_the_loop_thread_has_access() {
        let (mut ui_loop, dispatcher) = DispatchLoop::new(16).unwrap();
        assert!(dispatcher.check_access());
        let inner = dispatcher.clone();
        let mut handle = dispatcher.invoke(move || inner.check_access());
        ui_loop.pump();
        assert_eq!(handle.try_result(), Some(Ok(true)));
    }

    #[test]
    fn suspended_work_resumes_on_a_later_pump() {
        let (mut ui_loop, dispatcher) = DispatchLoop::new(16).unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<u32>();
        let mut handle = dispatcher.invoke_async(move || async move { rx.await.unwrap_or(0) + 1 });

        ui_loop.pump();
        assert_eq!(handle.try_result(), None);

        let _ = tx.send(41);
        ui_loop.pump();
        assert_eq!(handle.try_result(), Some(Ok(42)));
    }

    #[test]
    fn shutdown_via_pump_closes_the_dispatcher() {
        let (mut ui_loop, dispatcher) = DispatchLoop::new(16).unwrap();
        dispatcher.shutdown();
        ui_loop.pump();
        assert!(dispatcher.is_closed());
        let mut handle = dispatcher.invoke(|| ());
        assert_eq!(handle.try_result(), Some(Err(DispatchError::SurfaceGone)));
        assert_eq!(ui_loop.pump(), 0);
    }

    #[test]
    fn dropping_the_loop_resolves_queued_work() {
        let (ui_loop, dispatcher) = DispatchLoop::new(16).unwrap();
        let mut handle = dispatcher.invoke(|| 1);
        drop(ui_loop);
        assert_eq!(handle.try_result(), Some(Err(DispatchError::SurfaceGone)));
    }
}
