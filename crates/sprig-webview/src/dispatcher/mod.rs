//! UI-thread affinity.
//!
//! A [`Dispatcher`] is a cloneable, thread-safe handle for scheduling work
//! onto the single thread that owns a surface. The owning thread drives a
//! [`DispatchLoop`], either blocking inside [`DispatchLoop::run`] or draining
//! it from its own event loop with [`DispatchLoop::pump`].
//!
//! Work starts in submission order, whether it is a plain closure or a
//! future. Panics inside work are caught and reported through the
//! [`DispatchHandle`]; they never take the loop down.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::ThreadId;

use futures_util::future::LocalBoxFuture;
use futures_util::FutureExt;
use sprig_common::DispatchError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

mod handle;
mod run_loop;
mod ui_thread;

pub use handle::DispatchHandle;
pub use run_loop::DispatchLoop;
pub use ui_thread::UiThread;

/// Default bound on pending work items.
pub const DEFAULT_QUEUE_CAPACITY: usize = 4096;

/// Builds the future for one work item once it reaches the UI thread.
type LocalJob = Box<dyn FnOnce() -> LocalBoxFuture<'static, ()> + Send>;

pub(crate) enum Job {
    Run(LocalJob),
    Shutdown,
}

type Waker = Arc<dyn Fn() + Send + Sync>;

pub(crate) struct Shared {
    tx: mpsc::UnboundedSender<Job>,
    pending: AtomicUsize,
    capacity: usize,
    ui_thread: ThreadId,
    closed: AtomicBool,
    waker: Mutex<Option<Waker>>,
}

impl Shared {
    pub(crate) fn job_started(&self) {
        self.pending.fetch_sub(1, Ordering::AcqRel);
    }

    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// Handle for scheduling work onto the UI thread. Cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
    shared: Arc<Shared>,
}

impl Dispatcher {
    /// True iff the caller is running on the UI thread.
    pub fn check_access(&self) -> bool {
        std::thread::current().id() == self.shared.ui_thread
    }

    /// Run `work` on the UI thread.
    ///
    /// Callable from any thread, the UI thread included: the work is always
    /// queued behind items already scheduled, never run inline.
    pub fn invoke<F, T>(&self, work: F) -> DispatchHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        // Work runs when the task is first polled, so it starts in spawn order
        // with async items.
        let job: LocalJob = Box::new(move || {
            async move {
                let result = std::panic::catch_unwind(AssertUnwindSafe(work)).map_err(panicked);
                let _ = tx.send(result);
            }
            .boxed_local()
        });
        match self.enqueue(job) {
            Ok(()) => DispatchHandle::pending(rx),
            Err(e) => DispatchHandle::rejected(e),
        }
    }

    /// Run the future produced by `work` on the UI thread.
    ///
    /// The future itself need not be `Send`; it is created and polled on the
    /// UI thread and may suspend there.
    pub fn invoke_async<F, Fut, T>(&self, work: F) -> DispatchHandle<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: LocalJob = Box::new(move || {
            async move {
                let result = match std::panic::catch_unwind(AssertUnwindSafe(work)) {
                    Ok(future) => AssertUnwindSafe(future).catch_unwind().await.map_err(panicked),
                    Err(payload) => Err(panicked(payload)),
                };
                let _ = tx.send(result);
            }
            .boxed_local()
        });
        match self.enqueue(job) {
            Ok(()) => DispatchHandle::pending(rx),
            Err(e) => DispatchHandle::rejected(e),
        }
    }

    /// Fire-and-forget variant of [`invoke`](Self::invoke).
    pub fn post<F>(&self, work: F) -> Result<(), DispatchError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.enqueue(Box::new(move || {
            async move {
                if let Err(payload) = std::panic::catch_unwind(AssertUnwindSafe(work)) {
                    let _ = panicked(payload);
                }
            }
            .boxed_local()
        }))
    }

    /// Called after every enqueue, from the enqueuing thread. Hosts that own
    /// their event loop use this to schedule a [`DispatchLoop::pump`].
    pub fn set_waker(&self, waker: impl Fn() + Send + Sync + 'static) {
        if let Ok(mut slot) = self.shared.waker.lock() {
            *slot = Some(Arc::new(waker));
        }
    }

    /// Ask the loop to stop. Work still queued resolves as `SurfaceGone`.
    pub fn shutdown(&self) {
        if !self.shared.closed.load(Ordering::Acquire) {
            let _ = self.shared.tx.send(Job::Shutdown);
            self.wake();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire) || self.shared.tx.is_closed()
    }

    /// Number of items queued but not yet started.
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    fn enqueue(&self, job: LocalJob) -> Result<(), DispatchError> {
        if self.is_closed() {
            return Err(DispatchError::SurfaceGone);
        }

        let capacity = self.shared.capacity;
        let reserved = self
            .shared
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < capacity).then_some(n + 1)
            });
        if reserved.is_err() {
            warn!(capacity, "dispatch queue full, rejecting work");
            return Err(DispatchError::QueueFull { capacity });
        }

        if self.shared.tx.send(Job::Run(job)).is_err() {
            self.shared.job_started();
            return Err(DispatchError::SurfaceGone);
        }
        self.wake();
        Ok(())
    }

    fn wake(&self) {
        let waker = self.shared.waker.lock().ok().and_then(|slot| slot.clone());
        if let Some(waker) = waker {
            waker();
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("ui_thread", &self.shared.ui_thread)
            .field("pending", &self.pending())
            .field("capacity", &self.shared.capacity)
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn panicked(payload: Box<dyn Any + Send>) -> DispatchError {
    let message = if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    };
    warn!(error = %message, "dispatched work panicked");
    DispatchError::Panicked(message)
}

pub(crate) fn shared(capacity: usize) -> (Arc<Shared>, mpsc::UnboundedReceiver<Job>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let capacity = capacity.max(1);
    debug!(capacity, "dispatcher created");
    let shared = Arc::new(Shared {
        tx,
        pending: AtomicUsize::new(0),
        capacity,
        ui_thread: std::thread::current().id(),
        closed: AtomicBool::new(false),
        waker: Mutex::new(None),
    });
    (shared, rx)
}

impl Dispatcher {
    pub(crate) fn from_shared(shared: Arc<Shared>) -> Self {
        Self { shared }
    }
}
