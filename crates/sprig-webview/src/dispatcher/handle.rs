use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use sprig_common::DispatchError;
use tokio::sync::oneshot;

/// Completion handle for work scheduled on the UI thread.
///
/// Resolves to the work's return value, or to the failure that kept it from
/// producing one. Dropping the handle does not cancel the work.
#[must_use = "dropping a DispatchHandle discards the work's result"]
pub struct DispatchHandle<T> {
    state: HandleState<T>,
}

enum HandleState<T> {
    Pending(oneshot::Receiver<Result<T, DispatchError>>),
    Rejected(Option<DispatchError>),
}

impl<T> DispatchHandle<T> {
    pub(super) fn pending(rx: oneshot::Receiver<Result<T, DispatchError>>) -> Self {
        Self {
            state: HandleState::Pending(rx),
        }
    }

    /// A handle for work that was never enqueued.
    pub(super) fn rejected(error: DispatchError) -> Self {
        Self {
            state: HandleState::Rejected(Some(error)),
        }
    }

    /// Poll once without a task context. `None` while the work is pending.
    pub fn try_result(&mut self) -> Option<Result<T, DispatchError>> {
        match &mut self.state {
            HandleState::Pending(rx) => match rx.try_recv() {
                Ok(result) => Some(result),
                Err(oneshot::error::TryRecvError::Empty) => None,
                Err(oneshot::error::TryRecvError::Closed) => Some(Err(DispatchError::SurfaceGone)),
            },
            HandleState::Rejected(error) => error.take().map(Err),
        }
    }
}

impl<T> Future for DispatchHandle<T> {
    type Output = Result<T, DispatchError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            // A dropped sender means the loop discarded the work.
            HandleState::Pending(rx) => Pin::new(rx)
                .poll(cx)
                .map(|received| received.unwrap_or(Err(DispatchError::SurfaceGone))),
            HandleState::Rejected(error) => {
                Poll::Ready(Err(error.take().unwrap_or(DispatchError::SurfaceGone)))
            }
        }
    }
}

impl<T> std::fmt::Debug for DispatchHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            HandleState::Pending(_) => "pending",
            HandleState::Rejected(_) => "rejected",
        };
        f.debug_struct("DispatchHandle").field("state", &state).finish()
    }
}
