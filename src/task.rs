//! Cancellable background tasks.
//!
//! Every recurring timer in the crate (status polls, simulated training progress) runs inside a
//! [`ScheduledTask`]. The task is owned by whoever started it; stopping or dropping the owner
//! cancels the timer, so nothing keeps firing after the logical operation is gone.

use std::future::Future;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct ScheduledTask {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl ScheduledTask {
    /// Spawn `body` on the current tokio runtime.
    ///
    /// `body` receives the task's cancellation token and must return promptly once it fires.
    /// Panics if called outside a runtime, like `tokio::spawn`.
    pub fn start<F, Fut>(body: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(body(cancel.clone()));
        Self {
            cancel,
            handle: Some(handle),
        }
    }

    pub fn stop(&self) {
        if !self.cancel.is_cancelled() {
            tracing::debug!("Stopping scheduled task");
            self.cancel.cancel();
        }
    }

    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
            && self
                .handle
                .as_ref()
                .map_or(false, |handle| !handle.is_finished())
    }

    /// Wait until the task body has returned.
    pub async fn finished(mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                if !self.cancel.is_cancelled() {
                    tracing::error!("Scheduled task failed: {}", e);
                }
            }
        }
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
