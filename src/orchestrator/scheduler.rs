//! Deferred execution of fallback retries

use futures::future::BoxFuture;
use std::time::Duration;

/// Cancels a scheduled task. Dropping the handle leaves the task scheduled.
pub struct CancellationHandle {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl CancellationHandle {
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A handle with nothing to cancel.
    pub fn noop() -> Self {
        Self { cancel: None }
    }

    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for CancellationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationHandle")
            .field("armed", &self.cancel.is_some())
            .finish()
    }
}

/// Runs a task once after a delay.
pub trait Scheduler: Send + Sync {
    fn schedule_after(&self, delay: Duration, task: BoxFuture<'static, ()>) -> CancellationHandle;
}

/// Spawns each task on the current tokio runtime.
///
/// Must be called from within a runtime. Uses `tokio::time`, so tests
/// running with paused time control when retries fire.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn schedule_after(&self, delay: Duration, task: BoxFuture<'static, ()>) -> CancellationHandle {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        });
        CancellationHandle::new(move || handle.abort())
    }
}
