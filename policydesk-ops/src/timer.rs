//! Owned, cancellable timer tasks.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;

/// A spawned timer task with exactly one owner.
///
/// Cancelling consumes the handle and dropping it aborts the task, so a timer
/// can be retired at most once and never outlives its owner.
#[derive(Debug)]
pub struct TimerHandle {
    task: Option<JoinHandle<()>>,
}

impl TimerHandle {
    /// Spawn `task` on the current runtime.
    ///
    /// Returns `None` outside a Tokio runtime.
    pub fn spawn<F>(task: F) -> Option<Self>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current().ok()?;
        Some(Self {
            task: Some(runtime.spawn(task)),
        })
    }

    /// Run `callback` once after `delay`, unless cancelled first.
    pub fn after<F>(delay: Duration, callback: F) -> Option<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        Self::spawn(async move {
            tokio::time::sleep(delay).await;
            callback();
        })
    }

    pub fn cancel(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Release the task without aborting it. Used by a timer task retiring
    /// its own handle while it is still running.
    pub(crate) fn detach(mut self) {
        self.task.take();
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
