//! Start/stop lifecycle shared by every background loop.
//!
//! A loop receives a [`CancellationToken`]; `stop` cancels it and then waits
//! for the loop to return, so an in-flight tick always completes. A fresh
//! token is minted on every `start`, which makes restart after stop work.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::error::{SchedulerError, SchedulerResult};

/// Type alias for task handle to avoid complexity warnings
type TaskHandle = Arc<Mutex<Option<JoinHandle<()>>>>;

/// One cancellable background loop.
pub struct BackgroundTask {
    name: &'static str,
    join_timeout: Duration,
    cancellation_token: CancellationToken,
    task_handle: TaskHandle,
}

impl BackgroundTask {
    pub fn new(name: &'static str, join_timeout: Duration) -> Self {
        Self {
            name,
            join_timeout,
            cancellation_token: CancellationToken::new(),
            task_handle: Arc::new(Mutex::new(None)),
        }
    }

    /// Spawn `run` with a fresh cancellation token.
    ///
    /// # Errors
    ///
    /// Returns error if the loop is already running
    pub async fn start<F, Fut>(&mut self, run: F) -> SchedulerResult<()>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }

        self.cancellation_token = CancellationToken::new();
        let handle = tokio::spawn(run(self.cancellation_token.clone()));
        *self.task_handle.lock().await = Some(handle);

        info!(task = self.name, "background task started");
        Ok(())
    }

    /// Cancel the loop and wait for it to finish its current tick.
    ///
    /// # Errors
    ///
    /// Returns error if the loop is not running, did not finish within the
    /// join timeout, or panicked
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        if !self.is_running() {
            return Err(SchedulerError::NotRunning);
        }

        info!(task = self.name, "stopping background task");
        self.cancellation_token.cancel();

        if let Some(handle) = self.task_handle.lock().await.take() {
            tokio::time::timeout(self.join_timeout, handle)
                .await
                .map_err(|_| SchedulerError::Timeout { seconds: self.join_timeout.as_secs() })?
                .map_err(|e| SchedulerError::TaskJoinFailed(e.to_string()))?;
        }

        info!(task = self.name, "background task stopped");
        Ok(())
    }

    /// A task is running while it has a handle that hasn't finished.
    pub fn is_running(&self) -> bool {
        self.task_handle
            .try_lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|h| !h.is_finished()))
            .unwrap_or(false)
    }
}

/// Best-effort cancellation when dropped while running
impl Drop for BackgroundTask {
    fn drop(&mut self) {
        if self.is_running() && !self.cancellation_token.is_cancelled() {
            warn!(task = self.name, "background task dropped while running; cancelling");
            self.cancellation_token.cancel();
        }
    }
}
