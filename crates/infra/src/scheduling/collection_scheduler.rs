//! Polls a sample source into the agent's store on a fixed period.

use std::sync::Arc;
use std::time::Duration;

use tally_core::CollectionService;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error};

use super::error::SchedulerResult;
use super::task::BackgroundTask;

const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs [`CollectionService::poll_once`] every `poll_interval`.
///
/// The first poll fires immediately. A failing poll is logged; the loop keeps
/// going.
pub struct CollectionScheduler {
    service: Arc<CollectionService>,
    poll_interval: Duration,
    task: BackgroundTask,
}

impl CollectionScheduler {
    pub fn new(service: Arc<CollectionService>, poll_interval: Duration) -> Self {
        Self { service, poll_interval, task: BackgroundTask::new("collection", JOIN_TIMEOUT) }
    }

    /// # Errors
    ///
    /// Returns error if the scheduler is already running
    pub async fn start(&mut self) -> SchedulerResult<()> {
        let service = Arc::clone(&self.service);
        let period = self.poll_interval;

        self.task
            .start(move |cancel| async move {
                let mut ticker = interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            debug!("collection loop cancelled");
                            break;
                        }
                        _ = ticker.tick() => {
                            if let Err(err) = service.poll_once().await {
                                error!(error = %err, "metric poll failed");
                            }
                        }
                    }
                }
            })
            .await
    }

    /// # Errors
    ///
    /// Returns error if the scheduler is not running or fails to join
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        self.task.stop().await
    }

    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }
}
