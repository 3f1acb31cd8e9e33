//! Periodic snapshot of the memory backend.

use std::sync::Arc;
use std::time::Duration;

use tally_core::MemoryStore;
use tokio::task;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use super::error::SchedulerResult;
use super::task::BackgroundTask;
use crate::snapshot::SnapshotFile;

const JOIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Saves a [`MemoryStore`] to a [`SnapshotFile`] every `store_interval`,
/// plus one final save when stopped.
pub struct SnapshotScheduler {
    store: Arc<MemoryStore>,
    file: SnapshotFile,
    store_interval: Duration,
    task: BackgroundTask,
}

impl SnapshotScheduler {
    pub fn new(store: Arc<MemoryStore>, file: SnapshotFile, store_interval: Duration) -> Self {
        Self { store, file, store_interval, task: BackgroundTask::new("snapshot", JOIN_TIMEOUT) }
    }

    /// # Errors
    ///
    /// Returns error if the scheduler is already running
    pub async fn start(&mut self) -> SchedulerResult<()> {
        let store = Arc::clone(&self.store);
        let file = self.file.clone();
        let period = self.store_interval;

        info!(path = %file.path().display(), interval_secs = period.as_secs(), "snapshot scheduler configured");

        self.task
            .start(move |cancel| async move {
                let mut ticker = interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = ticker.tick() => save(&store, &file).await,
                    }
                }

                debug!("snapshot loop cancelled, writing final snapshot");
                save(&store, &file).await;
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

async fn save(store: &Arc<MemoryStore>, file: &SnapshotFile) {
    let store = Arc::clone(store);
    let file = file.clone();

    match task::spawn_blocking(move || file.save(&store)).await {
        Ok(Ok(count)) => debug!(metrics = count, "periodic snapshot saved"),
        Ok(Err(e)) => error!(error = %e, "periodic snapshot failed"),
        Err(e) => error!(error = %e, "snapshot task panicked"),
    }
}

#[cfg(test)]
mod tests {
    use tally_core::MetricStore;
    use tally_domain::{MetricSample, MetricValue};
    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn saves_periodically_and_on_stop() {
        let dir = TempDir::new().unwrap();
        let file = SnapshotFile::new(dir.path().join("snap.json"));
        let store = Arc::new(MemoryStore::new());
        store.set_metric(None, "hits", MetricSample::Counter(1)).await.unwrap();

        let mut scheduler =
            SnapshotScheduler::new(store.clone(), file.clone(), Duration::from_millis(20));
        scheduler.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(file.load().unwrap().get("hits"), Some(&MetricValue::Counter(1)));

        store.set_metric(None, "hits", MetricSample::Counter(4)).await.unwrap();
        scheduler.stop().await.unwrap();
        assert_eq!(file.load().unwrap().get("hits"), Some(&MetricValue::Counter(5)));
    }

    #[tokio::test]
    async fn final_save_happens_even_before_first_tick() {
        let dir = TempDir::new().unwrap();
        let file = SnapshotFile::new(dir.path().join("snap.json"));
        let store = Arc::new(MemoryStore::new());
        store.set_metric(None, "Alloc", MetricSample::Gauge(3.5)).await.unwrap();

        let mut scheduler = SnapshotScheduler::new(store, file.clone(), Duration::from_secs(300));
        scheduler.start().await.unwrap();
        scheduler.stop().await.unwrap();

        assert_eq!(file.load().unwrap().get("Alloc"), Some(&MetricValue::Gauge(3.5)));
    }
}
