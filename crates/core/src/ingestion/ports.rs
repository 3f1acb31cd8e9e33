//! Port interfaces for ingestion side effects

use async_trait::async_trait;

/// Notified after a batch has been applied and committed.
#[async_trait]
pub trait IngestionObserver: Send + Sync {
    /// `applied` is the number of records in the committed batch.
    async fn on_batch_applied(&self, applied: usize);
}
