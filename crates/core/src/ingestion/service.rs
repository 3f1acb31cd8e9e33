//! Batch ingestion service - applies wire records to a metric store

use std::sync::Arc;

use tally_domain::{MetricRecord, MetricSample, MetricValue, Result, TallyError};
use tracing::{debug, instrument, warn};

use super::ports::IngestionObserver;
use crate::store::MetricStore;

/// Applies decoded batches to a [`MetricStore`].
///
/// Every record is validated before the store is touched. On a transactional
/// backend the whole batch runs in one transaction: any failing record rolls
/// the batch back, so either every record is visible or none is.
pub struct IngestionService {
    store: Arc<dyn MetricStore>,
    observer: Option<Arc<dyn IngestionObserver>>,
}

impl IngestionService {
    pub fn new(store: Arc<dyn MetricStore>) -> Self {
        Self { store, observer: None }
    }

    /// Register a hook that runs after each committed batch.
    pub fn with_observer(mut self, observer: Arc<dyn IngestionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn store(&self) -> &Arc<dyn MetricStore> {
        &self.store
    }

    /// Apply a batch; returns the merged value of each record in order.
    #[instrument(skip(self, records), fields(records = records.len(), backend = self.store.backend_name()))]
    pub async fn apply_batch(&self, records: &[MetricRecord]) -> Result<Vec<MetricValue>> {
        let samples = records
            .iter()
            .map(|record| record.try_into_sample().map(|sample| (record.id.as_str(), sample)))
            .collect::<Result<Vec<(&str, MetricSample)>>>()?;

        if samples.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.store.begin().await?;
        let mut merged = Vec::with_capacity(samples.len());

        for (name, sample) in samples {
            match self.store.set_metric(tx.as_mut(), name, sample).await {
                Ok(value) => merged.push(value),
                Err(err) => {
                    warn!(metric = name, error = %err, "record failed, discarding batch");
                    if let Some(tx) = tx {
                        if let Err(rollback_err) = self.store.rollback(tx).await {
                            warn!(error = %rollback_err, "rollback failed");
                        }
                    }
                    return Err(err);
                }
            }
        }

        if let Some(tx) = tx {
            self.store.commit(tx).await?;
        }
        debug!(applied = merged.len(), "batch applied");

        if let Some(observer) = &self.observer {
            observer.on_batch_applied(merged.len()).await;
        }
        Ok(merged)
    }

    /// Apply a single record and return its merged value.
    pub async fn apply_record(&self, record: &MetricRecord) -> Result<MetricValue> {
        self.apply_batch(std::slice::from_ref(record))
            .await?
            .pop()
            .ok_or_else(|| TallyError::Internal("single-record batch produced no value".to_string()))
    }
}
