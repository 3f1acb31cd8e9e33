//! Collection service - applies one source snapshot per poll

use std::sync::Arc;

use tally_domain::Result;
use tracing::{debug, warn};

use super::ports::SampleSource;
use crate::store::MetricStore;

/// Outcome of one poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub applied: usize,
    pub failed: usize,
}

/// Samples a [`SampleSource`] into a [`MetricStore`].
pub struct CollectionService {
    source: Arc<dyn SampleSource>,
    store: Arc<dyn MetricStore>,
}

impl CollectionService {
    pub fn new(source: Arc<dyn SampleSource>, store: Arc<dyn MetricStore>) -> Self {
        Self { source, store }
    }

    /// Collect once and merge every sample.
    ///
    /// A failing sample is logged and skipped; only a failing source aborts
    /// the poll.
    pub async fn poll_once(&self) -> Result<PollSummary> {
        let samples = self.source.collect().await?;
        let mut summary = PollSummary::default();

        for (name, sample) in samples {
            match self.store.set_metric(None, &name, sample).await {
                Ok(_) => summary.applied += 1,
                Err(err) => {
                    summary.failed += 1;
                    warn!(metric = %name, error = %err, "failed to store sample");
                }
            }
        }

        debug!(applied = summary.applied, failed = summary.failed, "poll complete");
        Ok(summary)
    }
}
