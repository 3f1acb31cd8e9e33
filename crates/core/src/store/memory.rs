//! Concurrent in-memory metric store

use std::collections::BTreeMap;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tally_domain::{validate_metric_name, MetricSample, MetricValue, Result};

use super::ports::{MetricStore, StoreTransaction};

/// Metric store backed by a sharded concurrent map.
///
/// Each `set_metric` holds the entry's shard lock for the whole
/// read-merge-write, so concurrent updates to one name never lose writes.
/// Snapshots may interleave with writers to other names.
#[derive(Debug, Default)]
pub struct MemoryStore {
    metrics: DashMap<String, MetricValue>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored state of `name` without merging (snapshot restore).
    pub fn insert_value(&self, name: impl Into<String>, value: MetricValue) -> Result<()> {
        let name = name.into();
        validate_metric_name(&name)?;
        value.as_sample().validate()?;
        self.metrics.insert(name, value);
        Ok(())
    }

    /// Load a snapshot over the current contents; returns the number of
    /// metrics restored.
    pub fn restore(&self, values: BTreeMap<String, MetricValue>) -> Result<usize> {
        let count = values.len();
        for (name, value) in values {
            self.insert_value(name, value)?;
        }
        Ok(count)
    }

    /// Synchronous snapshot for callers outside an async context.
    pub fn snapshot(&self) -> BTreeMap<String, MetricValue> {
        self.metrics.iter().map(|entry| (entry.key().clone(), *entry.value())).collect()
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    fn merge_in_place(&self, name: &str, sample: MetricSample) -> Result<MetricValue> {
        validate_metric_name(name)?;
        match self.metrics.entry(name.to_string()) {
            Entry::Occupied(mut entry) => {
                let merged = MetricValue::merge(Some(entry.get()), sample)?;
                entry.insert(merged);
                Ok(merged)
            }
            Entry::Vacant(entry) => {
                let merged = MetricValue::merge(None, sample)?;
                entry.insert(merged);
                Ok(merged)
            }
        }
    }
}

#[async_trait]
impl MetricStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn get_metric(&self, name: &str) -> Result<Option<MetricValue>> {
        Ok(self.metrics.get(name).map(|entry| *entry.value()))
    }

    async fn get_all(&self) -> Result<BTreeMap<String, MetricValue>> {
        Ok(self.snapshot())
    }

    async fn set_metric(
        &self,
        _tx: Option<&mut StoreTransaction>,
        name: &str,
        sample: MetricSample,
    ) -> Result<MetricValue> {
        self.merge_in_place(name, sample)
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for store::memory.

    use std::sync::Arc;

    use tally_domain::TallyError;

    use super::*;

    /// Validates `MemoryStore::set_metric` behavior for the counter
    /// accumulation scenario.
    ///
    /// Assertions:
    /// - Confirms `3` then `4` accumulates to `7`.
    #[tokio::test]
    async fn counter_accumulates() {
        let store = MemoryStore::new();
        store.set_metric(None, "requests", MetricSample::Counter(3)).await.unwrap();
        let merged = store.set_metric(None, "requests", MetricSample::Counter(4)).await.unwrap();

        assert_eq!(merged, MetricValue::Counter(7));
        assert_eq!(store.get_metric("requests").await.unwrap(), Some(MetricValue::Counter(7)));
    }

    /// Validates `MemoryStore::set_metric` behavior for the gauge idempotence
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms writing the same gauge twice leaves that value stored.
    #[tokio::test]
    async fn gauge_is_idempotent() {
        let store = MemoryStore::new();
        store.set_metric(None, "temp", MetricSample::Gauge(21.5)).await.unwrap();
        store.set_metric(None, "temp", MetricSample::Gauge(21.5)).await.unwrap();

        assert_eq!(store.get_metric("temp").await.unwrap(), Some(MetricValue::Gauge(21.5)));
    }

    /// Validates `MemoryStore::get_all` behavior for the snapshot is a copy
    /// scenario.
    ///
    /// Assertions:
    /// - Ensures later writes do not show up in an earlier snapshot.
    #[tokio::test]
    async fn get_all_returns_a_copy() {
        let store = MemoryStore::new();
        store.set_metric(None, "a", MetricSample::Counter(1)).await.unwrap();

        let before = store.get_all().await.unwrap();
        store.set_metric(None, "a", MetricSample::Counter(1)).await.unwrap();
        store.set_metric(None, "b", MetricSample::Gauge(1.0)).await.unwrap();

        assert_eq!(before.len(), 1);
        assert_eq!(before["a"], MetricValue::Counter(1));
        assert_eq!(store.get_all().await.unwrap().len(), 2);
    }

    /// Validates `MemoryStore::set_metric` behavior for the concurrent
    /// increments scenario.
    ///
    /// Assertions:
    /// - Confirms 50 tasks adding 1 a hundred times each yields exactly 5000.
    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_increments_are_not_lost() {
        let store = Arc::new(MemoryStore::new());

        let tasks: Vec<_> = (0..50)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    for _ in 0..100 {
                        store.set_metric(None, "hits", MetricSample::Counter(1)).await.unwrap();
                    }
                })
            })
            .collect();
        for task in futures::future::join_all(tasks).await {
            task.unwrap();
        }

        assert_eq!(store.get_metric("hits").await.unwrap(), Some(MetricValue::Counter(5000)));
    }

    /// Validates `MemoryStore::set_metric` behavior for the invalid input
    /// scenario.
    ///
    /// Assertions:
    /// - Ensures an empty name and a counter overflow leave the store
    ///   unchanged.
    #[tokio::test]
    async fn invalid_writes_do_not_mutate() {
        let store = MemoryStore::new();
        store.set_metric(None, "big", MetricSample::Counter(i64::MAX)).await.unwrap();

        assert!(matches!(
            store.set_metric(None, "", MetricSample::Counter(1)).await,
            Err(TallyError::InvalidInput(_))
        ));
        assert!(store.set_metric(None, "big", MetricSample::Counter(1)).await.is_err());
        assert_eq!(store.snapshot(), BTreeMap::from([("big".to_string(), MetricValue::Counter(i64::MAX))]));
    }

    /// Validates `MemoryStore::begin` behavior for the non-transactional
    /// backend scenario.
    ///
    /// Assertions:
    /// - Ensures `begin` yields no handle.
    #[tokio::test]
    async fn memory_store_is_not_transactional() {
        let store = MemoryStore::new();
        assert!(store.begin().await.unwrap().is_none());
        assert!(store.commit(StoreTransaction::new("other", ())).await.is_err());
    }

    /// Validates `MemoryStore::restore` behavior for the restore scenario.
    ///
    /// Assertions:
    /// - Confirms restored counters keep accumulating from the saved total.
    #[tokio::test]
    async fn restore_then_accumulate() {
        let store = MemoryStore::new();
        let saved = BTreeMap::from([
            ("PollCount".to_string(), MetricValue::Counter(10)),
            ("Alloc".to_string(), MetricValue::Gauge(2.5)),
        ]);
        assert_eq!(store.restore(saved).unwrap(), 2);

        store.set_metric(None, "PollCount", MetricSample::Counter(1)).await.unwrap();
        assert_eq!(store.get_metric("PollCount").await.unwrap(), Some(MetricValue::Counter(11)));
        assert_eq!(store.len(), 2);
    }
}
