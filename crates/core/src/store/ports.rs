//! Port interfaces for metric storage

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use tally_domain::{MetricSample, MetricValue, Result, TallyError};

/// Opaque handle for one open backend transaction.
///
/// Created by [`MetricStore::begin`] and threaded explicitly through
/// [`MetricStore::set_metric`]; consumed by `commit` or `rollback`. Each
/// backend stores its own state inside and recovers it by downcasting.
pub struct StoreTransaction {
    backend: &'static str,
    inner: Box<dyn Any + Send>,
}

impl StoreTransaction {
    pub fn new<T: Any + Send>(backend: &'static str, inner: T) -> Self {
        Self { backend, inner: Box::new(inner) }
    }

    /// Name of the backend that opened this transaction.
    pub fn backend(&self) -> &'static str {
        self.backend
    }

    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.inner.downcast_mut::<T>()
    }

    /// Recover the backend state, or hand the handle back untouched.
    pub fn into_inner<T: Any>(self) -> std::result::Result<T, Self> {
        let backend = self.backend;
        match self.inner.downcast::<T>() {
            Ok(inner) => Ok(*inner),
            Err(inner) => Err(Self { backend, inner }),
        }
    }
}

impl fmt::Debug for StoreTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreTransaction").field("backend", &self.backend).finish_non_exhaustive()
    }
}

/// Trait for metric storage backends
///
/// Implementations must make every per-name read-modify-write atomic under
/// concurrent callers, and must return copies (never live views) from the
/// read operations.
#[async_trait]
pub trait MetricStore: Send + Sync {
    /// Short backend name for logs
    fn backend_name(&self) -> &'static str;

    /// Current value of one metric
    async fn get_metric(&self, name: &str) -> Result<Option<MetricValue>>;

    /// Snapshot of every metric
    async fn get_all(&self) -> Result<BTreeMap<String, MetricValue>>;

    /// Merge `sample` into the metric `name` and return the stored result.
    ///
    /// With `tx`, the write joins that transaction and becomes visible only
    /// on commit.
    async fn set_metric(
        &self,
        tx: Option<&mut StoreTransaction>,
        name: &str,
        sample: MetricSample,
    ) -> Result<MetricValue>;

    /// Open a transaction; `None` when the backend is not transactional.
    async fn begin(&self) -> Result<Option<StoreTransaction>> {
        Ok(None)
    }

    async fn commit(&self, tx: StoreTransaction) -> Result<()> {
        Err(TallyError::Internal(format!(
            "{} does not support transactions (handle from {})",
            self.backend_name(),
            tx.backend()
        )))
    }

    async fn rollback(&self, tx: StoreTransaction) -> Result<()> {
        Err(TallyError::Internal(format!(
            "{} does not support transactions (handle from {})",
            self.backend_name(),
            tx.backend()
        )))
    }

    /// Verify the backend is reachable
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
