//! SQLite-backed implementation of `MetricStore`
//!
//! Every write is a single upsert that applies the merge rule inside SQLite,
//! so concurrent writers never lose updates. Calls run on the blocking pool,
//! bounded by the operation timeout, and transient failures are retried
//! through a fresh [`BackoffPolicy`] per call.
//!
//! Write retries only fire for failures that guarantee the statement did not
//! apply (busy/locked database, pool checkout). A timeout that fires while a
//! write is in flight is surfaced instead: the write may still land, and
//! repeating a counter upsert would count it twice.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tally_common::{retry_with_backoff, BackoffPolicy};
use tally_core::{MetricStore, StoreTransaction};
use tally_domain::{
    DatabaseConfig, MetricKind, MetricSample, MetricValue, Result, RetrySettings, TallyError,
};
use tokio::runtime::Handle;
use tokio::task;
use tracing::{debug, instrument, warn};

use super::manager::DbManager;
use crate::errors::conversions::infra_err;

const BACKEND_NAME: &str = "sqlite";

const UPSERT_COUNTER_SQL: &str = "INSERT INTO metrics (name, kind, delta, value) VALUES (?1, 'counter', ?2, NULL)
     ON CONFLICT(name) DO UPDATE SET
         delta = CASE WHEN metrics.kind = 'counter' THEN metrics.delta + excluded.delta ELSE excluded.delta END,
         value = NULL,
         kind = 'counter'
     RETURNING delta";

const UPSERT_GAUGE_SQL: &str = "INSERT INTO metrics (name, kind, delta, value) VALUES (?1, 'gauge', NULL, ?2)
     ON CONFLICT(name) DO UPDATE SET
         value = excluded.value,
         delta = NULL,
         kind = 'gauge'
     RETURNING value";

/// Connection pinned to one open transaction.
///
/// Rolled back on drop unless committed or rolled back explicitly.
struct DurableTx {
    conn: Arc<Mutex<tally_common::SqliteConnection>>,
    finished: bool,
}

impl Drop for DurableTx {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        warn!("durable transaction dropped without commit; rolling back");
        let conn = Arc::clone(&self.conn);
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || rollback_on_drop(&conn));
            }
            Err(_) => rollback_on_drop(&conn),
        }
    }
}

fn rollback_on_drop(conn: &Mutex<tally_common::SqliteConnection>) {
    if let Err(err) = conn.lock().execute_batch("ROLLBACK") {
        warn!(error = %err, "rollback on drop failed");
    }
}

/// Durable metric store
pub struct DurableStore {
    db: Arc<DbManager>,
    retry: RetrySettings,
    operation_timeout: Duration,
}

impl DurableStore {
    /// Create a store over an already-migrated database.
    pub fn new(db: Arc<DbManager>, retry: RetrySettings, operation_timeout: Duration) -> Self {
        Self { db, retry, operation_timeout }
    }

    /// Open, migrate and wrap the database described by `config`.
    pub fn open(config: &DatabaseConfig, retry: RetrySettings) -> Result<Self> {
        let db = DbManager::new(config)?;
        db.run_migrations()?;
        Ok(Self::new(Arc::new(db), retry, config.operation_timeout()))
    }

    pub fn db(&self) -> &Arc<DbManager> {
        &self.db
    }

    fn backoff_policy(&self) -> Result<BackoffPolicy> {
        BackoffPolicy::new(
            self.retry.initial_interval(),
            self.retry.increment(),
            self.retry.max_attempts,
        )
        .map_err(|e| TallyError::Config(e.to_string()))
    }

    /// Run `operation` on a pooled connection with timeout and retry.
    async fn with_connection<T, F>(
        &self,
        name: &'static str,
        retryable: fn(&TallyError) -> bool,
        operation: F,
    ) -> Result<T>
    where
        T: Send + 'static,
        F: Fn(&Connection) -> Result<T> + Send + Sync + 'static,
    {
        let operation = Arc::new(operation);
        retry_with_backoff(self.backoff_policy()?, name, retryable, || {
            let db = Arc::clone(&self.db);
            let operation = Arc::clone(&operation);
            let blocking = task::spawn_blocking(move || -> Result<T> {
                let conn = db.get_connection().map_err(checkout_failure)?;
                operation(&conn)
            });
            bounded(name, self.operation_timeout, blocking)
        })
        .await
    }

    /// Run `operation` on the connection pinned by `tx`.
    async fn with_transaction<T, F>(
        &self,
        tx: &mut StoreTransaction,
        name: &'static str,
        operation: F,
    ) -> Result<T>
    where
        T: Send + 'static,
        F: Fn(&Connection) -> Result<T> + Send + Sync + 'static,
    {
        let conn = durable_tx(tx)?.conn.clone();
        let operation = Arc::new(operation);
        retry_with_backoff(self.backoff_policy()?, name, is_unapplied, || {
            let conn = Arc::clone(&conn);
            let operation = Arc::clone(&operation);
            let blocking = task::spawn_blocking(move || operation(&conn.lock()));
            bounded(name, self.operation_timeout, blocking)
        })
        .await
    }
}

#[async_trait]
impl MetricStore for DurableStore {
    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }

    #[instrument(skip(self))]
    async fn get_metric(&self, name: &str) -> Result<Option<MetricValue>> {
        let name = name.to_string();
        self.with_connection("durable_store.get_metric", TallyError::is_transient, move |conn| {
            conn.query_row(
                "SELECT kind, delta, value FROM metrics WHERE name = ?1",
                params![&name],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<i64>>(1)?,
                        row.get::<_, Option<f64>>(2)?,
                    ))
                },
            )
            .optional()
            .map_err(infra_err)?
            .map(|(kind, delta, value)| row_to_value(&kind, delta, value))
            .transpose()
        })
        .await
    }

    async fn get_all(&self) -> Result<BTreeMap<String, MetricValue>> {
        self.with_connection("durable_store.get_all", TallyError::is_transient, |conn| {
            let mut stmt = conn
                .prepare("SELECT name, kind, delta, value FROM metrics ORDER BY name")
                .map_err(infra_err)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<i64>>(2)?,
                        row.get::<_, Option<f64>>(3)?,
                    ))
                })
                .map_err(infra_err)?;

            let mut metrics = BTreeMap::new();
            for row in rows {
                let (name, kind, delta, value) = row.map_err(infra_err)?;
                metrics.insert(name, row_to_value(&kind, delta, value)?);
            }
            Ok(metrics)
        })
        .await
    }

    #[instrument(skip(self, tx), fields(in_tx = tx.is_some()))]
    async fn set_metric(
        &self,
        tx: Option<&mut StoreTransaction>,
        name: &str,
        sample: MetricSample,
    ) -> Result<MetricValue> {
        sample.validate()?;
        let name = name.to_string();
        let apply = move |conn: &Connection| upsert(conn, &name, sample);

        match tx {
            Some(tx) => self.with_transaction(tx, "durable_store.set_metric", apply).await,
            None => self.with_connection("durable_store.set_metric", is_unapplied, apply).await,
        }
    }

    async fn begin(&self) -> Result<Option<StoreTransaction>> {
        let db = Arc::clone(&self.db);
        let timeout = self.operation_timeout;
        let tx = retry_with_backoff(self.backoff_policy()?, "durable_store.begin", is_unapplied, || {
            let db = Arc::clone(&db);
            let blocking = task::spawn_blocking(move || -> Result<DurableTx> {
                let conn = db.get_connection().map_err(checkout_failure)?;
                conn.execute_batch("BEGIN IMMEDIATE").map_err(infra_err)?;
                Ok(DurableTx { conn: Arc::new(Mutex::new(conn)), finished: false })
            });
            bounded("durable_store.begin", timeout, blocking)
        })
        .await?;

        debug!("durable transaction opened");
        Ok(Some(StoreTransaction::new(BACKEND_NAME, tx)))
    }

    async fn commit(&self, tx: StoreTransaction) -> Result<()> {
        finish(tx, "COMMIT", self.operation_timeout).await
    }

    async fn rollback(&self, tx: StoreTransaction) -> Result<()> {
        finish(tx, "ROLLBACK", self.operation_timeout).await
    }

    async fn health_check(&self) -> Result<()> {
        self.with_connection("durable_store.health_check", TallyError::is_transient, |conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)).map_err(infra_err)?;
            Ok(())
        })
        .await
    }
}

fn upsert(conn: &Connection, name: &str, sample: MetricSample) -> Result<MetricValue> {
    match sample {
        MetricSample::Counter(delta) => conn
            .query_row(UPSERT_COUNTER_SQL, params![name, delta], |row| row.get::<_, i64>(0))
            .map(MetricValue::Counter)
            .map_err(infra_err),
        MetricSample::Gauge(value) => conn
            .query_row(UPSERT_GAUGE_SQL, params![name, value], |row| row.get::<_, f64>(0))
            .map(MetricValue::Gauge)
            .map_err(infra_err),
    }
}

fn row_to_value(kind: &str, delta: Option<i64>, value: Option<f64>) -> Result<MetricValue> {
    match (MetricKind::parse(kind)?, delta, value) {
        (MetricKind::Counter, Some(delta), _) => Ok(MetricValue::Counter(delta)),
        (MetricKind::Gauge, _, Some(value)) => Ok(MetricValue::Gauge(value)),
        (kind, _, _) => Err(TallyError::Database(format!("stored {kind} row has no payload"))),
    }
}

/// Commit or roll back `tx` on its pinned connection.
async fn finish(mut tx: StoreTransaction, statement: &'static str, timeout: Duration) -> Result<()> {
    let conn = durable_tx(&mut tx)?.conn.clone();
    let mut state = tx
        .into_inner::<DurableTx>()
        .map_err(|tx| foreign_handle(tx.backend()))?;

    let blocking = task::spawn_blocking(move || {
        conn.lock().execute_batch(statement).map_err(infra_err)
    });
    let outcome = bounded("durable_store.finish", timeout, blocking).await;

    // A failed COMMIT leaves the transaction open; dropping the state rolls
    // it back.
    state.finished = outcome.is_ok();
    debug!(statement, ok = state.finished, "durable transaction finished");
    outcome
}

fn durable_tx(tx: &mut StoreTransaction) -> Result<&mut DurableTx> {
    let backend = tx.backend();
    tx.downcast_mut::<DurableTx>().ok_or_else(|| foreign_handle(backend))
}

fn foreign_handle(backend: &str) -> TallyError {
    TallyError::Internal(format!("transaction handle from '{backend}' used with {BACKEND_NAME}"))
}

/// Await a blocking task under `timeout`.
async fn bounded<T>(
    name: &'static str,
    timeout: Duration,
    blocking: task::JoinHandle<Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(timeout, blocking).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(TallyError::Internal(format!("{name} task failed: {join_err}"))),
        Err(_) => Err(TallyError::Timeout(format!("{name} exceeded {}ms", timeout.as_millis()))),
    }
}

/// A checkout failure happens before any statement runs, so it is always
/// safe to retry.
fn checkout_failure(err: TallyError) -> TallyError {
    match err {
        TallyError::Timeout(message) => TallyError::DatabaseTransient(message),
        other => other,
    }
}

/// Failures that guarantee the statement was not applied.
fn is_unapplied(err: &TallyError) -> bool {
    matches!(err, TallyError::DatabaseTransient(_))
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn fast_retry() -> RetrySettings {
        RetrySettings { initial_interval_ms: 10, increment_ms: 10, max_attempts: 2 }
    }

    fn open_store(dir: &TempDir) -> DurableStore {
        let config = DatabaseConfig { path: dir.path().join("metrics.db"), ..DatabaseConfig::default() };
        DurableStore::open(&config, fast_retry()).expect("store opens")
    }

    #[tokio::test]
    async fn counter_accumulates_and_gauge_overwrites() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store.set_metric(None, "PollCount", MetricSample::Counter(3)).await.unwrap();
        let merged = store.set_metric(None, "PollCount", MetricSample::Counter(4)).await.unwrap();
        assert_eq!(merged, MetricValue::Counter(7));

        store.set_metric(None, "Alloc", MetricSample::Gauge(1.5)).await.unwrap();
        store.set_metric(None, "Alloc", MetricSample::Gauge(1.5)).await.unwrap();
        assert_eq!(store.get_metric("Alloc").await.unwrap(), Some(MetricValue::Gauge(1.5)));
        assert_eq!(store.get_metric("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn kind_switch_discards_previous_number() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store.set_metric(None, "m", MetricSample::Counter(10)).await.unwrap();
        store.set_metric(None, "m", MetricSample::Gauge(2.5)).await.unwrap();
        let back = store.set_metric(None, "m", MetricSample::Counter(1)).await.unwrap();
        assert_eq!(back, MetricValue::Counter(1));
    }

    #[tokio::test]
    async fn rollback_discards_transaction_writes() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store.set_metric(None, "kept", MetricSample::Counter(1)).await.unwrap();

        let mut tx = store.begin().await.unwrap().expect("sqlite is transactional");
        store.set_metric(Some(&mut tx), "kept", MetricSample::Counter(5)).await.unwrap();
        store.set_metric(Some(&mut tx), "new", MetricSample::Gauge(1.0)).await.unwrap();
        store.rollback(tx).await.unwrap();

        let all = store.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all["kept"], MetricValue::Counter(1));
    }

    #[tokio::test]
    async fn commit_publishes_transaction_writes() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let mut tx = store.begin().await.unwrap().unwrap();
        store.set_metric(Some(&mut tx), "a", MetricSample::Counter(2)).await.unwrap();
        let merged = store.set_metric(Some(&mut tx), "a", MetricSample::Counter(3)).await.unwrap();
        assert_eq!(merged, MetricValue::Counter(5));
        store.commit(tx).await.unwrap();

        assert_eq!(store.get_metric("a").await.unwrap(), Some(MetricValue::Counter(5)));
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        {
            let mut tx = store.begin().await.unwrap().unwrap();
            store.set_metric(Some(&mut tx), "ghost", MetricSample::Counter(1)).await.unwrap();
        }

        assert!(store.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn write_lock_is_released_after_dropped_transaction() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        for round in 0..4 {
            let mut tx = store.begin().await.unwrap().unwrap();
            store.set_metric(Some(&mut tx), "ghost", MetricSample::Counter(round)).await.unwrap();
            drop(tx);
        }

        let mut tx = store.begin().await.unwrap().unwrap();
        store.set_metric(Some(&mut tx), "real", MetricSample::Gauge(4.0)).await.unwrap();
        store.commit(tx).await.unwrap();

        let all = store.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all["real"], MetricValue::Gauge(4.0));
    }

    #[test]
    fn transaction_dropped_outside_runtime_rolls_back_inline() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();

        let tx = runtime.block_on(async {
            let mut tx = store.begin().await.unwrap().unwrap();
            store.set_metric(Some(&mut tx), "ghost", MetricSample::Counter(1)).await.unwrap();
            tx
        });
        drop(tx);

        let all = runtime.block_on(store.get_all()).unwrap();
        assert!(all.is_empty());
        let written = runtime
            .block_on(store.set_metric(None, "after", MetricSample::Counter(2)))
            .unwrap();
        assert_eq!(written, MetricValue::Counter(2));
    }

    #[tokio::test]
    async fn constraint_violation_fails_without_retry() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let long_name = "x".repeat(256);
        let err = store.set_metric(None, &long_name, MetricSample::Counter(1)).await.unwrap_err();
        assert!(matches!(err, TallyError::Database(_)), "got {err:?}");
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn foreign_transaction_handle_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let mut tx = StoreTransaction::new("memory", ());
        let err =
            store.set_metric(Some(&mut tx), "x", MetricSample::Counter(1)).await.unwrap_err();
        assert!(matches!(err, TallyError::Internal(_)));
    }

    #[tokio::test]
    async fn non_finite_gauge_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let err = store.set_metric(None, "g", MetricSample::Gauge(f64::NAN)).await.unwrap_err();
        assert!(matches!(err, TallyError::InvalidInput(_)));
    }
}
