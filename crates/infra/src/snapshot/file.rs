//! JSON snapshot file for the memory backend.
//!
//! The file holds the same object `GET /` returns: records keyed by metric
//! name. Writes go to a sibling temp file that is synced and renamed over the
//! target, so a crash never leaves a half-written snapshot behind. Saves
//! through clones of one [`SnapshotFile`] are serialised, and `save` reads
//! the store only once it holds the lock, so the last rename always carries
//! the newest state.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tally_core::{IngestionObserver, MemoryStore};
use tally_domain::{snapshot_records, MetricSnapshot, MetricValue, Result, TallyError};
use tokio::task;
use tracing::{debug, error, info, warn};

/// Snapshot location on disk.
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), write_lock: Arc::new(Mutex::new(())) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist the current contents of `store`; returns the metric count.
    pub fn save(&self, store: &MemoryStore) -> Result<usize> {
        let _guard = self.write_lock.lock();
        self.write(&store.snapshot())
    }

    pub fn save_values(&self, values: &BTreeMap<String, MetricValue>) -> Result<usize> {
        let _guard = self.write_lock.lock();
        self.write(values)
    }

    /// Caller holds `write_lock`; the temp path is shared by every save.
    fn write(&self, values: &BTreeMap<String, MetricValue>) -> Result<usize> {
        let body = serde_json::to_vec_pretty(&snapshot_records(values))
            .map_err(|e| TallyError::Internal(format!("failed to serialise snapshot: {e}")))?;

        let tmp = self.temp_path();
        let written = (|| -> std::io::Result<()> {
            let mut file = File::create(&tmp)?;
            file.write_all(&body)?;
            file.sync_all()?;
            fs::rename(&tmp, &self.path)
        })();

        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(TallyError::Internal(format!(
                "failed to write snapshot {}: {e}",
                self.path.display()
            )));
        }

        debug!(path = %self.path.display(), metrics = values.len(), "snapshot saved");
        Ok(values.len())
    }

    /// Read the snapshot back.
    ///
    /// A missing file is an empty snapshot. An unreadable or corrupt file is
    /// logged and also treated as empty, as is any single entry that does not
    /// describe a valid metric.
    pub fn load(&self) -> Result<BTreeMap<String, MetricValue>> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no snapshot to restore");
                return Ok(BTreeMap::new());
            }
            Err(e) => {
                return Err(TallyError::Internal(format!(
                    "failed to read snapshot {}: {e}",
                    self.path.display()
                )))
            }
        };

        let records: MetricSnapshot = match serde_json::from_slice(&raw) {
            Ok(records) => records,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ignoring corrupt snapshot");
                return Ok(BTreeMap::new());
            }
        };

        let mut values = BTreeMap::new();
        for (name, record) in records {
            match record.try_into_sample().and_then(|sample| MetricValue::merge(None, sample)) {
                Ok(value) => {
                    values.insert(name, value);
                }
                Err(e) => warn!(metric = %name, error = %e, "skipping snapshot entry"),
            }
        }
        Ok(values)
    }

    /// Load the snapshot into `store`; returns the number of metrics restored.
    pub fn restore_into(&self, store: &MemoryStore) -> Result<usize> {
        let restored = store.restore(self.load()?)?;
        info!(path = %self.path.display(), metrics = restored, "snapshot restored");
        Ok(restored)
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(OsString::from).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

/// Saves the store after every committed ingestion batch.
///
/// Used when the snapshot interval is zero. The write runs on the blocking
/// pool and finishes before the ingestion response is sent.
pub struct SnapshotOnWrite {
    file: SnapshotFile,
    store: Arc<MemoryStore>,
}

impl SnapshotOnWrite {
    pub fn new(file: SnapshotFile, store: Arc<MemoryStore>) -> Self {
        Self { file, store }
    }
}

#[async_trait]
impl IngestionObserver for SnapshotOnWrite {
    async fn on_batch_applied(&self, applied: usize) {
        let file = self.file.clone();
        let store = Arc::clone(&self.store);

        match task::spawn_blocking(move || file.save(&store)).await {
            Ok(Ok(_)) => debug!(applied, "snapshot written after ingestion"),
            Ok(Err(e)) => error!(error = %e, "snapshot after ingestion failed"),
            Err(e) => error!(error = %e, "snapshot task panicked"),
        }
    }
}
