//! SQLite connection pool
//!
//! r2d2-based pooling for SQLite databases. Every connection gets the
//! configured pragmas applied when it is opened.

use std::path::{Path, PathBuf};

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use tracing::{debug, info, instrument, warn};

use super::config::PoolConfig;
use super::pragmas::apply_connection_pragmas;
use crate::storage::error::{StorageError, StorageResult};

/// Connection checked out of a [`SqlitePool`].
pub type SqliteConnection = PooledConnection<SqliteConnectionManager>;

/// Point-in-time pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolState {
    pub connections: u32,
    pub idle_connections: u32,
    pub max_size: u32,
}

/// SQLite connection pool
#[derive(Debug, Clone)]
pub struct SqlitePool {
    pool: Pool<SqliteConnectionManager>,
    config: PoolConfig,
    path: PathBuf,
}

impl SqlitePool {
    /// Open (or create) the database at `path` and build the pool.
    ///
    /// # Errors
    /// Returns an error if:
    /// - the configuration is invalid
    /// - the database file can't be opened
    /// - a test connection can't be checked out
    #[instrument(skip(config), fields(db_path = ?path, pool_size = config.max_size))]
    pub fn open(path: &Path, config: PoolConfig) -> StorageResult<Self> {
        info!("Creating SQLite connection pool");
        config.validate().map_err(StorageError::InvalidConfig)?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let pool_config = config.clone();
        let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
            apply_connection_pragmas(conn, &pool_config)
                .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
        });

        let pool = Pool::builder()
            .max_size(config.max_size)
            .connection_timeout(config.connection_timeout)
            .build(manager)
            .map_err(|e| {
                warn!("Failed to create connection pool: {}", e);
                StorageError::Connection(format!("Failed to create pool: {}", e))
            })?;

        info!("SQLite pool created with {} connections", config.max_size);
        Ok(Self { pool, config, path: path.to_path_buf() })
    }

    /// Check a connection out of the pool.
    pub fn get(&self) -> StorageResult<SqliteConnection> {
        let start = std::time::Instant::now();
        match self.pool.get() {
            Ok(conn) => {
                debug!(elapsed_ms = start.elapsed().as_millis() as u64, "connection acquired");
                Ok(conn)
            }
            Err(e) => {
                let err_str = e.to_string().to_lowercase();
                if err_str.contains("timed out") || err_str.contains("timeout") {
                    warn!("Connection timeout after {:?}", self.config.connection_timeout);
                    Err(StorageError::Timeout(self.config.connection_timeout.as_secs()))
                } else {
                    warn!("Connection error: {}", e);
                    Err(StorageError::Connection(format!("Failed to get connection: {}", e)))
                }
            }
        }
    }

    /// Run `SELECT 1` on a pooled connection.
    pub fn health_check(&self) -> StorageResult<()> {
        let conn = self.get()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }

    pub fn state(&self) -> PoolState {
        let state = self.pool.state();
        PoolState {
            connections: state.connections,
            idle_connections: state.idle_connections,
            max_size: self.config.max_size,
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
