//! Database connection manager backed by the shared SQLite pool.

use std::path::Path;
use std::sync::Arc;

use rusqlite::params;
use tally_common::storage::{PoolConfig, SqliteConnection, SqlitePool, StorageError};
use tally_domain::{DatabaseConfig, Result};
use tracing::{info, warn};

use crate::errors::conversions::infra_err;

const SCHEMA_VERSION: i32 = 1;
const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Database manager that wraps an [`SqlitePool`].
pub struct DbManager {
    pool: Arc<SqlitePool>,
}

impl DbManager {
    /// Open the database described by `config`.
    pub fn new(config: &DatabaseConfig) -> Result<Self> {
        Self::open(&config.path, config)
    }

    /// Open the database at `db_path`, taking pool sizing and timeouts from
    /// `config`.
    pub fn open<P: AsRef<Path>>(db_path: P, config: &DatabaseConfig) -> Result<Self> {
        let path = db_path.as_ref();

        let pool_config = PoolConfig {
            max_size: config.pool_size.max(1),
            connection_timeout: config.operation_timeout(),
            busy_timeout: config.busy_timeout(),
            ..PoolConfig::default()
        };

        let pool = SqlitePool::open(path, pool_config).map_err(infra_err)?;

        info!(
            db_path = %path.display(),
            max_connections = pool.state().max_size,
            "sqlite pool initialised"
        );

        Ok(Self { pool: Arc::new(pool) })
    }

    /// Borrow the underlying pool.
    pub fn pool(&self) -> &Arc<SqlitePool> {
        &self.pool
    }

    /// Acquire a connection from the pool.
    ///
    /// A connection handed back while still inside a transaction (a handle
    /// leaked past its rollback) is rolled back before reuse.
    pub fn get_connection(&self) -> Result<SqliteConnection> {
        let conn = self.pool.get().map_err(infra_err)?;
        if !conn.is_autocommit() {
            warn!("pooled connection returned with an open transaction; rolling back");
            conn.execute_batch("ROLLBACK").map_err(infra_err)?;
        }
        Ok(conn)
    }

    /// Ensure the full schema exists on the current database.
    pub fn run_migrations(&self) -> Result<()> {
        let conn = self.get_connection()?;
        create_schema(&conn)?;
        Ok(())
    }

    /// Return the configured database path.
    pub fn path(&self) -> &Path {
        self.pool.path()
    }

    /// Perform a health check to verify database connectivity.
    pub fn health_check(&self) -> Result<()> {
        let conn = self.get_connection()?;
        conn.query_row("SELECT 1", params![], |row| row.get::<_, i32>(0)).map_err(infra_err)?;
        Ok(())
    }
}

fn create_schema(conn: &SqliteConnection) -> Result<()> {
    let migration_failed =
        |e: rusqlite::Error| infra_err(StorageError::Migration(format!("schema v{SCHEMA_VERSION}: {e}")));

    conn.execute_batch(SCHEMA_SQL).map_err(migration_failed)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (?, CAST(strftime('%s','now') AS INTEGER))",
        params![SCHEMA_VERSION],
    )
    .map_err(migration_failed)?;
    Ok(())
}
