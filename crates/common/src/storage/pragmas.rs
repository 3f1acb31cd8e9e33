//! Per-connection SQLite settings

use rusqlite::Connection;

use super::config::PoolConfig;
use crate::storage::error::{StorageError, StorageResult};

/// Configure a freshly opened pool connection.
///
/// WAL lets the ingestion writer and snapshot readers overlap; the busy
/// timeout bounds how long a writer waits on a competing lock before SQLite
/// reports `SQLITE_BUSY`.
pub fn apply_connection_pragmas(conn: &Connection, config: &PoolConfig) -> StorageResult<()> {
    let statements: &[&str] = if config.enable_wal {
        &["PRAGMA journal_mode = WAL", "PRAGMA synchronous = NORMAL"]
    } else {
        &["PRAGMA synchronous = NORMAL"]
    };

    for statement in statements {
        // journal_mode answers with a row, so query instead of execute
        conn.query_row(statement, [], |_| Ok(()))
            .or_else(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => Ok(()),
                other => Err(other),
            })
            .map_err(|e| StorageError::Query(format!("{statement}: {e}")))?;
    }

    conn.busy_timeout(config.busy_timeout)
        .map_err(|e| StorageError::Query(format!("busy_timeout: {e}")))
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn pragma_text(conn: &Connection, name: &str) -> String {
        conn.pragma_query_value(None, name, |row| row.get::<_, rusqlite::types::Value>(0))
            .map(|value| match value {
                rusqlite::types::Value::Text(text) => text.to_lowercase(),
                rusqlite::types::Value::Integer(n) => n.to_string(),
                other => format!("{other:?}"),
            })
            .unwrap()
    }

    #[test]
    fn wal_and_normal_sync_are_applied() {
        let dir = TempDir::new().unwrap();
        let conn = Connection::open(dir.path().join("pragmas.db")).unwrap();

        apply_connection_pragmas(&conn, &PoolConfig::default()).unwrap();

        assert_eq!(pragma_text(&conn, "journal_mode"), "wal");
        assert_eq!(pragma_text(&conn, "synchronous"), "1");
    }

    #[test]
    fn wal_can_be_left_off() {
        let dir = TempDir::new().unwrap();
        let conn = Connection::open(dir.path().join("rollback.db")).unwrap();
        let config = PoolConfig { enable_wal: false, ..PoolConfig::default() };

        apply_connection_pragmas(&conn, &config).unwrap();

        assert_eq!(pragma_text(&conn, "journal_mode"), "delete");
    }
}
