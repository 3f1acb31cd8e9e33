//! Pooled SQLite storage primitives
//!
//! Connection pooling, per-connection pragmas and the storage error
//! classification used by the durable metric backend.

pub mod config;
pub mod error;
pub mod pool;
pub mod pragmas;

pub use config::PoolConfig;
pub use error::{is_transient_sqlite_code, is_transient_sqlite_error, StorageError, StorageResult};
pub use pool::{PoolState, SqliteConnection, SqlitePool};
pub use pragmas::apply_connection_pragmas;
