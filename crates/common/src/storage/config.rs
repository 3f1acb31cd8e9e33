//! Pool configuration

use std::time::Duration;

/// SQLite pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of connections in the pool
    pub max_size: u32,

    /// How long to wait for a free connection
    pub connection_timeout: Duration,

    /// Busy timeout for SQLite lock contention
    pub busy_timeout: Duration,

    /// Enable WAL journal mode
    pub enable_wal: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 4,
            connection_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_secs(1),
            enable_wal: true,
        }
    }
}

impl PoolConfig {
    /// Validate pool sizing
    pub fn validate(&self) -> Result<(), String> {
        if self.max_size == 0 {
            return Err("max_size must be at least 1".to_string());
        }
        if self.connection_timeout.is_zero() {
            return Err("connection_timeout must be positive".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for storage::config.
    use super::*;

    /// Tests the default configuration values for the SQLite pool.
    #[test]
    fn test_default_config() {
        let config = PoolConfig::default();

        assert_eq!(config.max_size, 4, "Default pool size should be 4");
        assert_eq!(config.busy_timeout, Duration::from_secs(1));
        assert!(config.enable_wal, "WAL mode should be enabled by default");
        assert!(config.validate().is_ok());
    }

    /// Tests that a zero-sized pool is rejected.
    #[test]
    fn test_zero_pool_rejected() {
        let config = PoolConfig { max_size: 0, ..PoolConfig::default() };
        assert!(config.validate().is_err());
    }
}
