//! Configuration structures for the agent and the server
//!
//! Every struct deserialises with `#[serde(default)]`, so a config file only
//! needs the keys it overrides. Durations are stored as integer seconds or
//! milliseconds and exposed as [`Duration`] through accessors.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, TallyError};

/// Bounded retry schedule: `initial`, `initial + increment`, ... then stop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub initial_interval_ms: u64,
    pub increment_ms: u64,
    pub max_attempts: u32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self { initial_interval_ms: 1_000, increment_ms: 2_000, max_attempts: 3 }
    }
}

impl RetrySettings {
    pub fn initial_interval(&self) -> Duration {
        Duration::from_millis(self.initial_interval_ms)
    }

    pub fn increment(&self) -> Duration {
        Duration::from_millis(self.increment_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts < 1 {
            return Err(TallyError::Config("retry.max_attempts must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Fallback filter directive when `RUST_LOG` is unset
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: LogFormat::Compact }
    }
}

/// Agent (sender) configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Server base URL; a bare `host:port` gets `http://` prepended
    pub address: String,
    pub report_interval_secs: u64,
    pub poll_interval_secs: u64,
    /// Maximum concurrent in-flight batch sends
    pub rate_limit: usize,
    pub request_timeout_ms: u64,
    pub compress: bool,
    /// Shared HMAC key; signing is disabled when unset
    pub hash_key: Option<String>,
    /// Recipient RSA public key (PEM); encryption is disabled when unset
    pub public_key_path: Option<PathBuf>,
    /// Extra headers sent with every batch
    pub headers: BTreeMap<String, String>,
    pub retry: RetrySettings,
    pub logging: LoggingConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            address: "http://localhost:8080".to_string(),
            report_interval_secs: 10,
            poll_interval_secs: 2,
            rate_limit: 1,
            request_timeout_ms: 5_000,
            compress: true,
            hash_key: None,
            public_key_path: None,
            headers: BTreeMap::new(),
            retry: RetrySettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AgentConfig {
    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Base URL with a scheme.
    pub fn base_url(&self) -> String {
        let trimmed = self.address.trim_end_matches('/');
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            trimmed.to_string()
        } else {
            format!("http://{trimmed}")
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() {
            return Err(TallyError::Config("address must not be empty".to_string()));
        }
        if self.rate_limit < 1 {
            return Err(TallyError::Config("rate_limit must be at least 1".to_string()));
        }
        if self.report_interval_secs < 1 {
            return Err(TallyError::Config("report_interval must be at least 1s".to_string()));
        }
        if self.poll_interval_secs < 1 {
            return Err(TallyError::Config("poll_interval must be at least 1s".to_string()));
        }
        if self.request_timeout_ms == 0 {
            return Err(TallyError::Config("request_timeout must be positive".to_string()));
        }
        self.retry.validate()
    }
}

/// Durable backend configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub pool_size: u32,
    pub busy_timeout_ms: u64,
    /// Upper bound for one store call, including pool checkout
    pub operation_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("tally.db"),
            pool_size: 4,
            busy_timeout_ms: 1_000,
            operation_timeout_ms: 5_000,
        }
    }
}

impl DatabaseConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pool_size < 1 {
            return Err(TallyError::Config("database.pool_size must be at least 1".to_string()));
        }
        if self.operation_timeout_ms == 0 {
            return Err(TallyError::Config(
                "database.operation_timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Server (ingestion) configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub address: String,
    /// Snapshot period for the memory backend; 0 saves after every ingestion
    pub store_interval_secs: u64,
    pub snapshot_path: PathBuf,
    pub restore: bool,
    /// Durable backend; the memory backend is used when unset
    pub database: Option<DatabaseConfig>,
    pub hash_key: Option<String>,
    /// RSA private key (PEM) for envelope decryption
    pub private_key_path: Option<PathBuf>,
    /// CIDR allowed to submit metrics, checked against `X-Real-IP`
    pub trusted_subnet: Option<String>,
    pub retry: RetrySettings,
    pub logging: LoggingConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:8080".to_string(),
            store_interval_secs: 300,
            snapshot_path: PathBuf::from("metrics-snapshot.json"),
            restore: true,
            database: None,
            hash_key: None,
            private_key_path: None,
            trusted_subnet: None,
            retry: RetrySettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn store_interval(&self) -> Duration {
        Duration::from_secs(self.store_interval_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() {
            return Err(TallyError::Config("address must not be empty".to_string()));
        }
        if let Some(database) = &self.database {
            database.validate()?;
        }
        self.retry.validate()
    }
}
