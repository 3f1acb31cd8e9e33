//! Command-line flags
//!
//! Flags are the last configuration layer: anything given here overrides
//! the config file and `TALLY_*` variables.

use std::path::PathBuf;

use clap::Parser;
use tally_domain::{AgentConfig, LogFormat, LoggingConfig, ServerConfig};

/// Flags shared by both binaries.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct CommonArgs {
    /// Config file (TOML or JSON)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Shared key for the HashSHA256 header
    #[arg(short = 'k', long = "key")]
    pub hash_key: Option<String>,

    /// Fallback log filter when RUST_LOG is unset
    #[arg(long)]
    pub log_level: Option<String>,

    /// Emit JSON log lines
    #[arg(long)]
    pub log_json: bool,
}

impl CommonArgs {
    fn apply_logging(&self, logging: &mut LoggingConfig) {
        if let Some(level) = &self.log_level {
            logging.level.clone_from(level);
        }
        if self.log_json {
            logging.format = LogFormat::Json;
        }
    }
}

/// Metric agent: polls system metrics and reports them to the server.
#[derive(Debug, Clone, Parser)]
#[command(name = "tally-agent", version)]
pub struct AgentArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Server address (`host:port` or URL)
    #[arg(short = 'a', long)]
    pub address: Option<String>,

    /// Report interval in seconds
    #[arg(short = 'r', long = "report-interval")]
    pub report_interval_secs: Option<u64>,

    /// Poll interval in seconds
    #[arg(short = 'p', long = "poll-interval")]
    pub poll_interval_secs: Option<u64>,

    /// Maximum concurrent batch sends
    #[arg(short = 'l', long = "rate-limit")]
    pub rate_limit: Option<usize>,

    /// Server RSA public key (PEM)
    #[arg(long = "crypto-key")]
    pub public_key_path: Option<PathBuf>,

    /// Send batches without gzip
    #[arg(long)]
    pub no_compress: bool,
}

impl AgentArgs {
    pub fn apply(&self, config: &mut AgentConfig) {
        if let Some(address) = &self.address {
            config.address.clone_from(address);
        }
        if let Some(secs) = self.report_interval_secs {
            config.report_interval_secs = secs;
        }
        if let Some(secs) = self.poll_interval_secs {
            config.poll_interval_secs = secs;
        }
        if let Some(limit) = self.rate_limit {
            config.rate_limit = limit;
        }
        if let Some(path) = &self.public_key_path {
            config.public_key_path = Some(path.clone());
        }
        if self.no_compress {
            config.compress = false;
        }
        if let Some(key) = &self.common.hash_key {
            config.hash_key = Some(key.clone());
        }
        self.common.apply_logging(&mut config.logging);
    }
}

/// Metric server: accepts batches and answers queries.
#[derive(Debug, Clone, Parser)]
#[command(name = "tally-server", version)]
pub struct ServerArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Listen address
    #[arg(short = 'a', long)]
    pub address: Option<String>,

    /// Snapshot period in seconds; 0 saves after every update
    #[arg(short = 'i', long = "store-interval")]
    pub store_interval_secs: Option<u64>,

    /// Snapshot file
    #[arg(short = 'f', long = "file")]
    pub snapshot_path: Option<PathBuf>,

    /// Load the snapshot file on start
    #[arg(short = 'r', long)]
    pub restore: Option<bool>,

    /// SQLite database file; enables the durable backend
    #[arg(short = 'd', long = "database")]
    pub database_path: Option<PathBuf>,

    /// RSA private key (PEM)
    #[arg(long = "crypto-key")]
    pub private_key_path: Option<PathBuf>,

    /// CIDR allowed to submit metrics
    #[arg(short = 't', long = "trusted-subnet")]
    pub trusted_subnet: Option<String>,
}

impl ServerArgs {
    pub fn apply(&self, config: &mut ServerConfig) {
        if let Some(address) = &self.address {
            config.address.clone_from(address);
        }
        if let Some(secs) = self.store_interval_secs {
            config.store_interval_secs = secs;
        }
        if let Some(path) = &self.snapshot_path {
            config.snapshot_path.clone_from(path);
        }
        if let Some(restore) = self.restore {
            config.restore = restore;
        }
        if let Some(path) = &self.database_path {
            config.database.get_or_insert_with(Default::default).path.clone_from(path);
        }
        if let Some(path) = &self.private_key_path {
            config.private_key_path = Some(path.clone());
        }
        if let Some(subnet) = &self.trusted_subnet {
            config.trusted_subnet = Some(subnet.clone());
        }
        if let Some(key) = &self.common.hash_key {
            config.hash_key = Some(key.clone());
        }
        self.common.apply_logging(&mut config.logging);
    }
}
