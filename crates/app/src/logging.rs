//! Tracing bootstrap for the binaries.

use anyhow::anyhow;
use tally_domain::{LogFormat, LoggingConfig};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// `RUST_LOG` wins over the configured level when it is set.
///
/// # Errors
///
/// Returns error if a global subscriber is already installed
pub fn init_tracing(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let installed = match config.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_current_span(true)
            .with_target(true)
            .with_env_filter(filter)
            .try_init(),
        LogFormat::Compact => {
            tracing_subscriber::fmt().compact().with_target(true).with_env_filter(filter).try_init()
        }
    };

    installed.map_err(|e| anyhow!("failed to initialise tracing: {e}"))
}
