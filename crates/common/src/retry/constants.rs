//! Defaults for the bounded backoff schedule.
use std::time::Duration;

/// First delay handed out by a fresh policy.
pub const DEFAULT_INITIAL_INTERVAL: Duration = Duration::from_secs(1);

/// Amount added to the previous delay on every subsequent failure.
pub const DEFAULT_INCREMENT: Duration = Duration::from_secs(2);

/// Number of delays handed out before the policy answers `Stop`.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Minimum allowed max_attempts value
pub const MIN_MAX_ATTEMPTS: u32 = 1;

/// Maximum allowed max_attempts value
pub const MAX_MAX_ATTEMPTS: u32 = 100;
