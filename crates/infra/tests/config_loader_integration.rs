//! Integration tests for config file loading

use std::path::PathBuf;

use tally_domain::{AgentConfig, LogFormat, ServerConfig, TallyError};
use tally_infra::config::{load_from_file, load_server_config};
use tempfile::TempDir;

/// Validates `load_server_config` behavior for an explicit TOML file.
///
/// Assertions:
/// - Confirms keys present in the file override defaults, nested tables
///   included.
/// - Confirms keys absent from the file keep their defaults.
#[test]
fn server_toml_overrides_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tally-server.toml");
    std::fs::write(
        &path,
        r#"
address = "0.0.0.0:9090"
store_interval_secs = 0
trusted_subnet = "10.0.0.0/8"

[database]
path = "/var/lib/tally/metrics.db"
pool_size = 8

[retry]
max_attempts = 5

[logging]
level = "debug"
format = "json"
"#,
    )
    .unwrap();

    let config = load_server_config(Some(path)).unwrap();
    assert_eq!(config.address, "0.0.0.0:9090");
    assert_eq!(config.store_interval_secs, 0);
    assert_eq!(config.trusted_subnet.as_deref(), Some("10.0.0.0/8"));

    let database = config.database.unwrap();
    assert_eq!(database.path, PathBuf::from("/var/lib/tally/metrics.db"));
    assert_eq!(database.pool_size, 8);
    assert_eq!(database.busy_timeout_ms, 1_000);

    assert_eq!(config.retry.max_attempts, 5);
    assert_eq!(config.retry.initial_interval_ms, 1_000);
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.format, LogFormat::Json);
    assert!(config.restore);
}

/// Validates `load_from_file` behavior for a JSON agent file.
///
/// Assertions:
/// - Confirms JSON is selected by extension and merged over defaults.
#[test]
fn agent_json_is_parsed() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("agent.json");
    std::fs::write(&path, r#"{"address":"https://metrics.internal","rate_limit":4}"#).unwrap();

    let config: AgentConfig = load_from_file(&path).unwrap();
    assert_eq!(config.base_url(), "https://metrics.internal");
    assert_eq!(config.rate_limit, 4);
    assert_eq!(config.report_interval_secs, AgentConfig::default().report_interval_secs);
}

/// Validates config loading failures.
///
/// Assertions:
/// - Confirms a missing explicit file, a malformed file and a file that
///   fails validation are all reported as config errors.
#[test]
fn invalid_files_are_config_errors() {
    let dir = TempDir::new().unwrap();

    let missing = load_server_config(Some(dir.path().join("absent.toml"))).unwrap_err();
    assert!(matches!(missing, TallyError::Config(_)), "unexpected error: {missing:?}");

    let malformed = dir.path().join("broken.toml");
    std::fs::write(&malformed, "address = [unterminated").unwrap();
    let err = load_from_file::<ServerConfig>(&malformed).unwrap_err();
    assert!(matches!(err, TallyError::Config(_)), "unexpected error: {err:?}");

    let invalid = dir.path().join("invalid.toml");
    std::fs::write(&invalid, "[retry]\nmax_attempts = 0\n").unwrap();
    let err = load_server_config(Some(invalid)).unwrap_err();
    assert!(matches!(err, TallyError::Config(_)), "unexpected error: {err:?}");
}
