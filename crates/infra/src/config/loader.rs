//! Configuration loader
//!
//! Resolves agent and server configuration in layers.
//!
//! ## Loading Strategy
//! 1. Built-in defaults
//! 2. A config file, if one is found (explicit path, then `TALLY_CONFIG`,
//!    then probing standard locations)
//! 3. `TALLY_*` environment variables, including any loaded from `.env`
//!
//! CLI flags are layered on top by the binaries. The result is validated
//! before it is returned.
//!
//! ## Environment Variables
//! Shared:
//! - `TALLY_ADDRESS`: server URL (agent) or listen address (server)
//! - `TALLY_HASH_KEY`: shared HMAC key
//! - `TALLY_RETRY_INITIAL_MS`, `TALLY_RETRY_INCREMENT_MS`,
//!   `TALLY_RETRY_MAX_ATTEMPTS`: retry schedule
//! - `TALLY_LOG_LEVEL`, `TALLY_LOG_FORMAT` (`compact` or `json`)
//!
//! Agent:
//! - `TALLY_REPORT_INTERVAL`, `TALLY_POLL_INTERVAL`: seconds
//! - `TALLY_RATE_LIMIT`: concurrent in-flight sends
//! - `TALLY_REQUEST_TIMEOUT_MS`
//! - `TALLY_COMPRESS`: gzip batches (true/false)
//! - `TALLY_PUBLIC_KEY_PATH`: recipient RSA public key (PEM)
//!
//! Server:
//! - `TALLY_STORE_INTERVAL`: snapshot period in seconds, 0 for every write
//! - `TALLY_SNAPSHOT_PATH`, `TALLY_RESTORE`
//! - `TALLY_DATABASE_PATH`, `TALLY_DATABASE_POOL_SIZE`: enable the durable
//!   backend
//! - `TALLY_PRIVATE_KEY_PATH`: RSA private key (PEM)
//! - `TALLY_TRUSTED_SUBNET`: CIDR allowed to submit metrics
//!
//! ## File Locations
//! For the agent the loader probes `tally-agent.{toml,json}` then
//! `config.{toml,json}`; for the server `tally-server.*` then `config.*`.
//! Each name is tried in the working directory, its two parents, and the
//! executable's directory.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::de::DeserializeOwned;
use tally_domain::constants::{CONFIG_PATH_ENV, ENV_PREFIX};
use tally_domain::{
    AgentConfig, DatabaseConfig, LogFormat, LoggingConfig, Result, RetrySettings, ServerConfig,
    TallyError,
};
use tracing::{debug, info};

const AGENT_CONFIG_STEM: &str = "tally-agent";
const SERVER_CONFIG_STEM: &str = "tally-server";
const SHARED_CONFIG_STEM: &str = "config";

/// Source of raw environment values; the process environment in production.
pub type EnvLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Load the agent configuration.
///
/// # Errors
/// Returns `TallyError::Config` if an explicit file is missing, a file or
/// variable cannot be parsed, or the merged result fails validation.
pub fn load_agent_config(path: Option<PathBuf>) -> Result<AgentConfig> {
    load_dotenv();
    let mut config: AgentConfig = load_layer(path, AGENT_CONFIG_STEM)?;
    apply_agent_env(&mut config, &process_env)?;
    config.validate()?;
    Ok(config)
}

/// Load the server configuration.
///
/// # Errors
/// See [`load_agent_config`].
pub fn load_server_config(path: Option<PathBuf>) -> Result<ServerConfig> {
    load_dotenv();
    let mut config: ServerConfig = load_layer(path, SERVER_CONFIG_STEM)?;
    apply_server_env(&mut config, &process_env)?;
    config.validate()?;
    Ok(config)
}

/// Defaults, or the file found for `stem` when there is one.
fn load_layer<T>(path: Option<PathBuf>, stem: &str) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let explicit = path.or_else(|| process_env(CONFIG_PATH_ENV).map(PathBuf::from));
    match explicit {
        Some(path) => load_from_file(&path),
        None => match probe_config_paths(stem) {
            Some(path) => load_from_file(&path),
            None => {
                debug!(stem, "no config file found, using defaults");
                Ok(T::default())
            }
        },
    }
}

/// Load configuration from a file.
///
/// # Errors
/// Returns `TallyError::Config` if the file is missing, unreadable or invalid.
pub fn load_from_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Err(TallyError::Config(format!("Config file not found: {}", path.display())));
    }

    info!(path = %path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(path)
        .map_err(|e| TallyError::Config(format!("Failed to read config file: {}", e)))?;

    parse_config(&contents, path)
}

/// Parse configuration from string content
///
/// Format is detected by file extension (`.json` or `.toml`).
///
/// # Errors
/// Returns `TallyError::Config` if format is invalid or parsing fails.
pub fn parse_config<T: DeserializeOwned>(contents: &str, path: &Path) -> Result<T> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| TallyError::Config(format!("Invalid TOML format: {}", e))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| TallyError::Config(format!("Invalid JSON format: {}", e))),
        _ => Err(TallyError::Config(format!("Unsupported config format: {}", extension))),
    }
}

/// Probe standard locations for `<stem>.{toml,json}` then
/// `config.{toml,json}`.
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths(stem: &str) -> Option<PathBuf> {
    let mut dirs = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        dirs.push(cwd.clone());
        dirs.push(cwd.join(".."));
        dirs.push(cwd.join("../.."));
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            dirs.push(exe_dir.to_path_buf());
        }
    }

    let names: Vec<String> = [stem, SHARED_CONFIG_STEM]
        .iter()
        .flat_map(|stem| [format!("{stem}.toml"), format!("{stem}.json")])
        .collect();

    dirs.iter()
        .flat_map(|dir| names.iter().map(move |name| dir.join(name)))
        .find(|path| path.is_file())
}

/// Overlay `TALLY_*` variables on an agent configuration.
///
/// # Errors
/// Returns `TallyError::Config` naming the variable that failed to parse.
pub fn apply_agent_env(config: &mut AgentConfig, env: EnvLookup<'_>) -> Result<()> {
    if let Some(address) = env_var(env, "ADDRESS") {
        config.address = address;
    }
    if let Some(secs) = env_parse(env, "REPORT_INTERVAL")? {
        config.report_interval_secs = secs;
    }
    if let Some(secs) = env_parse(env, "POLL_INTERVAL")? {
        config.poll_interval_secs = secs;
    }
    if let Some(limit) = env_parse(env, "RATE_LIMIT")? {
        config.rate_limit = limit;
    }
    if let Some(ms) = env_parse(env, "REQUEST_TIMEOUT_MS")? {
        config.request_timeout_ms = ms;
    }
    if let Some(compress) = env_bool(env, "COMPRESS") {
        config.compress = compress;
    }
    if let Some(key) = env_var(env, "HASH_KEY") {
        config.hash_key = Some(key);
    }
    if let Some(path) = env_var(env, "PUBLIC_KEY_PATH") {
        config.public_key_path = Some(PathBuf::from(path));
    }
    apply_retry_env(&mut config.retry, env)?;
    apply_logging_env(&mut config.logging, env)
}

/// Overlay `TALLY_*` variables on a server configuration.
///
/// Setting `TALLY_DATABASE_PATH` enables the durable backend.
///
/// # Errors
/// Returns `TallyError::Config` naming the variable that failed to parse.
pub fn apply_server_env(config: &mut ServerConfig, env: EnvLookup<'_>) -> Result<()> {
    if let Some(address) = env_var(env, "ADDRESS") {
        config.address = address;
    }
    if let Some(secs) = env_parse(env, "STORE_INTERVAL")? {
        config.store_interval_secs = secs;
    }
    if let Some(path) = env_var(env, "SNAPSHOT_PATH") {
        config.snapshot_path = PathBuf::from(path);
    }
    if let Some(restore) = env_bool(env, "RESTORE") {
        config.restore = restore;
    }
    if let Some(path) = env_var(env, "DATABASE_PATH") {
        config.database.get_or_insert_with(DatabaseConfig::default).path = PathBuf::from(path);
    }
    if let Some(size) = env_parse(env, "DATABASE_POOL_SIZE")? {
        if let Some(database) = config.database.as_mut() {
            database.pool_size = size;
        }
    }
    if let Some(key) = env_var(env, "HASH_KEY") {
        config.hash_key = Some(key);
    }
    if let Some(path) = env_var(env, "PRIVATE_KEY_PATH") {
        config.private_key_path = Some(PathBuf::from(path));
    }
    if let Some(subnet) = env_var(env, "TRUSTED_SUBNET") {
        config.trusted_subnet = Some(subnet);
    }
    apply_retry_env(&mut config.retry, env)?;
    apply_logging_env(&mut config.logging, env)
}

fn apply_retry_env(retry: &mut RetrySettings, env: EnvLookup<'_>) -> Result<()> {
    if let Some(ms) = env_parse(env, "RETRY_INITIAL_MS")? {
        retry.initial_interval_ms = ms;
    }
    if let Some(ms) = env_parse(env, "RETRY_INCREMENT_MS")? {
        retry.increment_ms = ms;
    }
    if let Some(attempts) = env_parse(env, "RETRY_MAX_ATTEMPTS")? {
        retry.max_attempts = attempts;
    }
    Ok(())
}

fn apply_logging_env(logging: &mut LoggingConfig, env: EnvLookup<'_>) -> Result<()> {
    if let Some(level) = env_var(env, "LOG_LEVEL") {
        logging.level = level;
    }
    if let Some(format) = env_var(env, "LOG_FORMAT") {
        logging.format = match format.to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            "compact" => LogFormat::Compact,
            other => {
                return Err(TallyError::Config(format!(
                    "Invalid {ENV_PREFIX}LOG_FORMAT: {other} (expected compact or json)"
                )))
            }
        };
    }
    Ok(())
}

fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn load_dotenv() {
    if let Ok(path) = dotenvy::dotenv() {
        debug!(path = %path.display(), "Loaded .env file");
    }
}

/// Non-empty value of `TALLY_<suffix>`.
fn env_var(env: EnvLookup<'_>, suffix: &str) -> Option<String> {
    env(&format!("{ENV_PREFIX}{suffix}")).filter(|value| !value.trim().is_empty())
}

fn env_parse<T>(env: EnvLookup<'_>, suffix: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_var(env, suffix)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| {
                TallyError::Config(format!("Invalid {ENV_PREFIX}{suffix} '{raw}': {e}"))
            })
        })
        .transpose()
}

/// Parse boolean from environment variable
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive).
/// Anything else reads as `false`.
fn env_bool(env: EnvLookup<'_>, suffix: &str) -> Option<bool> {
    env_var(env, suffix)
        .map(|s| matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}
