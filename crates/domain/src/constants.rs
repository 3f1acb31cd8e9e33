//! Wire and configuration constants
//!
//! Centralized location for names shared by the agent and the server.

// Headers
pub const HASH_HEADER: &str = "HashSHA256";
pub const REAL_IP_HEADER: &str = "X-Real-IP";
pub const GZIP_ENCODING: &str = "gzip";
pub const JSON_CONTENT_TYPE: &str = "application/json";

// Routes
pub const UPDATES_PATH: &str = "/updates";
pub const UPDATE_PATH: &str = "/update";
pub const VALUE_PATH: &str = "/value";
pub const PING_PATH: &str = "/ping";

// Metric names
pub const MAX_METRIC_NAME_LENGTH: usize = 255;
pub const POLL_COUNT_METRIC: &str = "PollCount";
pub const RANDOM_VALUE_METRIC: &str = "RandomValue";

// Gauge rendering precision for the plain-text query route
pub const GAUGE_RENDER_PRECISION: usize = 3;

// Configuration
pub const CONFIG_PATH_ENV: &str = "TALLY_CONFIG";
pub const ENV_PREFIX: &str = "TALLY_";
