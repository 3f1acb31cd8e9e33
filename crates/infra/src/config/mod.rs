//! Configuration loading
//!
//! Layers defaults, a config file and `TALLY_*` environment variables into
//! the agent and server configuration structs.

pub mod loader;

// Re-export commonly used items
pub use loader::{
    apply_agent_env, apply_server_env, load_agent_config, load_from_file, load_server_config,
    parse_config, probe_config_paths,
};
