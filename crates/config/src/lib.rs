//! Configuration loading and env substitution.
//!
//! Config files: `switchboard.toml`, `switchboard.yaml`, or `switchboard.json`
//! Searched in `./` then `~/.config/switchboard/`.
//!
//! Supports `${ENV_VAR}` and `${ENV_VAR:-fallback}` substitution before parsing.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{config_dir, data_dir, discover_and_load, load_config, resume_store_path},
    schema::{
        AgentConfig, ApprovalConfig, DEFAULT_SENTINEL, ServerConfig, SessionsConfig,
        SwitchboardConfig, TerminalConfig,
    },
};
