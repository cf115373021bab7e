//! Configuration management for liftoff

pub mod config;
pub mod env;
pub mod framework;


// Re-export main types for convenience
pub use config::{Config, DEFAULT_READY_TIMEOUT_MS};
pub use env::{
    map_legacy_env, resolve_server_env, runtime_plugins, runtime_plugins_from, server_env,
    DEFAULT_SERVER_ENV, ENV_VAR, PLUGINS_VAR, SERVER_ENV_VAR,
};
pub use framework::FrameworkConfig;
