//! Server environment and runtime plugin overrides
//!
//! Lookups go through a closure so the resolution rules can be tested
//! without touching the process environment.

use anyhow::{Context, Result};
use liftoff_plugin::PluginDeclarations;
use tracing::debug;

/// Explicit server environment, highest precedence
pub const SERVER_ENV_VAR: &str = "LIFTOFF_SERVER_ENV";

/// Coarse environment name, mapped through [`map_legacy_env`]
pub const ENV_VAR: &str = "LIFTOFF_ENV";

/// JSON object of runtime plugin declarations
pub const PLUGINS_VAR: &str = "LIFTOFF_PLUGINS";

/// Server environment when nothing else is set
pub const DEFAULT_SERVER_ENV: &str = "local";

/// Resolve the server environment
///
/// `LIFTOFF_SERVER_ENV` wins, then the configured value, then a mapped
/// `LIFTOFF_ENV`, then `local`.
pub fn resolve_server_env<F>(configured: Option<&str>, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |value: Option<String>| value.filter(|v| !v.trim().is_empty());

    if let Some(env) = non_empty(lookup(SERVER_ENV_VAR)) {
        debug!("Server env {} from {}", env, SERVER_ENV_VAR);
        return env.trim().to_string();
    }
    if let Some(env) = configured.filter(|v| !v.trim().is_empty()) {
        debug!("Server env {} from configuration", env);
        return env.trim().to_string();
    }
    if let Some(env) = non_empty(lookup(ENV_VAR)) {
        let mapped = map_legacy_env(env.trim());
        debug!("Server env {} from {}={}", mapped, ENV_VAR, env);
        return mapped;
    }
    DEFAULT_SERVER_ENV.to_string()
}

/// Resolve the server environment from the process environment
pub fn server_env(configured: Option<&str>) -> String {
    resolve_server_env(configured, |key| std::env::var(key).ok())
}

/// `test` becomes `unittest`, `production` becomes `prod`
pub fn map_legacy_env(env: &str) -> String {
    match env {
        "test" => "unittest".to_string(),
        "production" => "prod".to_string(),
        other => other.to_string(),
    }
}

/// Parse runtime plugin declarations from `LIFTOFF_PLUGINS`, if set
pub fn runtime_plugins_from<F>(lookup: F) -> Result<Option<PluginDeclarations>>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(PLUGINS_VAR).filter(|v| !v.trim().is_empty()) else {
        return Ok(None);
    };
    let declarations = PluginDeclarations::from_json_str(&raw)
        .with_context(|| format!("Invalid {} value", PLUGINS_VAR))?;
    debug!(
        "Loaded {} runtime plugin declarations from {}",
        declarations.len(),
        PLUGINS_VAR
    );
    Ok(Some(declarations))
}

pub fn runtime_plugins() -> Result<Option<PluginDeclarations>> {
    runtime_plugins_from(|key| std::env::var(key).ok())
}
