//! Plugin descriptors as seen by the resolver

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Where a plugin implementation lives.
///
/// A plugin is located either by a filesystem path or by a package name,
/// never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginLocation {
    /// Local directory
    Path(PathBuf),

    /// Named package, resolved by the host
    Package(String),
}

/// Declaration tier a plugin setting came from, lowest precedence first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginTier {
    /// Framework defaults
    Framework,

    /// Application configuration
    App,

    /// Runtime overrides (environment blob or constructor option)
    Runtime,
}

impl fmt::Display for PluginTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PluginTier::Framework => "framework",
            PluginTier::App => "app",
            PluginTier::Runtime => "runtime",
        };
        f.write_str(label)
    }
}

/// Fully merged description of one plugin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    name: String,

    /// Whether the plugin is switched on
    pub enable: bool,

    /// Hard dependencies
    pub dependencies: Vec<String>,

    /// Soft dependencies, ordering only
    pub optional_dependencies: Vec<String>,

    /// Environments the plugin may run in; empty means all
    pub env: Vec<String>,

    /// Implementation location
    pub location: Option<PluginLocation>,

    /// Set by the resolver when the plugin was switched on by a dependent
    pub implicit_enable: bool,

    /// Enabled plugins that hard-depend on this one
    pub dependents: Vec<String>,

    /// Highest tier that declared this plugin
    pub from: PluginTier,
}

impl PluginDescriptor {
    /// Create an enabled descriptor with no dependencies
    pub fn new(name: impl Into<String>, from: PluginTier) -> Self {
        Self {
            name: name.into(),
            enable: true,
            dependencies: Vec::new(),
            optional_dependencies: Vec::new(),
            env: Vec::new(),
            location: None,
            implicit_enable: false,
            dependents: Vec::new(),
            from,
        }
    }

    /// Plugin name; fixed for the lifetime of the descriptor
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Builder-style helper for hard dependencies
    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    /// Builder-style helper for optional dependencies
    pub fn with_optional_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.optional_dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    /// Builder-style helper for the enable flag
    pub fn with_enable(mut self, enable: bool) -> Self {
        self.enable = enable;
        self
    }

    /// Builder-style helper for the env allow-list
    pub fn with_env<I, S>(mut self, env: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.env = env.into_iter().map(Into::into).collect();
        self
    }

    /// Whether the plugin is allowed to run in `server_env`
    pub fn allows_env(&self, server_env: &str) -> bool {
        self.env.is_empty() || self.env.iter().any(|e| e == server_env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_defaults() {
        let plugin = PluginDescriptor::new("session", PluginTier::App);
        assert_eq!(plugin.name(), "session");
        assert!(plugin.enable);
        assert!(!plugin.implicit_enable);
        assert!(plugin.dependencies.is_empty());
        assert!(plugin.location.is_none());
    }

    #[test]
    fn test_env_allow_list() {
        let everywhere = PluginDescriptor::new("a", PluginTier::App);
        assert!(everywhere.allows_env("prod"));

        let dev_only = PluginDescriptor::new("b", PluginTier::App).with_env(["local", "unittest"]);
        assert!(dev_only.allows_env("unittest"));
        assert!(!dev_only.allows_env("prod"));
    }

    #[test]
    fn test_tier_ordering() {
        assert!(PluginTier::Framework < PluginTier::App);
        assert!(PluginTier::App < PluginTier::Runtime);
        assert_eq!(PluginTier::Runtime.to_string(), "runtime");
    }
}
