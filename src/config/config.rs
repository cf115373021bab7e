//! Main configuration structure and implementation

use anyhow::{anyhow, Context, Result};
use liftoff_plugin::{PluginDeclaration, PluginDeclarations, PluginTier};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use super::FrameworkConfig;

/// Default per-task readiness timeout
pub const DEFAULT_READY_TIMEOUT_MS: u64 = 10_000;

fn default_ready_timeout_ms() -> u64 {
    DEFAULT_READY_TIMEOUT_MS
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Configuration version
    pub version: String,

    /// Application name
    pub name: String,

    /// Server environment, overridden by `LIFTOFF_SERVER_ENV`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,

    /// Time a boot task may take before a timeout diagnostic is emitted
    #[serde(default = "default_ready_timeout_ms")]
    pub ready_timeout_ms: u64,

    /// Framework layers, outermost first
    #[serde(default)]
    pub frameworks: Vec<FrameworkConfig>,

    /// Application plugin declarations
    #[serde(default)]
    pub plugins: PluginDeclarations,
}

impl Config {
    /// Load configuration from a YAML or JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {:?}", path))?;
        let config: Config = if is_json(path) {
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid JSON configuration in {:?}", path))?
        } else {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Invalid YAML configuration in {:?}", path))?
        };
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a YAML or JSON file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = if is_json(path) {
            serde_json::to_string_pretty(self)?
        } else {
            serde_yaml::to_string(self)?
        };
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write configuration file {:?}", path))?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.version != "1.0" {
            return Err(anyhow!(
                "Unsupported configuration version: {}",
                self.version
            ));
        }

        if self.name.trim().is_empty() {
            return Err(anyhow!("Application name cannot be empty"));
        }

        if self.ready_timeout_ms == 0 {
            return Err(anyhow!("ready_timeout_ms must be greater than zero"));
        }

        let mut seen = HashSet::new();
        for framework in &self.frameworks {
            framework.validate()?;
            if !seen.insert(framework.name.as_str()) {
                return Err(anyhow!("Framework {} is declared twice", framework.name));
            }
            validate_declarations(&framework.plugins)
                .with_context(|| format!("Invalid plugins in framework {}", framework.name))?;
        }

        validate_declarations(&self.plugins)?;
        Ok(())
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    /// Declaration tiers in merge order, lowest precedence first
    ///
    /// Inner frameworks are overridden by outer ones, and every framework
    /// by the application.
    pub fn plugin_tiers(&self) -> Vec<(PluginTier, &PluginDeclarations)> {
        let mut tiers: Vec<_> = self
            .frameworks
            .iter()
            .rev()
            .map(|framework| (PluginTier::Framework, &framework.plugins))
            .collect();
        tiers.push((PluginTier::App, &self.plugins));
        tiers
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            name: "app".to_string(),
            env: None,
            ready_timeout_ms: DEFAULT_READY_TIMEOUT_MS,
            frameworks: Vec::new(),
            plugins: PluginDeclarations::new(),
        }
    }
}

fn validate_declarations(declarations: &PluginDeclarations) -> Result<()> {
    for (name, declaration) in declarations.iter() {
        if name.trim().is_empty() {
            return Err(anyhow!("Plugin name cannot be empty"));
        }
        if let PluginDeclaration::Spec(spec) = declaration {
            if spec.path.is_some() && spec.package.is_some() {
                return Err(anyhow!(
                    "Plugin {} cannot declare both path and package",
                    name
                ));
            }
        }
    }
    Ok(())
}

fn is_json(path: &Path) -> bool {
    path.extension().map(|ext| ext == "json").unwrap_or(false)
}
