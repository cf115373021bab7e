//! Framework layer configuration

use anyhow::{anyhow, Result};
use liftoff_plugin::PluginDeclarations;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One framework layer and the plugin defaults it ships
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameworkConfig {
    /// Framework name
    pub name: String,

    /// Framework root directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Plugin defaults declared by this layer
    #[serde(default)]
    pub plugins: PluginDeclarations,
}

impl FrameworkConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Validate the framework layer
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(anyhow!("Framework name cannot be empty"));
        }
        Ok(())
    }
}
