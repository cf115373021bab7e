//! liftoff
//!
//! Bootstrap engine for plugin-based applications: resolves a deterministic,
//! dependency-respecting plugin order and drives the application through
//! its phased boot lifecycle.

pub mod cli;
pub mod config;
pub mod plugin;
pub mod utils;

pub use config::{Config, FrameworkConfig};
pub use liftoff_lifecycle::{
    BootHook, EventBus, Lifecycle, LifecycleError, LifecycleEvent, LifecycleOptions,
    LifecycleState, ReadyTask, TaskOptions,
};
pub use liftoff_plugin::{
    PluginDeclaration, PluginDeclarations, PluginDescriptor, PluginLocation, PluginManifest,
    PluginRegistry, PluginSpec, PluginTier, Resolution, SequencifyError,
};
pub use plugin::{PluginContext, PluginFactory, PluginManager};

use anyhow::Result;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Construction options for [`Application`]
#[derive(Debug, Clone, Default)]
pub struct AppOptions {
    /// Server environment override
    pub server_env: Option<String>,

    /// Runtime plugin declarations, applied over `LIFTOFF_PLUGINS`
    pub custom_plugins: Option<PluginDeclarations>,

    /// Diagnostic event bus to share with the lifecycle
    pub events: Option<EventBus>,
}

/// Kind of a load unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadUnitKind {
    Plugin,
    Framework,
    App,
}

impl fmt::Display for LoadUnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LoadUnitKind::Plugin => "plugin",
            LoadUnitKind::Framework => "framework",
            LoadUnitKind::App => "app",
        };
        f.write_str(label)
    }
}

/// One unit whose files the host loads, in load order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadUnit {
    pub kind: LoadUnitKind,
    pub name: String,
    pub path: Option<PathBuf>,
}

/// Main application context that coordinates all components
pub struct Application {
    config: Config,
    server_env: String,
    runtime_plugins: PluginDeclarations,
    plugin_manager: PluginManager,
    lifecycle: Lifecycle,
    app_hook: Option<Arc<dyn BootHook>>,
    plugins: Vec<PluginDescriptor>,
}

impl Application {
    /// Create a new application with the given configuration
    pub fn new(config: Config, options: AppOptions) -> Result<Self> {
        let server_env = options
            .server_env
            .filter(|env| !env.trim().is_empty())
            .unwrap_or_else(|| crate::config::server_env(config.env.as_deref()));

        let mut runtime_plugins = crate::config::runtime_plugins()?.unwrap_or_default();
        if let Some(custom) = options.custom_plugins {
            runtime_plugins.extend(custom);
        }

        let lifecycle = Lifecycle::new(LifecycleOptions {
            ready_timeout: config.ready_timeout(),
            events: options.events.unwrap_or_default(),
        });

        info!("Creating application {} (env: {})", config.name, server_env);
        Ok(Self {
            config,
            server_env,
            runtime_plugins,
            plugin_manager: PluginManager::new(),
            lifecycle,
            app_hook: None,
            plugins: Vec::new(),
        })
    }

    /// Register the factory that builds `name`'s boot hook
    pub async fn register_plugin(&self, name: impl Into<String>, factory: Arc<dyn PluginFactory>) {
        self.plugin_manager.register_factory(name, factory).await;
    }

    /// Set the application's own boot hook; it runs after every plugin
    pub fn add_app_hook(&mut self, hook: Arc<dyn BootHook>) {
        if self.app_hook.replace(hook).is_some() {
            warn!("Replacing previously added application hook");
        }
    }

    /// Merge every declaration tier, apply manifests and env filtering
    pub async fn plugin_registry(&self) -> PluginRegistry {
        let mut registry = PluginRegistry::new();
        for (tier, declarations) in self.config.plugin_tiers() {
            registry.merge_tier(tier, declarations);
        }
        if !self.runtime_plugins.is_empty() {
            registry.merge_tier(PluginTier::Runtime, &self.runtime_plugins);
        }

        for (name, manifest) in self.plugin_manager.manifests().await {
            registry.apply_manifest(&name, &manifest);
        }

        let excluded = registry.apply_env(&self.server_env);
        if !excluded.is_empty() {
            debug!("Plugins excluded in env {}: [{}]", self.server_env, excluded.join(", "));
        }
        registry
    }

    /// Resolve the enabled plugins into activation order
    ///
    /// A resolution failure is a [`SequencifyError`] inside the returned
    /// error.
    pub async fn load_plugins(&mut self) -> Result<Vec<PluginDescriptor>> {
        let mut registry = self.plugin_registry().await;
        let resolution = registry.resolve()?;

        let mut plugins = resolution.order;
        for plugin in &mut plugins {
            if let Some(PluginLocation::Path(path)) = &plugin.location {
                let expanded = utils::expand_path(path)?;
                plugin.location = Some(PluginLocation::Path(expanded));
            }
        }

        info!(
            "Resolved {} plugins: [{}]",
            plugins.len(),
            plugins.iter().map(PluginDescriptor::name).collect::<Vec<_>>().join(", ")
        );
        self.plugins = plugins.clone();
        Ok(plugins)
    }

    /// Plugins in dependency order, then frameworks outer to inner, then the app
    pub fn load_units(&self) -> Vec<LoadUnit> {
        let plugins = self.plugins.iter().map(|plugin| LoadUnit {
            kind: LoadUnitKind::Plugin,
            name: plugin.name().to_string(),
            path: match &plugin.location {
                Some(PluginLocation::Path(path)) => Some(path.clone()),
                _ => None,
            },
        });
        let frameworks = self.config.frameworks.iter().map(|framework| LoadUnit {
            kind: LoadUnitKind::Framework,
            name: framework.name.clone(),
            path: framework.path.clone(),
        });
        let app = LoadUnit {
            kind: LoadUnitKind::App,
            name: self.config.name.clone(),
            path: None,
        };
        plugins.chain(frameworks).chain(std::iter::once(app)).collect()
    }

    /// Resolve plugins, install their boot hooks and start booting
    ///
    /// Failures before the lifecycle runs are also delivered through
    /// [`ready`](Application::ready).
    pub async fn start(&mut self) -> Result<()> {
        if let Err(err) = self.install_hooks().await {
            return Err(self.lifecycle.abort(err).into());
        }
        self.lifecycle.boot()?;
        Ok(())
    }

    async fn install_hooks(&mut self) -> Result<()> {
        let plugins = self.load_plugins().await?;
        let hooks = self
            .plugin_manager
            .create_hooks(&plugins, &self.server_env, &self.lifecycle)
            .await?;
        for (name, hook) in hooks {
            self.lifecycle.add_boot_hook(name, hook)?;
        }
        if let Some(hook) = self.app_hook.clone() {
            self.lifecycle.add_boot_hook(self.config.name.clone(), hook)?;
        }
        Ok(())
    }

    /// Wait for startup to finish
    pub async fn ready(&self) -> Result<(), LifecycleError> {
        self.lifecycle.ready().await
    }

    /// Signal that the host server is listening
    pub async fn server_did_ready(&self) {
        self.lifecycle.trigger_server_did_ready().await;
    }

    /// Tear down; repeated calls return the first outcome
    pub async fn close(&self) -> Result<(), LifecycleError> {
        self.lifecycle.close().await
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn events(&self) -> &EventBus {
        self.lifecycle.events()
    }

    pub fn server_env(&self) -> &str {
        &self.server_env
    }

    /// Plugins from the last successful resolution
    pub fn plugins(&self) -> &[PluginDescriptor] {
        &self.plugins
    }
}
