//! Plugin factories
//!
//! Plugins are linked into the host ahead of time. The host registers one
//! factory per plugin name; after resolution each enabled plugin's factory
//! is asked, in activation order, for the boot hook it contributes.

use anyhow::{Context, Result};
use async_trait::async_trait;
use liftoff_lifecycle::{BootHook, Lifecycle};
use liftoff_plugin::{PluginDescriptor, PluginManifest};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// What a factory sees when creating its boot hook
#[derive(Clone)]
pub struct PluginContext {
    /// Resolved descriptor of the plugin being created
    pub plugin: PluginDescriptor,

    /// Current server environment
    pub server_env: String,

    /// Lifecycle the hook will be attached to
    pub lifecycle: Lifecycle,
}

/// Plugin factory trait for creating boot hooks
#[async_trait]
pub trait PluginFactory: Send + Sync {
    /// Metadata the implementation declares about itself
    fn manifest(&self) -> PluginManifest {
        PluginManifest::default()
    }

    /// Create the boot hook for an enabled plugin
    async fn create_hook(&self, context: &PluginContext) -> Result<Arc<dyn BootHook>>;
}

/// Plugin manager for coordinating plugin factories
pub struct PluginManager {
    /// Plugin factories by plugin name
    factories: Arc<RwLock<HashMap<String, Arc<dyn PluginFactory>>>>,
}

impl PluginManager {
    /// Create a new plugin manager
    pub fn new() -> Self {
        Self {
            factories: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a plugin factory, replacing any previous one
    pub async fn register_factory(&self, name: impl Into<String>, factory: Arc<dyn PluginFactory>) {
        let name = name.into();
        debug!("Registering plugin factory {}", name);
        self.factories.write().await.insert(name, factory);
    }

    /// Get a factory by plugin name
    pub async fn get_factory(&self, name: &str) -> Option<Arc<dyn PluginFactory>> {
        self.factories.read().await.get(name).cloned()
    }

    /// Registered plugin names, sorted
    pub async fn registered(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Manifests of every registered factory, sorted by plugin name
    pub async fn manifests(&self) -> Vec<(String, PluginManifest)> {
        let factories = self.factories.read().await;
        let mut manifests: Vec<_> = factories
            .iter()
            .map(|(name, factory)| (name.clone(), factory.manifest()))
            .collect();
        manifests.sort_by(|a, b| a.0.cmp(&b.0));
        manifests
    }

    /// Create hooks for `plugins` in the given order
    ///
    /// Plugins without a factory contribute no hook.
    pub async fn create_hooks(
        &self,
        plugins: &[PluginDescriptor],
        server_env: &str,
        lifecycle: &Lifecycle,
    ) -> Result<Vec<(String, Arc<dyn BootHook>)>> {
        let mut hooks = Vec::new();
        for plugin in plugins {
            let Some(factory) = self.get_factory(plugin.name()).await else {
                debug!("Plugin {} has no factory, no boot hook added", plugin.name());
                continue;
            };
            let context = PluginContext {
                plugin: plugin.clone(),
                server_env: server_env.to_string(),
                lifecycle: lifecycle.clone(),
            };
            let hook = factory
                .create_hook(&context)
                .await
                .with_context(|| format!("Failed to create boot hook for plugin {}", plugin.name()))?;
            hooks.push((plugin.name().to_string(), hook));
        }
        Ok(hooks)
    }
}

impl Default for PluginManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use liftoff_plugin::PluginTier;

    struct Noop;

    impl BootHook for Noop {}

    struct NoopFactory {
        manifest: PluginManifest,
    }

    #[async_trait]
    impl PluginFactory for NoopFactory {
        fn manifest(&self) -> PluginManifest {
            self.manifest.clone()
        }

        async fn create_hook(&self, context: &PluginContext) -> Result<Arc<dyn BootHook>> {
            assert_eq!(context.server_env, "unittest");
            Ok(Arc::new(Noop))
        }
    }

    struct BrokenFactory;

    #[async_trait]
    impl PluginFactory for BrokenFactory {
        async fn create_hook(&self, _context: &PluginContext) -> Result<Arc<dyn BootHook>> {
            anyhow::bail!("redis url missing")
        }
    }

    fn noop(manifest: PluginManifest) -> Arc<dyn PluginFactory> {
        Arc::new(NoopFactory { manifest })
    }

    #[tokio::test]
    async fn test_plugin_manager_creation() {
        let manager = PluginManager::new();
        assert!(manager.registered().await.is_empty());
        assert!(manager.get_factory("session").await.is_none());
    }

    #[tokio::test]
    async fn test_manifests_are_sorted() {
        let manager = PluginManager::new();
        manager
            .register_factory("session", noop(PluginManifest::named("session")))
            .await;
        manager
            .register_factory(
                "cache",
                noop(PluginManifest::named("cache").with_dependencies(["session"])),
            )
            .await;

        let manifests = manager.manifests().await;
        assert_eq!(manifests[0].0, "cache");
        assert_eq!(manifests[0].1.dependencies, vec!["session"]);
        assert_eq!(manager.registered().await, vec!["cache", "session"]);
    }

    #[tokio::test]
    async fn test_create_hooks_in_order_skipping_unregistered() {
        let manager = PluginManager::new();
        manager.register_factory("cache", noop(PluginManifest::default())).await;
        manager.register_factory("session", noop(PluginManifest::default())).await;

        let plugins = vec![
            PluginDescriptor::new("session", PluginTier::App),
            PluginDescriptor::new("static", PluginTier::App),
            PluginDescriptor::new("cache", PluginTier::App),
        ];
        let hooks = manager
            .create_hooks(&plugins, "unittest", &Lifecycle::default())
            .await
            .unwrap();
        let names: Vec<_> = hooks.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["session", "cache"]);
    }

    #[tokio::test]
    async fn test_create_hook_error_names_plugin() {
        let manager = PluginManager::new();
        manager.register_factory("redis", Arc::new(BrokenFactory)).await;

        let plugins = vec![PluginDescriptor::new("redis", PluginTier::App)];
        let err = manager
            .create_hooks(&plugins, "unittest", &Lifecycle::default())
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("plugin redis"));
    }
}
