//! Tiered plugin registry
//!
//! Declarations are merged tier by tier, lowest precedence first: framework
//! defaults, application config, runtime overrides. Later tiers overwrite
//! earlier ones field by field.

use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use crate::declaration::{PluginDeclarations, PluginManifest, PluginSpec};
use crate::descriptor::{PluginDescriptor, PluginLocation, PluginTier};
use crate::error::SequencifyError;
use crate::resolver::{DependencyResolver, Resolution};

/// Merged view of every known plugin before resolution
#[derive(Debug, Clone, Default)]
pub struct PluginRegistry {
    plugins: HashMap<String, PluginDescriptor>,
    order: Vec<String>,
    app_disabled: HashSet<String>,
    excluded: HashSet<String>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one tier of declarations over what is already registered
    pub fn merge_tier(&mut self, tier: PluginTier, declarations: &PluginDeclarations) {
        debug!("Merging {} plugin declarations from {} tier", declarations.len(), tier);
        for (name, declaration) in declarations.iter() {
            if tier == PluginTier::App {
                if declaration.disables() {
                    self.app_disabled.insert(name.to_string());
                } else {
                    self.app_disabled.remove(name);
                }
            }
            self.merge_spec(tier, name, &declaration.to_spec());
        }
    }

    fn merge_spec(&mut self, tier: PluginTier, name: &str, spec: &PluginSpec) {
        if !self.plugins.contains_key(name) {
            self.order.push(name.to_string());
        }
        let target = self
            .plugins
            .entry(name.to_string())
            .or_insert_with(|| PluginDescriptor::new(name, tier));

        if let Some(enable) = spec.enable {
            target.enable = enable;
        }

        if spec.path.is_some() || spec.package.is_some() {
            if let (Some(PluginLocation::Package(existing)), Some(package)) =
                (&target.location, &spec.package)
            {
                if existing == package {
                    warn!(
                        "Plugin {} has been defined as package {}, but is defined again in {} tier",
                        name, package, tier
                    );
                }
            }
            target.location = match (&spec.path, &spec.package) {
                (Some(path), Some(package)) => {
                    warn!(
                        "Plugin {} declares both path {:?} and package {}, using path",
                        name, path, package
                    );
                    Some(PluginLocation::Path(path.clone()))
                }
                (Some(path), None) => Some(PluginLocation::Path(path.clone())),
                (None, Some(package)) => Some(PluginLocation::Package(package.clone())),
                (None, None) => None,
            };
        }

        merge_list(&mut target.dependencies, &spec.dependencies);
        merge_list(&mut target.optional_dependencies, &spec.optional_dependencies);
        merge_list(&mut target.env, &spec.env);

        target.from = target.from.max(tier);
    }

    /// Apply metadata the plugin implementation declares about itself
    ///
    /// Returns `false` when the plugin is not registered.
    pub fn apply_manifest(&mut self, name: &str, manifest: &PluginManifest) -> bool {
        let Some(target) = self.plugins.get_mut(name) else {
            debug!("Ignoring manifest for undeclared plugin {}", name);
            return false;
        };

        if let Some(declared) = &manifest.name {
            if declared != name && manifest.strict != Some(false) {
                warn!(
                    "Plugin {} is registered under name {} which does not match its manifest name {}",
                    name, name, declared
                );
            }
        }

        if !manifest.dependencies.is_empty() {
            target.dependencies = manifest.dependencies.clone();
        }
        if !manifest.optional_dependencies.is_empty() {
            target.optional_dependencies = manifest.optional_dependencies.clone();
        }
        if !manifest.env.is_empty() {
            target.env = manifest.env.clone();
        }
        true
    }

    /// Force-disable plugins not allowed in `server_env`; returns their names
    pub fn apply_env(&mut self, server_env: &str) -> Vec<String> {
        self.excluded.clear();
        let mut excluded = Vec::new();
        for name in &self.order {
            let Some(plugin) = self.plugins.get_mut(name) else {
                continue;
            };
            if plugin.allows_env(server_env) {
                continue;
            }
            if plugin.enable {
                info!(
                    "Plugin {} is disabled by env[{}], allowed envs [{}]",
                    name,
                    server_env,
                    plugin.env.join(", ")
                );
            }
            plugin.enable = false;
            self.excluded.insert(name.clone());
            excluded.push(name.clone());
        }
        excluded
    }

    /// Explicitly enabled plugin names in first-declared order
    pub fn enabled_names(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|name| !self.excluded.contains(*name))
            .filter(|name| self.plugins.get(*name).map(|p| p.enable).unwrap_or(false))
            .cloned()
            .collect()
    }

    /// Resolve the enabled plugins, flipping implicit enables in place
    pub fn resolve(&mut self) -> Result<Resolution, SequencifyError> {
        let explicit = self.enabled_names();
        DependencyResolver::new(&mut self.plugins)
            .with_app_disabled(self.app_disabled.iter().cloned())
            .with_excluded(self.excluded.iter().cloned())
            .resolve(&explicit)
    }

    pub fn get(&self, name: &str) -> Option<&PluginDescriptor> {
        self.plugins.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    /// Descriptors in first-declared order
    pub fn iter(&self) -> impl Iterator<Item = &PluginDescriptor> {
        self.order.iter().filter_map(|name| self.plugins.get(name))
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Whether the application tier switched `name` off
    pub fn disabled_by_app(&self, name: &str) -> bool {
        self.app_disabled.contains(name)
    }

    /// Whether `name` was force-disabled by env filtering
    pub fn is_excluded(&self, name: &str) -> bool {
        self.excluded.contains(name)
    }
}

/// Later non-empty lists win; an empty list never clears an earlier one
fn merge_list(target: &mut Vec<String>, value: &Option<Vec<String>>) {
    if let Some(list) = value {
        if list.is_empty() && !target.is_empty() {
            return;
        }
        target.clone_from(list);
    }
}
