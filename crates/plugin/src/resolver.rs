//! Dependency resolution for plugins
//!
//! Produces one deterministic activation order for the explicitly enabled
//! plugins. Hard `dependencies` pull disabled plugins in (implicit enable);
//! `optional_dependencies` only constrain ordering when both ends end up
//! enabled. Missing hard dependencies and cycles are collected in a single
//! [`SequencifyError`].

use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use crate::descriptor::PluginDescriptor;
use crate::error::{MissingDependency, SequencifyError};

/// A plugin that had to be switched on because something depends on it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImplicitEnable {
    /// Plugin name
    pub name: String,

    /// Enabled plugins that hard-depend on it
    pub dependents: Vec<String>,

    /// The application tier explicitly disabled it
    pub disabled_by_app: bool,
}

/// Outcome of a successful resolution
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    /// Enabled plugins, every plugin after all of its dependencies
    pub order: Vec<PluginDescriptor>,

    /// Plugins enabled only because of their dependents
    pub implicitly_enabled: Vec<ImplicitEnable>,
}

impl Resolution {
    /// Names in activation order
    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(PluginDescriptor::name).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Implicit enables that overrode an application-level disable
    pub fn overridden_disables(&self) -> impl Iterator<Item = &ImplicitEnable> {
        self.implicitly_enabled.iter().filter(|i| i.disabled_by_app)
    }
}

/// Orders plugins over a mutable descriptor map
///
/// Only `enable`, `implicit_enable` and `dependents` are written back.
pub struct DependencyResolver<'a> {
    plugins: &'a mut HashMap<String, PluginDescriptor>,
    app_disabled: HashSet<String>,
    excluded: HashSet<String>,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(plugins: &'a mut HashMap<String, PluginDescriptor>) -> Self {
        Self {
            plugins,
            app_disabled: HashSet::new(),
            excluded: HashSet::new(),
        }
    }

    /// Names the application tier explicitly disabled
    pub fn with_app_disabled<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.app_disabled = names.into_iter().map(Into::into).collect();
        self
    }

    /// Names that must never be enabled, e.g. filtered out by env
    pub fn with_excluded<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded = names.into_iter().map(Into::into).collect();
        self
    }

    /// Order `explicit_names` and everything they hard-depend on
    pub fn resolve(self, explicit_names: &[String]) -> Result<Resolution, SequencifyError> {
        if explicit_names.is_empty() {
            debug!("No plugins enabled, skipping dependency resolution");
            return Ok(Resolution::default());
        }

        let mut sequencer = Sequencer::new(self.plugins, &self.excluded);
        sequencer.visit(explicit_names, false, "app");
        let sequence = sequencer.finish()?;

        for plugin in self.plugins.values_mut() {
            plugin.dependents.clear();
        }
        for name in &sequence {
            let dependencies = self
                .plugins
                .get(name)
                .map(|p| p.dependencies.clone())
                .unwrap_or_default();
            for dependency in dependencies {
                if let Some(target) = self.plugins.get_mut(&dependency) {
                    if !target.dependents.contains(name) {
                        target.dependents.push(name.clone());
                    }
                }
            }
        }

        let mut implicitly_enabled = Vec::new();
        for name in &sequence {
            if explicit_names.contains(name) {
                continue;
            }
            let Some(plugin) = self.plugins.get_mut(name) else {
                continue;
            };
            if plugin.enable {
                continue;
            }
            plugin.enable = true;
            plugin.implicit_enable = true;

            let disabled_by_app = self.app_disabled.contains(name);
            if disabled_by_app {
                warn!(
                    "Plugin {} is enabled implicitly despite being disabled by application, depended by [{}]",
                    name,
                    plugin.dependents.join(", ")
                );
            } else {
                info!(
                    "Plugin {} is enabled implicitly, depended by [{}]",
                    name,
                    plugin.dependents.join(", ")
                );
            }
            implicitly_enabled.push(ImplicitEnable {
                name: name.clone(),
                dependents: plugin.dependents.clone(),
                disabled_by_app,
            });
        }

        let order = sequence
            .iter()
            .filter_map(|name| self.plugins.get(name).cloned())
            .collect();

        Ok(Resolution {
            order,
            implicitly_enabled,
        })
    }
}

/// Resolve with no tier information: nothing excluded, nothing app-disabled
pub fn resolve(
    plugins: &mut HashMap<String, PluginDescriptor>,
    explicit_names: &[String],
) -> Result<Resolution, SequencifyError> {
    DependencyResolver::new(plugins).resolve(explicit_names)
}

/// Depth-first walk that records first-discovery order
struct Sequencer<'p> {
    plugins: &'p HashMap<String, PluginDescriptor>,
    excluded: &'p HashSet<String>,
    sequence: Vec<String>,
    required: HashSet<String>,
    missing: Vec<MissingDependency>,
    cycles: Vec<Vec<String>>,
    nest: Vec<String>,
}

impl<'p> Sequencer<'p> {
    fn new(plugins: &'p HashMap<String, PluginDescriptor>, excluded: &'p HashSet<String>) -> Self {
        Self {
            plugins,
            excluded,
            sequence: Vec::new(),
            required: HashSet::new(),
            missing: Vec::new(),
            cycles: Vec::new(),
            nest: Vec::new(),
        }
    }

    fn node(&self, name: &str) -> Option<&'p PluginDescriptor> {
        if self.excluded.contains(name) {
            return None;
        }
        self.plugins.get(name)
    }

    /// `optional` is inherited by the whole subtree below a soft edge
    fn visit(&mut self, names: &[String], optional: bool, parent: &str) {
        for name in names {
            if self.required.contains(name) {
                continue;
            }

            match self.node(name) {
                None => {
                    if optional {
                        debug!("Optional dependency {} of {} is not available", name, parent);
                        continue;
                    }
                    self.record_missing(name, parent);
                    continue;
                }
                Some(_) if self.nest.contains(name) => {
                    let mut cycle = self.nest.clone();
                    cycle.push(name.clone());
                    self.cycles.push(cycle);
                }
                Some(node) => {
                    if !node.dependencies.is_empty() || !node.optional_dependencies.is_empty() {
                        self.nest.push(name.clone());
                        self.visit(&node.dependencies, optional, name);
                        self.visit(&node.optional_dependencies, true, name);
                        self.nest.pop();
                    }
                }
            }

            if !optional && self.required.insert(name.clone()) {
                debug!("Plugin {} is required by {}", name, parent);
            }
            if !self.sequence.contains(name) {
                self.sequence.push(name.clone());
            }
        }
    }

    fn record_missing(&mut self, name: &str, parent: &str) {
        match self.missing.iter_mut().find(|m| m.name == name) {
            Some(entry) => {
                if !entry.required_by.iter().any(|r| r == parent) {
                    entry.required_by.push(parent.to_string());
                }
            }
            None => self.missing.push(MissingDependency {
                name: name.to_string(),
                required_by: vec![parent.to_string()],
            }),
        }
    }

    fn finish(self) -> Result<Vec<String>, SequencifyError> {
        if !self.missing.is_empty() || !self.cycles.is_empty() {
            return Err(SequencifyError {
                missing: self.missing,
                cycles: self.cycles,
            });
        }
        let required = self.required;
        Ok(self
            .sequence
            .into_iter()
            .filter(|name| required.contains(name))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::PluginTier;
    use rstest::rstest;

    fn plugin(name: &str, dependencies: &[&str]) -> PluginDescriptor {
        PluginDescriptor::new(name, PluginTier::App).with_dependencies(dependencies.iter().copied())
    }

    fn plugins(list: Vec<PluginDescriptor>) -> HashMap<String, PluginDescriptor> {
        list.into_iter().map(|p| (p.name().to_string(), p)).collect()
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn position(resolution: &Resolution, name: &str) -> usize {
        resolution
            .names()
            .iter()
            .position(|n| *n == name)
            .unwrap_or_else(|| panic!("{name} not in order"))
    }

    #[test]
    fn test_empty_explicit_names() {
        let mut all = plugins(vec![plugin("a", &[])]);
        let resolution = resolve(&mut all, &[]).unwrap();
        assert!(resolution.is_empty());
    }

    #[test]
    fn test_chain_is_ordered() {
        let mut all = plugins(vec![
            plugin("session", &[]),
            plugin("cache", &["session"]),
            plugin("api", &["cache"]),
        ]);
        let resolution = resolve(&mut all, &names(&["api"])).unwrap();
        assert_eq!(resolution.names(), vec!["session", "cache", "api"]);
    }

    #[test]
    fn test_first_discovery_breaks_ties() {
        let mut all = plugins(vec![
            plugin("a", &[]),
            plugin("b", &[]),
            plugin("c", &["b", "a"]),
        ]);
        let resolution = resolve(&mut all, &names(&["c", "a", "b"])).unwrap();
        assert_eq!(resolution.names(), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let build = || {
            plugins(vec![
                plugin("a", &[]),
                plugin("b", &["a"]),
                plugin("c", &["a"]),
                plugin("d", &["c", "b"]),
                plugin("e", &[]),
            ])
        };
        let explicit = names(&["e", "d", "b", "c", "a"]);

        let mut all = build();
        let first = resolve(&mut all, &explicit).unwrap().names().join(",");
        for _ in 0..10 {
            let mut fresh = build();
            assert_eq!(resolve(&mut fresh, &explicit).unwrap().names().join(","), first);
            assert_eq!(resolve(&mut all, &explicit).unwrap().names().join(","), first);
        }
    }

    #[rstest]
    #[case::three(vec![("a", vec!["b"]), ("b", vec!["c"]), ("c", vec!["a"])], vec!["a", "b", "c"])]
    #[case::two(vec![("a", vec!["b"]), ("b", vec!["a"])], vec!["a", "b"])]
    #[case::self_loop(vec![("a", vec!["a"])], vec!["a"])]
    fn test_cycles_are_reported(
        #[case] graph: Vec<(&str, Vec<&str>)>,
        #[case] members: Vec<&str>,
    ) {
        let mut all = plugins(graph.iter().map(|(n, d)| plugin(n, d)).collect());
        let explicit: Vec<String> = graph.iter().map(|(n, _)| n.to_string()).collect();

        let err = resolve(&mut all, &explicit).unwrap_err();
        assert!(err.missing.is_empty());
        let cycle = &err.cycles[0];
        assert_eq!(cycle.first(), cycle.last());
        for member in members {
            assert!(cycle.iter().any(|n| n == member), "{member} missing from {cycle:?}");
        }
    }

    #[test]
    fn test_three_cycle_exact_members() {
        let mut all = plugins(vec![plugin("a", &["b"]), plugin("b", &["c"]), plugin("c", &["a"])]);
        let err = resolve(&mut all, &names(&["a", "b", "c"])).unwrap_err();
        assert_eq!(err.cycles[0], names(&["a", "b", "c", "a"]));
        assert!(err.to_string().contains("[a,b,c,a]"));
    }

    #[test]
    fn test_missing_dependency() {
        let mut all = plugins(vec![plugin("c", &["a1"])]);
        let err = resolve(&mut all, &names(&["c"])).unwrap_err();
        assert_eq!(err.missing_names(), vec!["a1"]);
        assert_eq!(err.missing[0].required_by, names(&["c"]));

        let message = err.to_string();
        assert!(message.contains("a1"));
        assert!(message.contains("[c]"));
    }

    #[test]
    fn test_all_missing_dependencies_are_collected() {
        let mut all = plugins(vec![
            plugin("a", &["x"]),
            plugin("b", &["x", "y"]),
        ]);
        let err = resolve(&mut all, &names(&["a", "b"])).unwrap_err();
        assert_eq!(err.missing_names(), vec!["x", "y"]);
        assert_eq!(err.missing[0].required_by, names(&["a", "b"]));
        assert_eq!(err.missing[1].required_by, names(&["b"]));
    }

    #[test]
    fn test_implicit_enable() {
        let mut all = plugins(vec![
            plugin("a", &[]).with_enable(false),
            plugin("b", &["a"]),
        ]);
        let resolution = resolve(&mut all, &names(&["b"])).unwrap();

        assert_eq!(resolution.names(), vec!["a", "b"]);
        let a = &resolution.order[0];
        assert!(a.enable);
        assert!(a.implicit_enable);
        assert_eq!(a.dependents, names(&["b"]));

        assert!(all["a"].enable);
        assert!(all["a"].implicit_enable);
        assert!(!all["b"].implicit_enable);

        assert_eq!(resolution.implicitly_enabled.len(), 1);
        assert!(!resolution.implicitly_enabled[0].disabled_by_app);
    }

    #[test]
    fn test_implicit_enable_over_app_disable_is_flagged() {
        let mut all = plugins(vec![
            plugin("session", &[]).with_enable(false),
            plugin("cache", &["session"]),
            plugin("api", &["cache"]),
        ]);
        let resolution = DependencyResolver::new(&mut all)
            .with_app_disabled(["session"])
            .resolve(&names(&["cache", "api"]))
            .unwrap();

        assert_eq!(resolution.names(), vec!["session", "cache", "api"]);
        assert!(all["session"].enable);
        let overridden: Vec<_> = resolution.overridden_disables().map(|i| i.name.as_str()).collect();
        assert_eq!(overridden, vec!["session"]);
    }

    #[test]
    fn test_optional_dependency_does_not_force_enable() {
        let mut all = plugins(vec![
            plugin("a", &[]).with_enable(false),
            plugin("b", &[]).with_optional_dependencies(["a"]),
        ]);
        let resolution = resolve(&mut all, &names(&["b"])).unwrap();
        assert_eq!(resolution.names(), vec!["b"]);
        assert!(!all["a"].enable);
        assert!(resolution.implicitly_enabled.is_empty());
    }

    #[test]
    fn test_absent_optional_dependency_is_not_an_error() {
        let mut all = plugins(vec![plugin("b", &[]).with_optional_dependencies(["ghost"])]);
        let resolution = resolve(&mut all, &names(&["b"])).unwrap();
        assert_eq!(resolution.names(), vec!["b"]);
    }

    #[test]
    fn test_optional_dependency_orders_when_enabled() {
        let mut all = plugins(vec![
            plugin("view", &[]).with_optional_dependencies(["i18n"]),
            plugin("i18n", &[]),
        ]);
        let resolution = resolve(&mut all, &names(&["view", "i18n"])).unwrap();
        assert!(position(&resolution, "i18n") < position(&resolution, "view"));
    }

    #[test]
    fn test_hard_dependency_below_optional_edge_stays_optional() {
        let mut all = plugins(vec![
            plugin("a", &[]).with_optional_dependencies(["b"]),
            plugin("b", &["c"]).with_enable(false),
            plugin("c", &[]).with_enable(false),
        ]);
        let resolution = resolve(&mut all, &names(&["a"])).unwrap();
        assert_eq!(resolution.names(), vec!["a"]);
        assert!(!all["c"].enable);
    }

    #[test]
    fn test_excluded_plugin_counts_as_missing() {
        let mut all = plugins(vec![
            plugin("devtools", &[]).with_env(["local"]).with_enable(false),
            plugin("api", &["devtools"]),
        ]);
        let err = DependencyResolver::new(&mut all)
            .with_excluded(["devtools"])
            .resolve(&names(&["api"]))
            .unwrap_err();
        assert_eq!(err.missing_names(), vec!["devtools"]);
        assert!(!all["devtools"].enable);
    }

    #[test]
    fn test_topological_validity() {
        let mut all = plugins(vec![
            plugin("logger", &[]),
            plugin("config", &["logger"]),
            plugin("db", &["config", "logger"]),
            plugin("cache", &["config"]).with_optional_dependencies(["db"]),
            plugin("api", &["cache", "db"]),
            plugin("admin", &["api"]).with_optional_dependencies(["metrics"]),
        ]);
        let explicit = names(&["admin", "api", "cache", "db", "config", "logger"]);
        let resolution = resolve(&mut all, &explicit).unwrap();
        assert_eq!(resolution.order.len(), 6);

        for plugin in &resolution.order {
            let index = position(&resolution, plugin.name());
            for dependency in plugin.dependencies.iter().chain(&plugin.optional_dependencies) {
                if resolution.names().contains(&dependency.as_str()) {
                    assert!(position(&resolution, dependency) < index);
                }
            }
        }
    }

    #[test]
    fn test_dependents_are_recorded() {
        let mut all = plugins(vec![
            plugin("session", &[]),
            plugin("cache", &["session"]),
            plugin("auth", &["session"]),
        ]);
        resolve(&mut all, &names(&["cache", "auth"])).unwrap();
        assert_eq!(all["session"].dependents, names(&["cache", "auth"]));
    }
}
