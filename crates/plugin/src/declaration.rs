//! Plugin declarations as written in configuration files
//!
//! A declaration is either a boolean shorthand (`session: false`) or a
//! partial spec whose present fields override lower tiers field by field.

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;

use crate::error::RegistryError;

/// Partial plugin settings from a single tier
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PluginSpec {
    /// Enable flag; absent means "keep lower tier" (or `true` for new plugins)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable: Option<bool>,

    /// Package name, exclusive with `path`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,

    /// Local path, exclusive with `package`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Hard dependencies
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<String>>,

    /// Soft dependencies
    #[serde(
        alias = "optional_dependencies",
        skip_serializing_if = "Option::is_none"
    )]
    pub optional_dependencies: Option<Vec<String>>,

    /// Environment allow-list
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<Vec<String>>,
}

/// One entry of a `plugins` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PluginDeclaration {
    /// `name: true|false`
    Toggle(bool),

    /// `name: { enable: ..., dependencies: [...] }`
    Spec(PluginSpec),
}

impl PluginDeclaration {
    /// Normalize to a spec; the shorthand only carries the enable flag
    pub fn to_spec(&self) -> PluginSpec {
        match self {
            PluginDeclaration::Toggle(enable) => PluginSpec {
                enable: Some(*enable),
                ..PluginSpec::default()
            },
            PluginDeclaration::Spec(spec) => spec.clone(),
        }
    }

    /// Whether this declaration explicitly switches the plugin off
    pub fn disables(&self) -> bool {
        match self {
            PluginDeclaration::Toggle(enable) => !enable,
            PluginDeclaration::Spec(spec) => spec.enable == Some(false),
        }
    }
}

impl From<bool> for PluginDeclaration {
    fn from(enable: bool) -> Self {
        PluginDeclaration::Toggle(enable)
    }
}

impl From<PluginSpec> for PluginDeclaration {
    fn from(spec: PluginSpec) -> Self {
        PluginDeclaration::Spec(spec)
    }
}

/// Ordered `plugins` table; keeps declaration order from the source file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PluginDeclarations {
    entries: Vec<(String, PluginDeclaration)>,
}

impl PluginDeclarations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a declaration; a replaced entry keeps its position
    pub fn insert(&mut self, name: impl Into<String>, declaration: impl Into<PluginDeclaration>) {
        let name = name.into();
        let declaration = declaration.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = declaration,
            None => self.entries.push((name, declaration)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&PluginDeclaration> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, declaration)| declaration)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PluginDeclaration)> {
        self.entries
            .iter()
            .map(|(name, declaration)| (name.as_str(), declaration))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge `other` over `self`, later entries replacing earlier ones
    pub fn extend(&mut self, other: PluginDeclarations) {
        for (name, declaration) in other.entries {
            self.insert(name, declaration);
        }
    }

    /// Whether `name` is declared here with `enable: false`
    pub fn disables(&self, name: &str) -> bool {
        self.get(name).map(PluginDeclaration::disables).unwrap_or(false)
    }

    /// Parse a JSON object in the declaration format
    pub fn from_json_str(content: &str) -> Result<Self, RegistryError> {
        serde_json::from_str(content).map_err(|e| RegistryError::Json(e.to_string()))
    }

    /// Parse a YAML mapping in the declaration format
    pub fn from_yaml_str(content: &str) -> Result<Self, RegistryError> {
        serde_yaml::from_str(content).map_err(|e| RegistryError::Yaml(e.to_string()))
    }
}

impl<N, D> FromIterator<(N, D)> for PluginDeclarations
where
    N: Into<String>,
    D: Into<PluginDeclaration>,
{
    fn from_iter<T: IntoIterator<Item = (N, D)>>(iter: T) -> Self {
        let mut declarations = PluginDeclarations::new();
        for (name, declaration) in iter {
            declarations.insert(name, declaration);
        }
        declarations
    }
}

impl Serialize for PluginDeclarations {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, declaration) in &self.entries {
            map.serialize_entry(name, declaration)?;
        }
        map.end()
    }
}

struct DeclarationsVisitor;

impl<'de> Visitor<'de> for DeclarationsVisitor {
    type Value = PluginDeclarations;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of plugin name to boolean or plugin settings")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(PluginDeclarations::new())
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut declarations = PluginDeclarations::new();
        while let Some((name, declaration)) = access.next_entry::<String, PluginDeclaration>()? {
            declarations.insert(name, declaration);
        }
        Ok(declarations)
    }
}

impl<'de> Deserialize<'de> for PluginDeclarations {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(DeclarationsVisitor)
    }
}

/// Metadata a plugin implementation declares about itself
///
/// Non-empty lists here take precedence over what the configuration
/// tiers declared for the same plugin.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PluginManifest {
    /// Name the implementation expects to be registered under
    pub name: Option<String>,

    /// Hard dependencies
    pub dependencies: Vec<String>,

    /// Soft dependencies
    pub optional_dependencies: Vec<String>,

    /// Environment allow-list
    pub env: Vec<String>,

    /// `Some(false)` silences the name mismatch warning
    pub strict: Option<bool>,
}

impl PluginManifest {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_optional_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.optional_dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }
}
