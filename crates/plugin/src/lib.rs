//! Plugin declarations, tiered merging and dependency resolution

pub mod declaration;
pub mod descriptor;
pub mod error;
pub mod registry;
pub mod resolver;

pub use declaration::{PluginDeclaration, PluginDeclarations, PluginManifest, PluginSpec};
pub use descriptor::{PluginDescriptor, PluginLocation, PluginTier};
pub use error::{MissingDependency, RegistryError, SequencifyError};
pub use registry::PluginRegistry;
pub use resolver::{resolve, DependencyResolver, ImplicitEnable, Resolution};
