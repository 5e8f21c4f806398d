//! Data models for catalog rows.

pub mod artifact;
pub mod dependency;

pub use artifact::{ModelAlias, ModelFile, NewModelFile, RegistryStats};
pub use dependency::{
    DependencyAction, DependencyEntry, DependencyManifest, DependencyResolution,
    ExistingDependency, MissingDependency,
};
