//! Project metadata published with the service instance.

use crate::config::ServiceMetadataConfig;

/// Group, name and version of the hosted service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectMetadata {
    pub group: Option<String>,
    pub name: String,
    pub version: String,
}

impl ProjectMetadata {
    /// Metadata of this package, taken from Cargo at build time.
    pub fn from_cargo() -> Self {
        Self {
            group: None,
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Apply configured overrides on top of `self`.
    pub fn with_overrides(mut self, overrides: &ServiceMetadataConfig) -> Self {
        if let Some(group) = &overrides.group {
            self.group = Some(group.clone());
        }
        if let Some(name) = &overrides.name {
            self.name = name.clone();
        }
        if let Some(version) = &overrides.version {
            self.version = version.clone();
        }
        self
    }

    /// `name-version`
    pub fn full_name(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }
}

impl Default for ProjectMetadata {
    fn default() -> Self {
        Self::from_cargo()
    }
}
