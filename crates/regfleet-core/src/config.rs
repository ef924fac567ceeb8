//! Fleet snapshot loading.
//!
//! A snapshot is a YAML (or JSON) document listing the registries of a fleet
//! and the projects expected on them:
//!
//! ```yaml
//! registries:
//!   - name: hub
//!     provider: harbor
//!     apiEndpoint: https://hub.example.com
//!     username: admin
//!     password: secret
//!     role: GlobalHub
//! projects:
//!   - name: os-images
//!     members:
//!       - { name: ci, type: Robot, role: PullOnly }
//! ```

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{ProjectKind, ProjectSpec, Registry, RegistrySpec};
use crate::options::CliOptions;
use crate::topology::validate_hubs;

/// Declarative fleet snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetConfig {
    /// Registries of the fleet.
    #[serde(default)]
    pub registries: Vec<RegistrySpec>,
    /// Expected projects.
    #[serde(default)]
    pub projects: Vec<ProjectSpec>,
}

impl FleetConfig {
    /// Parses a snapshot from a YAML or JSON string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the document is malformed or fails
    /// validation.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)
            .map_err(|e| Error::configuration(format!("failed to parse fleet snapshot: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a snapshot from a file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the file cannot be read, parsed or
    /// validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration(format!("failed to read {}: {e}", path.display()))
        })?;
        let config = Self::from_yaml_str(&content)?;
        tracing::debug!(
            path = %path.display(),
            registries = config.registries.len(),
            projects = config.projects.len(),
            "loaded fleet snapshot"
        );
        Ok(config)
    }

    /// Checks names are unique and local projects reference known registries.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        let mut names = BTreeSet::new();
        for registry in &self.registries {
            if registry.name.is_empty() {
                return Err(Error::configuration("registry name must not be empty"));
            }
            if !names.insert(registry.name.as_str()) {
                return Err(Error::configuration(format!(
                    "duplicate registry name '{}'",
                    registry.name
                )));
            }
        }

        let mut projects = BTreeSet::new();
        for project in &self.projects {
            if project.name.is_empty() || project.name.contains('/') {
                return Err(Error::configuration(format!(
                    "invalid project name '{}'",
                    project.name
                )));
            }
            if !projects.insert(project.name.as_str()) {
                return Err(Error::configuration(format!(
                    "duplicate project name '{}'",
                    project.name
                )));
            }
            if project.kind == ProjectKind::Local {
                if let Some(unknown) = project
                    .local_registries
                    .iter()
                    .find(|r| !names.contains(r.as_str()))
                {
                    return Err(Error::configuration(format!(
                        "project '{}' references unknown registry '{unknown}'",
                        project.name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Builds read-only registry values, merging CLI options with annotations.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if more than one global hub is declared.
    pub fn registries(&self, cli: &CliOptions) -> Result<Vec<Registry>> {
        let registries: Vec<Registry> = self
            .registries
            .iter()
            .cloned()
            .map(|spec| Registry::from_spec(spec, cli))
            .collect();
        validate_hubs(&registries)?;
        Ok(registries)
    }

    /// Returns the projects expected on the named registry.
    pub fn projects_for<'a>(&'a self, registry: &'a str) -> impl Iterator<Item = &'a ProjectSpec> {
        self.projects
            .iter()
            .filter(move |p| p.is_expected_on(registry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Member, ProviderKind};
    use std::io::Write;

    const SNAPSHOT: &str = r"
registries:
  - name: hub
    provider: harbor
    apiEndpoint: https://hub.example.com
    username: admin
    password: secret
    role: GlobalHub
  - name: edge
    provider: acr
    apiEndpoint: https://edge.azurecr.io
    username: edge
    password: secret
    annotations:
      regfleet.io/force-delete: 'true'
projects:
  - name: os-images
    trigger: cron 0 3 * * *
    members:
      - { name: ci, type: Robot, role: PullOnly }
      - { name: alice, type: User, role: Developer }
  - name: scratch
    kind: Local
    localRegistries: [edge]
";

    #[test]
    fn test_parse_snapshot() {
        let config = FleetConfig::from_yaml_str(SNAPSHOT).unwrap();
        assert_eq!(config.registries.len(), 2);
        assert_eq!(config.registries[1].provider, ProviderKind::Acr);
        assert_eq!(config.projects[0].members[0], Member::robot("ci", "PullOnly"));
        assert_eq!(config.projects[0].trigger.as_deref(), Some("cron 0 3 * * *"));
    }

    #[test]
    fn test_registries_merge_annotations() {
        let config = FleetConfig::from_yaml_str(SNAPSHOT).unwrap();
        let registries = config.registries(&CliOptions::default()).unwrap();
        assert!(!registries[0].options().force_delete);
        assert!(registries[1].options().force_delete);
    }

    #[test]
    fn test_projects_for_registry() {
        let config = FleetConfig::from_yaml_str(SNAPSHOT).unwrap();
        let hub: Vec<_> = config.projects_for("hub").map(|p| p.name.as_str()).collect();
        let edge: Vec<_> = config.projects_for("edge").map(|p| p.name.as_str()).collect();
        assert_eq!(hub, vec!["os-images"]);
        assert_eq!(edge, vec!["os-images", "scratch"]);
    }

    #[test]
    fn test_duplicate_registry_rejected() {
        let doc = r"
registries:
  - { name: a, provider: acr, apiEndpoint: 'https://a', username: u, password: p }
  - { name: a, provider: acr, apiEndpoint: 'https://b', username: u, password: p }
";
        let err = FleetConfig::from_yaml_str(doc).unwrap_err();
        assert!(err.to_string().contains("duplicate registry name 'a'"));
    }

    #[test]
    fn test_unknown_local_registry_rejected() {
        let doc = r"
projects:
  - { name: scratch, kind: Local, localRegistries: [nowhere] }
";
        let err = FleetConfig::from_yaml_str(doc).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_two_hubs_rejected() {
        let doc = r"
registries:
  - { name: a, provider: harbor, apiEndpoint: 'https://a', username: u, password: p, role: GlobalHub }
  - { name: b, provider: harbor, apiEndpoint: 'https://b', username: u, password: p, role: GlobalHub }
";
        let config = FleetConfig::from_yaml_str(doc).unwrap();
        assert!(config.registries(&CliOptions::default()).is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SNAPSHOT.as_bytes()).unwrap();
        let config = FleetConfig::from_file(file.path()).unwrap();
        assert_eq!(config.projects.len(), 2);

        assert!(FleetConfig::from_file("/nonexistent/fleet.yaml").is_err());
    }

    #[test]
    fn test_malformed_snapshot() {
        let err = FleetConfig::from_yaml_str("registries: 12").unwrap_err();
        assert!(err.is_fatal());
    }
}
