//! Capability and options resolution.
//!
//! CLI-level defaults are merged with per-registry annotations into an
//! effective [`RegistryOptions`] value.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Error;

/// Annotation overriding the force-delete option of one registry.
pub const FORCE_DELETE_ANNOTATION: &str = "regfleet.io/force-delete";

/// Annotation selecting how cron-triggered replication is carried out.
pub const REPLICATION_ANNOTATION: &str = "regfleet.io/replication";

/// Annotation naming the Artifactory docker repository key.
pub const DOCKER_REPOSITORY_ANNOTATION: &str = "regfleet.io/docker-repository";

/// How a replication rule moves images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReplicationType {
    /// The registry's built-in replication feature.
    Registry,
    /// A scheduled job invoking the external image copy tool.
    CopyTool,
}

impl ReplicationType {
    /// Returns a string representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Registry => "registry",
            Self::CopyTool => "copy-tool",
        }
    }
}

impl std::fmt::Display for ReplicationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReplicationType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "registry" => Ok(Self::Registry),
            "copy-tool" | "skopeo" => Ok(Self::CopyTool),
            other => Err(Error::configuration(format!(
                "unknown replication type '{other}', expected \"registry\" or \"copy-tool\""
            ))),
        }
    }
}

/// Options given on the command line, applied to every registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CliOptions {
    /// Delete projects even when they still own repositories.
    pub force_delete: bool,
}

impl CliOptions {
    /// Sets the force-delete default.
    #[must_use]
    pub const fn with_force_delete(mut self, force_delete: bool) -> Self {
        self.force_delete = force_delete;
        self
    }
}

/// Effective options of one registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegistryOptions {
    /// Delete projects together with their repositories.
    pub force_delete: bool,
    /// Declared transport for cron-triggered replication, if any.
    pub replication: Option<ReplicationType>,
}

impl RegistryOptions {
    /// Merges CLI defaults with the annotations of a registry.
    ///
    /// Annotations win over CLI options. Invalid annotation values are
    /// logged and replaced by the safe default (no force delete, unspecified
    /// replication type).
    pub fn resolve(
        registry: &str,
        cli: &CliOptions,
        annotations: &BTreeMap<String, String>,
    ) -> Self {
        let mut options = Self {
            force_delete: cli.force_delete,
            replication: None,
        };

        if let Some(value) = annotations.get(FORCE_DELETE_ANNOTATION) {
            options.force_delete = value.trim().parse::<bool>().unwrap_or_else(|_| {
                warn!(
                    registry,
                    value = %value,
                    annotation = FORCE_DELETE_ANNOTATION,
                    "invalid annotation value, expected \"true\" or \"false\""
                );
                false
            });
        }

        if let Some(value) = annotations.get(REPLICATION_ANNOTATION) {
            match value.trim().parse::<ReplicationType>() {
                Ok(replication) => options.replication = Some(replication),
                Err(e) => warn!(
                    registry,
                    value = %value,
                    annotation = REPLICATION_ANNOTATION,
                    error = %e,
                    "ignoring replication annotation"
                ),
            }
        }

        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotations(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_cli_defaults_apply_without_annotations() {
        let cli = CliOptions::default().with_force_delete(true);
        let options = RegistryOptions::resolve("hub", &cli, &BTreeMap::new());
        assert!(options.force_delete);
        assert_eq!(options.replication, None);
    }

    #[test]
    fn test_annotation_overrides_cli() {
        let cli = CliOptions::default().with_force_delete(true);
        let options = RegistryOptions::resolve(
            "hub",
            &cli,
            &annotations(&[(FORCE_DELETE_ANNOTATION, "false")]),
        );
        assert!(!options.force_delete);
    }

    #[test]
    fn test_invalid_force_delete_falls_back_to_false() {
        let cli = CliOptions::default().with_force_delete(true);
        let options = RegistryOptions::resolve(
            "hub",
            &cli,
            &annotations(&[(FORCE_DELETE_ANNOTATION, "yes please")]),
        );
        assert!(!options.force_delete);
    }

    #[test]
    fn test_replication_annotation() {
        let options = RegistryOptions::resolve(
            "edge",
            &CliOptions::default(),
            &annotations(&[(REPLICATION_ANNOTATION, "registry")]),
        );
        assert_eq!(options.replication, Some(ReplicationType::Registry));

        let invalid = RegistryOptions::resolve(
            "edge",
            &CliOptions::default(),
            &annotations(&[(REPLICATION_ANNOTATION, "carrier-pigeon")]),
        );
        assert_eq!(invalid.replication, None);
    }

    #[test]
    fn test_replication_type_parse() {
        assert_eq!("copy-tool".parse::<ReplicationType>().unwrap(), ReplicationType::CopyTool);
        assert_eq!("skopeo".parse::<ReplicationType>().unwrap(), ReplicationType::CopyTool);
        assert!("ftp".parse::<ReplicationType>().is_err());
    }
}
