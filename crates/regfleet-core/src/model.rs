//! Fleet data model.
//!
//! [`Registry`] values are built once from declarative input and never
//! mutated; a configuration change produces a new value.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::options::{CliOptions, RegistryOptions};

/// Backend vendor of a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Harbor (native projects, members and robot accounts).
    Harbor,
    /// Azure Container Registry (flat repository catalog).
    Acr,
    /// JFrog Artifactory (folders and permission targets).
    Artifactory,
}

impl ProviderKind {
    /// Returns a string representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Harbor => "harbor",
            Self::Acr => "acr",
            Self::Artifactory => "artifactory",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position of a registry in the hub/spoke topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RegistryRole {
    /// The canonical hub every other registry replicates with.
    GlobalHub,
    /// A leaf registry.
    #[default]
    Local,
}

/// Username/password pair.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Username.
    pub username: String,
    /// Password or token.
    pub password: String,
}

impl Credentials {
    /// Creates a credential pair.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Declarative description of a registry, as found in a fleet snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySpec {
    /// Unique registry name.
    pub name: String,
    /// Backend vendor.
    pub provider: ProviderKind,
    /// API endpoint URL.
    pub api_endpoint: String,
    /// Username used for API calls.
    pub username: String,
    /// Password used for API calls.
    pub password: String,
    /// Topology role.
    #[serde(default)]
    pub role: RegistryRole,
    /// Free-form annotations carrying per-registry option overrides.
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

/// A named, addressable registry endpoint with merged options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registry {
    name: String,
    api_endpoint: String,
    credentials: Credentials,
    provider: ProviderKind,
    role: RegistryRole,
    options: RegistryOptions,
    annotations: BTreeMap<String, String>,
}

impl Registry {
    /// Builds a registry from its declarative form, merging CLI defaults with
    /// annotation overrides.
    pub fn from_spec(spec: RegistrySpec, cli: &CliOptions) -> Self {
        let options = RegistryOptions::resolve(&spec.name, cli, &spec.annotations);
        Self {
            name: spec.name,
            api_endpoint: spec.api_endpoint.trim_end_matches('/').to_string(),
            credentials: Credentials::new(spec.username, spec.password),
            provider: spec.provider,
            role: spec.role,
            options,
            annotations: spec.annotations,
        }
    }

    /// Returns the registry name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the API endpoint without a trailing slash.
    pub fn api_endpoint(&self) -> &str {
        &self.api_endpoint
    }

    /// Returns the host part of the API endpoint, used in image references.
    pub fn host(&self) -> &str {
        let without_scheme = self
            .api_endpoint
            .split_once("://")
            .map_or(self.api_endpoint.as_str(), |(_, rest)| rest);
        without_scheme.split('/').next().unwrap_or(without_scheme)
    }

    /// Returns the API credentials.
    pub const fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Returns the backend vendor.
    pub const fn provider(&self) -> ProviderKind {
        self.provider
    }

    /// Returns the topology role.
    pub const fn role(&self) -> RegistryRole {
        self.role
    }

    /// Returns true if this registry is the global hub.
    pub fn is_global_hub(&self) -> bool {
        self.role == RegistryRole::GlobalHub
    }

    /// Returns the merged options.
    pub const fn options(&self) -> &RegistryOptions {
        &self.options
    }

    /// Returns an annotation value.
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }
}

/// Kind of a project member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MemberType {
    /// Human user account.
    User,
    /// Robot (machine) account; assignment may generate credentials.
    Robot,
    /// Group of users.
    Group,
}

impl MemberType {
    /// Returns a string representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Robot => "Robot",
            Self::Group => "Group",
        }
    }
}

impl std::fmt::Display for MemberType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A member bound to a project. Equality is structural over all fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Member {
    /// Member name.
    pub name: String,
    /// Member type.
    #[serde(rename = "type")]
    pub member_type: MemberType,
    /// Role name, vendor specific.
    pub role: String,
}

impl Member {
    /// Creates a member.
    pub fn new(name: impl Into<String>, member_type: MemberType, role: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            member_type,
            role: role.into(),
        }
    }

    /// Creates a user member.
    pub fn user(name: impl Into<String>, role: impl Into<String>) -> Self {
        Self::new(name, MemberType::User, role)
    }

    /// Creates a robot member.
    pub fn robot(name: impl Into<String>, role: impl Into<String>) -> Self {
        Self::new(name, MemberType::Robot, role)
    }

    /// Creates a group member.
    pub fn group(name: impl Into<String>, role: impl Into<String>) -> Self {
        Self::new(name, MemberType::Group, role)
    }
}

impl std::fmt::Display for Member {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}, {})", self.name, self.member_type, self.role)
    }
}

/// Scope of an expected project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProjectKind {
    /// Present on every registry of the fleet.
    #[default]
    Global,
    /// Present only on the listed registries.
    Local,
}

/// Expected state of a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSpec {
    /// Project name.
    pub name: String,
    /// Project scope.
    #[serde(default)]
    pub kind: ProjectKind,
    /// Registries hosting a local project.
    #[serde(default)]
    pub local_registries: Vec<String>,
    /// Expected members.
    #[serde(default)]
    pub members: Vec<Member>,
    /// Declared replication trigger (`cron <schedule>`, `manual`, ...).
    #[serde(default)]
    pub trigger: Option<String>,
}

impl ProjectSpec {
    /// Creates a global project with no members.
    pub fn global(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ProjectKind::Global,
            local_registries: Vec::new(),
            members: Vec::new(),
            trigger: None,
        }
    }

    /// Adds an expected member.
    #[must_use]
    pub fn with_member(mut self, member: Member) -> Self {
        self.members.push(member);
        self
    }

    /// Sets the declared replication trigger.
    #[must_use]
    pub fn with_trigger(mut self, trigger: impl Into<String>) -> Self {
        self.trigger = Some(trigger.into());
        self
    }

    /// Returns true if the project is expected on the named registry.
    pub fn is_expected_on(&self, registry: &str) -> bool {
        match self.kind {
            ProjectKind::Global => true,
            ProjectKind::Local => self.local_registries.iter().any(|r| r == registry),
        }
    }
}

/// A project observed on a registry backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Project {
    /// Project name.
    pub name: String,
    /// Backend identifier, when the vendor has one.
    pub id: Option<String>,
}

impl Project {
    /// Creates a project without a backend identifier.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
        }
    }

    /// Sets the backend identifier.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// An image repository inside a project.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Repository {
    /// Owning project name.
    pub project: String,
    /// Repository name as the backend reports it.
    pub name: String,
}

impl Repository {
    /// Creates a repository value.
    pub fn new(project: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            name: name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> RegistrySpec {
        RegistrySpec {
            name: "hub".to_string(),
            provider: ProviderKind::Harbor,
            api_endpoint: "https://hub.example.com/".to_string(),
            username: "admin".to_string(),
            password: "secret".to_string(),
            role: RegistryRole::GlobalHub,
            annotations: BTreeMap::new(),
        }
    }

    #[test]
    fn test_registry_from_spec() {
        let reg = Registry::from_spec(spec(), &CliOptions::default());
        assert_eq!(reg.name(), "hub");
        assert_eq!(reg.api_endpoint(), "https://hub.example.com");
        assert_eq!(reg.host(), "hub.example.com");
        assert!(reg.is_global_hub());
        assert_eq!(reg.provider(), ProviderKind::Harbor);
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials::new("robot$ci", "s3cr3t");
        let debug = format!("{creds:?}");
        assert!(debug.contains("robot$ci"));
        assert!(!debug.contains("s3cr3t"));
    }

    #[test]
    fn test_member_structural_equality() {
        let a = Member::user("alice", "Developer");
        let b = Member::user("alice", "Maintainer");
        assert_ne!(a, b);
        assert_eq!(a, Member::user("alice", "Developer"));
        assert_ne!(a, Member::group("alice", "Developer"));
    }

    #[test]
    fn test_member_deserialize_type_field() {
        let member: Member =
            serde_json::from_str(r#"{"name":"ci","type":"Robot","role":"PullOnly"}"#).unwrap();
        assert_eq!(member, Member::robot("ci", "PullOnly"));
    }

    #[test]
    fn test_project_scope() {
        let global = ProjectSpec::global("os-images");
        assert!(global.is_expected_on("anything"));

        let local = ProjectSpec {
            kind: ProjectKind::Local,
            local_registries: vec!["edge-1".to_string()],
            ..ProjectSpec::global("scratch")
        };
        assert!(local.is_expected_on("edge-1"));
        assert!(!local.is_expected_on("edge-2"));
    }
}
