//! JFrog Artifactory adapter.
//!
//! Projects are top-level folders of a docker repository. Each project is
//! paired with a permission target named `{repository}_{project}` whose user
//! principals are the project members.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use regfleet_core::options::DOCKER_REPOSITORY_ANNOTATION;
use regfleet_core::{
    Credentials, Error, Member, MemberType, Project, Registry, Repository, Result,
};

use crate::config::ClientConfig;
use crate::http::HttpClient;
use crate::provider::{MemberManager, ProjectCreator, RegistryProvider};

const ARTIFACTORY_PATH: &str = "/artifactory";
const STORAGE_PATH: &str = "/artifactory/api/storage";
const PERMISSION_PATH: &str = "/artifactory/api/security/permissions";

/// Docker repository key used when the registry has no annotation.
pub const DEFAULT_DOCKER_REPOSITORY: &str = "docker";

/// Member roles and the permission actions they grant.
const ROLES: [(&str, &[&str]); 4] = [
    ("Viewer", &["r"]),
    ("Developer", &["r", "w", "n"]),
    ("Maintainer", &["r", "w", "n", "d"]),
    ("Admin", &["m", "r", "w", "n", "d"]),
];

#[derive(Debug, Default, Deserialize)]
struct FolderInfo {
    #[serde(default)]
    children: Vec<ChildItem>,
}

#[derive(Debug, Deserialize)]
struct ChildItem {
    uri: String,
    #[serde(default)]
    folder: bool,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
struct PermissionTarget {
    name: String,
    #[serde(default)]
    includes_pattern: String,
    #[serde(default)]
    repositories: Vec<String>,
    #[serde(default)]
    principals: Principals,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct Principals {
    #[serde(default)]
    users: BTreeMap<String, Vec<String>>,
}

/// Artifactory registry provider.
#[derive(Debug)]
pub struct ArtifactoryProvider {
    registry: Registry,
    client: HttpClient,
    docker_repository: String,
}

impl ArtifactoryProvider {
    /// Creates a provider for an Artifactory registry.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the endpoint is invalid.
    pub fn new(registry: Registry, config: &ClientConfig) -> Result<Self> {
        let client = HttpClient::new(&registry, config)?;
        let docker_repository = registry
            .annotation(DOCKER_REPOSITORY_ANNOTATION)
            .unwrap_or(DEFAULT_DOCKER_REPOSITORY)
            .to_string();
        Ok(Self {
            registry,
            client,
            docker_repository,
        })
    }

    /// Returns the docker repository key.
    pub fn docker_repository(&self) -> &str {
        &self.docker_repository
    }

    fn permission_name(&self, project: &str) -> String {
        format!("{}_{project}", self.docker_repository)
    }

    async fn list_folders(&self, project: Option<&str>) -> Result<Vec<String>> {
        let mut path = format!("{STORAGE_PATH}/{}", self.docker_repository);
        if let Some(project) = project {
            path.push('/');
            path.push_str(project);
        }
        let info: FolderInfo = self.client.get_json(&path, &[]).await.map_err(|e| {
            e.into_core("project", project.unwrap_or(self.docker_repository.as_str()))
        })?;
        Ok(info
            .children
            .into_iter()
            .filter(|c| c.folder)
            .map(|c| c.uri.trim_start_matches('/').to_string())
            .collect())
    }

    async fn get_permission(&self, project: &str) -> Result<PermissionTarget> {
        let name = self.permission_name(project);
        let target: Option<PermissionTarget> = self
            .client
            .get_json(&format!("{PERMISSION_PATH}/{name}"), &[])
            .await
            .map_err(|e| e.into_core("permission target", &name))?;
        target.ok_or_else(|| Error::not_found("permission target", name))
    }

    async fn put_permission(&self, target: &PermissionTarget) -> Result<()> {
        self.client
            .put(&format!("{PERMISSION_PATH}/{}", target.name), Some(target))
            .await
            .map_err(|e| e.into_core("permission target", &target.name))
    }
}

fn role_actions(role: &str) -> Result<Vec<String>> {
    ROLES
        .iter()
        .find(|(name, _)| *name == role)
        .map(|(_, actions)| actions.iter().map(|a| (*a).to_string()).collect())
        .ok_or_else(|| Error::configuration(format!("unknown Artifactory role '{role}'")))
}

/// Maps a permission action list back to a role name.
///
/// Unknown combinations are reported as the sorted, comma-joined list.
fn role_from_actions(actions: &[String]) -> String {
    let mut sorted: Vec<&str> = actions.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    ROLES
        .iter()
        .find(|(_, granted)| {
            let mut granted = granted.to_vec();
            granted.sort_unstable();
            granted == sorted
        })
        .map_or_else(|| sorted.join(","), |(name, _)| (*name).to_string())
}

fn require_user(member: &Member) -> Result<()> {
    if member.member_type == MemberType::User {
        return Ok(());
    }
    Err(Error::recoverable(format!(
        "Artifactory supports only User members, '{}' is a {}",
        member.name, member.member_type
    )))
}

#[async_trait]
impl RegistryProvider for ArtifactoryProvider {
    fn registry(&self) -> &Registry {
        &self.registry
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        let folders = self.list_folders(None).await?;
        Ok(crate::provider::projects_from_repositories(
            folders.iter().map(String::as_str),
        ))
    }

    async fn list_repositories(&self, project: &Project) -> Result<Vec<Repository>> {
        Ok(self
            .list_folders(Some(&project.name))
            .await?
            .into_iter()
            .map(|folder| Repository::new(&project.name, format!("{}/{folder}", project.name)))
            .collect())
    }

    async fn delete_repository(&self, repository: &Repository) -> Result<()> {
        self.client
            .delete(&format!(
                "{ARTIFACTORY_PATH}/{}/{}",
                self.docker_repository, repository.name
            ))
            .await
            .map_err(|e| e.into_core("repository", &repository.name))
    }

    async fn remove_project(&self, project: &Project) -> Result<()> {
        self.client
            .delete(&format!(
                "{ARTIFACTORY_PATH}/{}/{}",
                self.docker_repository, project.name
            ))
            .await
            .map_err(|e| e.into_core("project", &project.name))?;

        let permission = self.permission_name(&project.name);
        match self
            .client
            .delete(&format!("{PERMISSION_PATH}/{permission}"))
            .await
            .map_err(|e| e.into_core("permission target", &permission))
        {
            Err(e) if e.kind() == regfleet_core::ErrorKind::NotFound => {
                warn!(registry = %self.registry.name(), permission = %permission, "permission target does not exist");
                Err(Error::recoverable(format!(
                    "permission target {permission} does not exist"
                )))
            }
            other => other,
        }
    }

    fn project_creator(&self) -> Option<&dyn ProjectCreator> {
        Some(self)
    }

    fn member_manager(&self) -> Option<&dyn MemberManager> {
        Some(self)
    }
}

#[async_trait]
impl ProjectCreator for ArtifactoryProvider {
    async fn create_project(&self, name: &str) -> Result<Project> {
        self.client
            .put::<()>(
                &format!("{ARTIFACTORY_PATH}/{}/{name}/", self.docker_repository),
                None,
            )
            .await
            .map_err(|e| e.into_core("project", name))?;

        let target = PermissionTarget {
            name: self.permission_name(name),
            includes_pattern: format!("{name}/**"),
            repositories: vec![self.docker_repository.clone()],
            principals: Principals::default(),
        };
        self.put_permission(&target).await?;
        debug!(registry = %self.registry.name(), permission = %target.name, "created permission target");
        Ok(Project::new(name))
    }
}

#[async_trait]
impl MemberManager for ArtifactoryProvider {
    async fn members(&self, project: &Project) -> Result<Vec<Member>> {
        let target = self.get_permission(&project.name).await?;
        Ok(target
            .principals
            .users
            .iter()
            .map(|(user, actions)| Member::user(user, role_from_actions(actions)))
            .collect())
    }

    async fn assign_member(
        &self,
        project: &Project,
        member: &Member,
    ) -> Result<Option<Credentials>> {
        require_user(member)?;
        let actions = role_actions(&member.role)?;
        let mut target = self.get_permission(&project.name).await?;
        target.principals.users.insert(member.name.clone(), actions);
        self.put_permission(&target).await?;
        Ok(None)
    }

    async fn unassign_member(&self, project: &Project, member: &Member) -> Result<()> {
        require_user(member)?;
        let mut target = self.get_permission(&project.name).await?;
        if target.principals.users.remove(&member.name).is_none() {
            return Err(Error::not_found("member", &member.name));
        }
        self.put_permission(&target).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip() {
        for (role, _) in ROLES {
            assert_eq!(role_from_actions(&role_actions(role).unwrap()), role);
        }
    }

    #[test]
    fn test_role_from_unordered_actions() {
        let actions = vec!["w".to_string(), "n".to_string(), "r".to_string()];
        assert_eq!(role_from_actions(&actions), "Developer");
        let odd = vec!["w".to_string(), "r".to_string()];
        assert_eq!(role_from_actions(&odd), "r,w");
    }

    #[test]
    fn test_only_users_supported() {
        assert!(require_user(&Member::user("alice", "Viewer")).is_ok());
        let err = require_user(&Member::robot("ci", "Viewer")).unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_unknown_role() {
        assert!(role_actions("Owner").unwrap_err().is_fatal());
    }
}
