//! The registry provider contract.
//!
//! Every backend implements [`RegistryProvider`]. Optional capabilities are
//! separate narrow traits that a backend exposes through
//! [`RegistryProvider::project_creator`] and
//! [`RegistryProvider::member_manager`]; callers probe for them instead of
//! calling blindly.

use std::collections::BTreeSet;

use async_trait::async_trait;
use tracing::{debug, info};

use regfleet_core::{Credentials, Error, Member, Project, Registry, Repository, Result};

/// Capability name used in [`Error::NotImplemented`] for project creation.
pub const PROJECT_CREATION: &str = "project creation";

/// Capability name used in [`Error::NotImplemented`] for member management.
pub const MEMBER_MANAGEMENT: &str = "member management";

/// Uniform view of one registry backend.
#[async_trait]
pub trait RegistryProvider: Send + Sync {
    /// Returns the registry this provider talks to.
    fn registry(&self) -> &Registry;

    /// Lists the projects present on the backend.
    async fn list_projects(&self) -> Result<Vec<Project>>;

    /// Finds a project by name.
    ///
    /// The default implementation scans [`list_projects`](Self::list_projects).
    async fn get_project_by_name(&self, name: &str) -> Result<Project> {
        self.list_projects()
            .await?
            .into_iter()
            .find(|p| p.name == name)
            .ok_or_else(|| Error::not_found("project", name))
    }

    /// Lists the repositories owned by a project.
    async fn list_repositories(&self, project: &Project) -> Result<Vec<Repository>>;

    /// Deletes one repository.
    async fn delete_repository(&self, repository: &Repository) -> Result<()>;

    /// Removes a project whose repositories have already been handled.
    ///
    /// Use [`delete_project`] to honor the force-delete option.
    async fn remove_project(&self, project: &Project) -> Result<()>;

    /// Returns the project creation capability, if supported.
    fn project_creator(&self) -> Option<&dyn ProjectCreator> {
        None
    }

    /// Returns the member management capability, if supported.
    fn member_manager(&self) -> Option<&dyn MemberManager> {
        None
    }
}

/// Backends that can create projects.
#[async_trait]
pub trait ProjectCreator: Send + Sync {
    /// Creates a project.
    async fn create_project(&self, name: &str) -> Result<Project>;
}

/// Backends with a project member model.
#[async_trait]
pub trait MemberManager: Send + Sync {
    /// Lists the members of a project.
    async fn members(&self, project: &Project) -> Result<Vec<Member>>;

    /// Binds a member to a project.
    ///
    /// Returns generated credentials when the backend creates them (robot
    /// accounts).
    async fn assign_member(&self, project: &Project, member: &Member)
        -> Result<Option<Credentials>>;

    /// Unbinds a member from a project.
    async fn unassign_member(&self, project: &Project, member: &Member) -> Result<()>;
}

/// Creates a project, or reports the capability gap as [`Error::NotImplemented`].
///
/// # Errors
///
/// Returns [`Error::NotImplemented`] if the backend cannot create projects,
/// or the backend's own error.
pub async fn create_project(provider: &dyn RegistryProvider, name: &str) -> Result<Project> {
    let Some(creator) = provider.project_creator() else {
        return Err(Error::not_implemented(
            provider.registry().provider().as_str(),
            PROJECT_CREATION,
        ));
    };
    let project = creator.create_project(name).await?;
    info!(registry = %provider.registry().name(), project = %name, "created project");
    Ok(project)
}

/// Returns the member management capability or [`Error::NotImplemented`].
///
/// # Errors
///
/// Returns [`Error::NotImplemented`] if the backend has no member model.
pub fn member_manager(provider: &dyn RegistryProvider) -> Result<&dyn MemberManager> {
    provider.member_manager().ok_or_else(|| {
        Error::not_implemented(provider.registry().provider().as_str(), MEMBER_MANAGEMENT)
    })
}

/// Deletes a project, honoring the registry's force-delete option.
///
/// Without force delete, a project owning repositories is left untouched and
/// [`Error::Recoverable`] is returned. With force delete, every repository is
/// deleted first, then the project.
///
/// # Errors
///
/// Returns [`Error::Recoverable`] when repositories block the deletion, or the
/// first backend error encountered.
pub async fn delete_project(provider: &dyn RegistryProvider, project: &Project) -> Result<()> {
    let registry = provider.registry();
    let repositories = provider.list_repositories(project).await?;

    if !repositories.is_empty() && !registry.options().force_delete {
        return Err(Error::recoverable(format!(
            "{}: repositories are present, please delete them before deleting the project",
            project.name
        )));
    }

    for repository in &repositories {
        debug!(
            registry = %registry.name(),
            project = %project.name,
            repository = %repository.name,
            "deleting repository"
        );
        provider.delete_repository(repository).await?;
    }

    provider.remove_project(project).await?;
    info!(
        registry = %registry.name(),
        project = %project.name,
        repositories = repositories.len(),
        "deleted project"
    );
    Ok(())
}

/// Returns the first path segment of a repository name.
pub fn project_name_of(repository: &str) -> &str {
    repository.split('/').next().unwrap_or(repository)
}

/// Derives the project set of a flat repository listing.
///
/// Projects are the distinct first path segments, returned in name order.
pub fn projects_from_repositories<'a>(repositories: impl IntoIterator<Item = &'a str>) -> Vec<Project> {
    repositories
        .into_iter()
        .map(project_name_of)
        .filter(|name| !name.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(Project::new)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_name_of() {
        assert_eq!(project_name_of("os-images/base/alpine"), "os-images");
        assert_eq!(project_name_of("flat"), "flat");
    }

    #[test]
    fn test_projects_from_repositories_is_deterministic() {
        let forward = projects_from_repositories(["b/one", "a/two", "b/three", "a/four"]);
        let backward = projects_from_repositories(["a/four", "b/three", "a/two", "b/one"]);
        assert_eq!(forward, backward);
        let names: Vec<_> = forward.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_projects_from_empty_listing() {
        assert!(projects_from_repositories(std::iter::empty()).is_empty());
        assert!(projects_from_repositories(["/leading-slash"]).is_empty());
    }
}
