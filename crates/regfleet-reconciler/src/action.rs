//! Reconciliation actions and how they are performed against a backend.

use serde::Serialize;
use tracing::debug;

use regfleet_core::{Error, Member, MemberType, Project, Result};
use regfleet_registry::{create_project, delete_project, member_manager, RegistryProvider};

use crate::diff::{diff, Change};
use crate::side_effect::{CredentialKey, SideEffect};

/// A change to the membership of one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum MemberAction {
    /// Bind a member to the project.
    Add {
        /// Project name.
        project: String,
        /// Member to bind.
        member: Member,
    },
    /// Unbind a member from the project.
    Remove {
        /// Project name.
        project: String,
        /// Member to unbind.
        member: Member,
    },
}

impl MemberAction {
    /// Returns the project name.
    pub fn project(&self) -> &str {
        match self {
            Self::Add { project, .. } | Self::Remove { project, .. } => project,
        }
    }

    /// Returns the member.
    pub const fn member(&self) -> &Member {
        match self {
            Self::Add { member, .. } | Self::Remove { member, .. } => member,
        }
    }

    /// Returns true for a removal.
    pub const fn is_remove(&self) -> bool {
        matches!(self, Self::Remove { .. })
    }

    /// Performs the action and returns the side effect it calls for.
    ///
    /// The side effect is returned, not applied.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotImplemented`] if the backend has no member model,
    /// [`Error::Recoverable`] if the project vanished, or the backend error.
    pub async fn perform(&self, provider: &dyn RegistryProvider) -> Result<SideEffect> {
        let manager = member_manager(provider)?;
        let project = resolve_project(provider, self.project()).await?;
        let registry = provider.registry();

        match self {
            Self::Add { member, .. } => {
                let generated = manager.assign_member(&project, member).await?;
                Ok(generated.map_or(SideEffect::None, |credentials| {
                    SideEffect::PersistCredentials {
                        key: CredentialKey::new(registry.name(), &project.name, &member.name),
                        endpoint: registry.api_endpoint().to_string(),
                        credentials,
                    }
                }))
            }
            Self::Remove { member, .. } => {
                manager.unassign_member(&project, member).await?;
                if member.member_type == MemberType::Robot {
                    Ok(SideEffect::RemoveCredentials {
                        key: CredentialKey::new(registry.name(), &project.name, &member.name),
                    })
                } else {
                    Ok(SideEffect::None)
                }
            }
        }
    }
}

impl std::fmt::Display for MemberAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Add { project, member } => write!(f, "adding member {member} to {project}"),
            Self::Remove { project, member } => {
                write!(f, "removing member {member} from {project}")
            }
        }
    }
}

/// A project-level change on one registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "project", rename_all = "snake_case")]
pub enum ProjectAction {
    /// Create the project.
    Add(String),
    /// Delete the project, honoring force delete.
    Remove(String),
}

impl ProjectAction {
    /// Returns the project name.
    pub fn project(&self) -> &str {
        match self {
            Self::Add(name) | Self::Remove(name) => name,
        }
    }

    /// Performs the action.
    ///
    /// Removing a project that is already gone succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotImplemented`] if the backend cannot create
    /// projects, [`Error::Recoverable`] if repositories block a deletion, or
    /// the backend error.
    pub async fn perform(&self, provider: &dyn RegistryProvider) -> Result<()> {
        match self {
            Self::Add(name) => create_project(provider, name).await.map(drop),
            Self::Remove(name) => match provider.get_project_by_name(name).await {
                Ok(project) => delete_project(provider, &project).await,
                Err(Error::NotFound { .. }) => {
                    debug!(registry = %provider.registry().name(), project = %name, "project already gone");
                    Ok(())
                }
                Err(e) => Err(e),
            },
        }
    }
}

impl std::fmt::Display for ProjectAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Add(name) => write!(f, "creating project {name}"),
            Self::Remove(name) => write!(f, "deleting project {name}"),
        }
    }
}

/// Resolves a project by name for a member action.
///
/// A missing project means it was deleted concurrently, which is recoverable
/// by a fresh run.
async fn resolve_project(provider: &dyn RegistryProvider, name: &str) -> Result<Project> {
    provider
        .get_project_by_name(name)
        .await
        .map_err(|e| match e {
            Error::NotFound { .. } => Error::recoverable(format!(
                "project '{name}' not found on {}, reconcile again",
                provider.registry().name()
            )),
            other => other,
        })
}

/// Computes the member actions that turn `actual` into `expected`.
pub fn member_actions(project: &str, actual: &[Member], expected: &[Member]) -> Vec<MemberAction> {
    diff(actual, expected)
        .into_iter()
        .map(|change| match change {
            Change::Remove(member) => MemberAction::Remove {
                project: project.to_string(),
                member,
            },
            Change::Add(member) => MemberAction::Add {
                project: project.to_string(),
                member,
            },
        })
        .collect()
}

/// Computes the project actions that turn `actual` into `expected`.
pub fn project_actions(actual: &[String], expected: &[String]) -> Vec<ProjectAction> {
    diff(actual, expected)
        .into_iter()
        .map(|change| match change {
            Change::Remove(name) => ProjectAction::Remove(name),
            Change::Add(name) => ProjectAction::Add(name),
        })
        .collect()
}
