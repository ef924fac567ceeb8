//! In-memory registry backend.
//!
//! Used to drive the reconciler without a live registry. Capabilities can be
//! switched off individually, members can be made to fail, and every
//! mutation is appended to an operation log so tests can assert ordering.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use regfleet_core::{
    Credentials, Error, Member, MemberType, Project, Registry, Repository, Result,
};

use crate::provider::{MemberManager, ProjectCreator, RegistryProvider};

#[derive(Debug, Default)]
struct ProjectState {
    repositories: Vec<String>,
    members: Vec<Member>,
}

#[derive(Debug, Default)]
struct State {
    projects: BTreeMap<String, ProjectState>,
    operations: Vec<String>,
    robots_created: u64,
}

/// A registry backed by process memory.
#[derive(Debug)]
pub struct InMemoryRegistry {
    registry: Registry,
    state: Mutex<State>,
    can_create: bool,
    has_members: bool,
    failing_members: BTreeSet<String>,
    latency: Option<Duration>,
}

impl InMemoryRegistry {
    /// Creates an empty backend with every capability enabled.
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            state: Mutex::new(State::default()),
            can_create: true,
            has_members: true,
            failing_members: BTreeSet::new(),
            latency: None,
        }
    }

    /// Adds a project owning the given repositories (names relative to the project).
    #[must_use]
    pub fn with_project(self, name: &str, repositories: &[&str]) -> Self {
        self.state.lock().projects.insert(
            name.to_string(),
            ProjectState {
                repositories: repositories
                    .iter()
                    .map(|r| format!("{name}/{r}"))
                    .collect(),
                members: Vec::new(),
            },
        );
        self
    }

    /// Adds a member to an existing project.
    #[must_use]
    pub fn with_member(self, project: &str, member: Member) -> Self {
        if let Some(state) = self.state.lock().projects.get_mut(project) {
            state.members.push(member);
        }
        self
    }

    /// Disables project creation.
    #[must_use]
    pub const fn without_project_creation(mut self) -> Self {
        self.can_create = false;
        self
    }

    /// Disables member management.
    #[must_use]
    pub const fn without_members(mut self) -> Self {
        self.has_members = false;
        self
    }

    /// Makes every assign/unassign of the named member fail.
    #[must_use]
    pub fn with_failing_member(mut self, name: &str) -> Self {
        self.failing_members.insert(name.to_string());
        self
    }

    /// Delays every call by the given duration.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Returns the mutations performed so far, in order.
    pub fn operations(&self) -> Vec<String> {
        self.state.lock().operations.clone()
    }

    /// Returns the project names currently present.
    pub fn project_names(&self) -> Vec<String> {
        self.state.lock().projects.keys().cloned().collect()
    }

    /// Returns the members of a project, or `None` if it does not exist.
    pub fn project_members(&self, project: &str) -> Option<Vec<Member>> {
        self.state
            .lock()
            .projects
            .get(project)
            .map(|p| p.members.clone())
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn check_member(&self, member: &Member) -> Result<()> {
        if self.failing_members.contains(&member.name) {
            return Err(Error::recoverable(format!(
                "backend rejected member '{}'",
                member.name
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl RegistryProvider for InMemoryRegistry {
    fn registry(&self) -> &Registry {
        &self.registry
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        self.simulate_latency().await;
        Ok(self
            .state
            .lock()
            .projects
            .keys()
            .map(Project::new)
            .collect())
    }

    async fn list_repositories(&self, project: &Project) -> Result<Vec<Repository>> {
        self.simulate_latency().await;
        let state = self.state.lock();
        let project_state = state
            .projects
            .get(&project.name)
            .ok_or_else(|| Error::not_found("project", &project.name))?;
        Ok(project_state
            .repositories
            .iter()
            .map(|r| Repository::new(&project.name, r))
            .collect())
    }

    async fn delete_repository(&self, repository: &Repository) -> Result<()> {
        self.simulate_latency().await;
        let mut state = self.state.lock();
        let project = state
            .projects
            .get_mut(&repository.project)
            .ok_or_else(|| Error::not_found("project", &repository.project))?;
        let before = project.repositories.len();
        project.repositories.retain(|r| r != &repository.name);
        if project.repositories.len() == before {
            return Err(Error::not_found("repository", &repository.name));
        }
        state
            .operations
            .push(format!("delete_repository {}", repository.name));
        Ok(())
    }

    async fn remove_project(&self, project: &Project) -> Result<()> {
        self.simulate_latency().await;
        let mut state = self.state.lock();
        if state.projects.remove(&project.name).is_none() {
            return Err(Error::not_found("project", &project.name));
        }
        state
            .operations
            .push(format!("remove_project {}", project.name));
        Ok(())
    }

    fn project_creator(&self) -> Option<&dyn ProjectCreator> {
        self.can_create.then_some(self as &dyn ProjectCreator)
    }

    fn member_manager(&self) -> Option<&dyn MemberManager> {
        self.has_members.then_some(self as &dyn MemberManager)
    }
}

#[async_trait]
impl ProjectCreator for InMemoryRegistry {
    async fn create_project(&self, name: &str) -> Result<Project> {
        self.simulate_latency().await;
        let mut state = self.state.lock();
        if state.projects.contains_key(name) {
            return Err(Error::recoverable(format!("project '{name}' already exists")));
        }
        state
            .projects
            .insert(name.to_string(), ProjectState::default());
        state.operations.push(format!("create_project {name}"));
        Ok(Project::new(name))
    }
}

#[async_trait]
impl MemberManager for InMemoryRegistry {
    async fn members(&self, project: &Project) -> Result<Vec<Member>> {
        self.simulate_latency().await;
        self.project_members(&project.name)
            .ok_or_else(|| Error::not_found("project", &project.name))
    }

    async fn assign_member(
        &self,
        project: &Project,
        member: &Member,
    ) -> Result<Option<Credentials>> {
        self.simulate_latency().await;
        self.check_member(member)?;
        let mut state = self.state.lock();
        let project_state = state
            .projects
            .get_mut(&project.name)
            .ok_or_else(|| Error::not_found("project", &project.name))?;
        project_state.members.push(member.clone());
        state.operations.push(format!(
            "assign_member {} {} {}",
            project.name, member.name, member.role
        ));

        if member.member_type != MemberType::Robot {
            return Ok(None);
        }
        state.robots_created += 1;
        Ok(Some(Credentials::new(
            format!("robot${}+{}", project.name, member.name),
            format!("secret-{}", state.robots_created),
        )))
    }

    async fn unassign_member(&self, project: &Project, member: &Member) -> Result<()> {
        self.simulate_latency().await;
        self.check_member(member)?;
        let mut state = self.state.lock();
        let project_state = state
            .projects
            .get_mut(&project.name)
            .ok_or_else(|| Error::not_found("project", &project.name))?;
        let position = project_state
            .members
            .iter()
            .position(|m| m == member)
            .ok_or_else(|| Error::not_found("member", &member.name))?;
        project_state.members.remove(position);
        state.operations.push(format!(
            "unassign_member {} {} {}",
            project.name, member.name, member.role
        ));
        Ok(())
    }
}
