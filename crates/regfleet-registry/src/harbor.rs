//! Harbor adapter.
//!
//! Harbor has native projects, a member model for users and groups, and
//! project robot accounts whose secrets are generated on creation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use regfleet_core::{
    Credentials, Error, Member, MemberType, Project, Registry, Repository, Result,
};

use crate::config::ClientConfig;
use crate::http::HttpClient;
use crate::provider::{MemberManager, ProjectCreator, RegistryProvider};

const API: &str = "/api/v2.0";

/// Prefix Harbor puts in front of robot account names.
pub const ROBOT_PREFIX: &str = "robot$";

/// Project roles and their Harbor role identifiers.
const ROLES: [(&str, u32); 5] = [
    ("ProjectAdmin", 1),
    ("Developer", 2),
    ("Guest", 3),
    ("Maintainer", 4),
    ("LimitedGuest", 5),
];

#[derive(Debug, Deserialize)]
struct HarborProject {
    project_id: u64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct HarborRepository {
    name: String,
}

#[derive(Debug, Deserialize)]
struct HarborMember {
    id: u64,
    entity_name: String,
    entity_type: String,
    role_id: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct RobotAccess {
    resource: String,
    action: String,
}

#[derive(Debug, Deserialize)]
struct HarborRobot {
    id: u64,
    name: String,
    #[serde(default)]
    access: Vec<RobotAccess>,
}

#[derive(Debug, Default, Deserialize)]
struct CreatedRobot {
    #[serde(default)]
    name: String,
    #[serde(default, alias = "token")]
    secret: String,
}

/// Harbor registry provider.
#[derive(Debug)]
pub struct HarborProvider {
    registry: Registry,
    client: HttpClient,
    page_size: usize,
}

impl HarborProvider {
    /// Creates a provider for a Harbor registry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the endpoint is invalid.
    pub fn new(registry: Registry, config: &ClientConfig) -> Result<Self> {
        let client = HttpClient::new(&registry, config)?;
        Ok(Self {
            registry,
            client,
            page_size: config.page_size,
        })
    }

    async fn paginated<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        entity: &'static str,
        name: &str,
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut page = 1usize;
        loop {
            let query = [
                ("page", page.to_string()),
                ("page_size", self.page_size.to_string()),
            ];
            let batch: Vec<T> = self
                .client
                .get_json(path, &query)
                .await
                .map_err(|e| e.into_core(entity, name))?;
            let done = batch.len() < self.page_size;
            items.extend(batch);
            if done {
                break;
            }
            page += 1;
        }
        Ok(items)
    }

    async fn list_user_members(&self, project: &Project) -> Result<Vec<HarborMember>> {
        self.paginated(
            &format!("{API}/projects/{}/members", project.name),
            "project",
            &project.name,
        )
        .await
    }

    async fn list_robots(&self, project: &Project) -> Result<Vec<HarborRobot>> {
        self.paginated(
            &format!("{API}/projects/{}/robots", project.name),
            "project",
            &project.name,
        )
        .await
    }
}

/// Maps a role name to the Harbor role identifier.
fn role_id(role: &str) -> Result<u32> {
    ROLES
        .iter()
        .find(|(name, _)| *name == role)
        .map(|(_, id)| *id)
        .ok_or_else(|| Error::configuration(format!("unknown Harbor project role '{role}'")))
}

fn role_name(id: u32) -> String {
    ROLES
        .iter()
        .find(|(_, role)| *role == id)
        .map_or_else(|| format!("role-{id}"), |(name, _)| (*name).to_string())
}

/// Maps a robot role to the repository actions it grants.
fn robot_actions(role: &str) -> Result<&'static [&'static str]> {
    let actions: &'static [&'static str] = match role {
        "PullOnly" => &["pull"],
        "PushOnly" => &["push"],
        "PullAndPush" => &["pull", "push"],
        other => {
            return Err(Error::configuration(format!(
                "unknown Harbor robot role '{other}'"
            )))
        }
    };
    Ok(actions)
}

fn robot_role(access: &[RobotAccess]) -> String {
    let pull = access.iter().any(|a| a.action == "pull");
    let push = access.iter().any(|a| a.action == "push");
    match (pull, push) {
        (true, true) => "PullAndPush",
        (false, true) => "PushOnly",
        _ => "PullOnly",
    }
    .to_string()
}

/// Strips `robot$` and the `<project>+` scope Harbor 2.2+ adds to project robots.
fn robot_member_name<'a>(name: &'a str, project: &str) -> &'a str {
    let name = name.strip_prefix(ROBOT_PREFIX).unwrap_or(name);
    name.strip_prefix(project)
        .and_then(|rest| rest.strip_prefix('+'))
        .unwrap_or(name)
}

#[async_trait]
impl RegistryProvider for HarborProvider {
    fn registry(&self) -> &Registry {
        &self.registry
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        let projects: Vec<HarborProject> = self
            .paginated(&format!("{API}/projects"), "registry", self.registry.name())
            .await?;
        Ok(projects
            .into_iter()
            .map(|p| Project::new(p.name).with_id(p.project_id.to_string()))
            .collect())
    }

    async fn get_project_by_name(&self, name: &str) -> Result<Project> {
        let project: Option<HarborProject> = self
            .client
            .get_json(&format!("{API}/projects/{name}"), &[])
            .await
            .map_err(|e| e.into_core("project", name))?;
        project
            .map(|p| Project::new(p.name).with_id(p.project_id.to_string()))
            .ok_or_else(|| Error::not_found("project", name))
    }

    async fn list_repositories(&self, project: &Project) -> Result<Vec<Repository>> {
        let repositories: Vec<HarborRepository> = self
            .paginated(
                &format!("{API}/projects/{}/repositories", project.name),
                "project",
                &project.name,
            )
            .await?;
        Ok(repositories
            .into_iter()
            .map(|r| Repository::new(&project.name, r.name))
            .collect())
    }

    async fn delete_repository(&self, repository: &Repository) -> Result<()> {
        let prefix = format!("{}/", repository.project);
        let short = repository
            .name
            .strip_prefix(&prefix)
            .unwrap_or(&repository.name);
        // Harbor expects slashes inside the repository name double-encoded.
        let encoded = short.replace('/', "%252F");
        self.client
            .delete(&format!(
                "{API}/projects/{}/repositories/{encoded}",
                repository.project
            ))
            .await
            .map_err(|e| e.into_core("repository", &repository.name))
    }

    async fn remove_project(&self, project: &Project) -> Result<()> {
        self.client
            .delete(&format!("{API}/projects/{}", project.name))
            .await
            .map_err(|e| e.into_core("project", &project.name))
    }

    fn project_creator(&self) -> Option<&dyn ProjectCreator> {
        Some(self)
    }

    fn member_manager(&self) -> Option<&dyn MemberManager> {
        Some(self)
    }
}

#[async_trait]
impl ProjectCreator for HarborProvider {
    async fn create_project(&self, name: &str) -> Result<Project> {
        let body = json!({
            "project_name": name,
            "metadata": { "public": "false" },
        });
        self.client
            .send(reqwest::Method::POST, &format!("{API}/projects"), &[], Some(&body))
            .await
            .map_err(|e| e.into_core("project", name))?;
        self.get_project_by_name(name).await
    }
}

#[async_trait]
impl MemberManager for HarborProvider {
    async fn members(&self, project: &Project) -> Result<Vec<Member>> {
        let mut members: Vec<Member> = self
            .list_user_members(project)
            .await?
            .into_iter()
            .filter_map(|m| {
                let member_type = match m.entity_type.as_str() {
                    "u" => MemberType::User,
                    "g" => MemberType::Group,
                    other => {
                        debug!(entity_type = other, member = %m.entity_name, "skipping member");
                        return None;
                    }
                };
                Some(Member::new(m.entity_name, member_type, role_name(m.role_id)))
            })
            .collect();

        members.extend(self.list_robots(project).await?.into_iter().map(|r| {
            Member::robot(robot_member_name(&r.name, &project.name), robot_role(&r.access))
        }));
        members.sort();
        Ok(members)
    }

    async fn assign_member(
        &self,
        project: &Project,
        member: &Member,
    ) -> Result<Option<Credentials>> {
        match member.member_type {
            MemberType::User | MemberType::Group => {
                let role_id = role_id(&member.role)?;
                let body = if member.member_type == MemberType::User {
                    json!({ "role_id": role_id, "member_user": { "username": member.name } })
                } else {
                    json!({ "role_id": role_id, "member_group": { "group_name": member.name } })
                };
                self.client
                    .send(
                        reqwest::Method::POST,
                        &format!("{API}/projects/{}/members", project.name),
                        &[],
                        Some(&body),
                    )
                    .await
                    .map_err(|e| e.into_core("project", &project.name))?;
                Ok(None)
            }
            MemberType::Robot => {
                let resource = format!(
                    "/project/{}/repository",
                    project.id.as_deref().unwrap_or(&project.name)
                );
                let access: Vec<RobotAccess> = robot_actions(&member.role)?
                    .iter()
                    .map(|action| RobotAccess {
                        resource: resource.clone(),
                        action: (*action).to_string(),
                    })
                    .collect();
                let body = json!({
                    "name": member.name,
                    "description": format!("managed by regfleet ({})", member.role),
                    "access": access,
                });
                let created: CreatedRobot = self
                    .client
                    .post_json(&format!("{API}/projects/{}/robots", project.name), &body)
                    .await
                    .map_err(|e| e.into_core("project", &project.name))?;
                if created.secret.is_empty() {
                    return Err(Error::recoverable(format!(
                        "Harbor returned no secret for robot '{}'",
                        member.name
                    )));
                }
                let username = if created.name.is_empty() {
                    format!("{ROBOT_PREFIX}{}", member.name)
                } else {
                    created.name
                };
                info!(
                    registry = %self.registry.name(),
                    project = %project.name,
                    robot = %username,
                    "created robot account"
                );
                Ok(Some(Credentials::new(username, created.secret)))
            }
        }
    }

    async fn unassign_member(&self, project: &Project, member: &Member) -> Result<()> {
        let path = match member.member_type {
            MemberType::Robot => {
                let robot = self
                    .list_robots(project)
                    .await?
                    .into_iter()
                    .find(|r| robot_member_name(&r.name, &project.name) == member.name)
                    .ok_or_else(|| Error::not_found("robot", &member.name))?;
                format!("{API}/projects/{}/robots/{}", project.name, robot.id)
            }
            MemberType::User | MemberType::Group => {
                let entity_type = if member.member_type == MemberType::User {
                    "u"
                } else {
                    "g"
                };
                let found = self
                    .list_user_members(project)
                    .await?
                    .into_iter()
                    .find(|m| m.entity_name == member.name && m.entity_type == entity_type)
                    .ok_or_else(|| Error::not_found("member", &member.name))?;
                format!("{API}/projects/{}/members/{}", project.name, found.id)
            }
        };
        self.client
            .delete(&path)
            .await
            .map_err(|e| e.into_core("member", &member.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_mapping() {
        assert_eq!(role_id("Developer").unwrap(), 2);
        assert_eq!(role_name(5), "LimitedGuest");
        assert_eq!(role_name(42), "role-42");
        assert!(role_id("Owner").unwrap_err().is_fatal());
    }

    #[test]
    fn test_robot_roles() {
        for role in ["PullOnly", "PushOnly", "PullAndPush"] {
            let access: Vec<RobotAccess> = robot_actions(role)
                .unwrap()
                .iter()
                .map(|a| RobotAccess {
                    resource: "/project/1/repository".to_string(),
                    action: (*a).to_string(),
                })
                .collect();
            assert_eq!(robot_role(&access), role);
        }
        assert!(robot_actions("Everything").is_err());
    }

    #[test]
    fn test_robot_member_name() {
        assert_eq!(robot_member_name("robot$ci", "os-images"), "ci");
        assert_eq!(robot_member_name("ci", "os-images"), "ci");
        assert_eq!(robot_member_name("robot$os-images+ci", "os-images"), "ci");
        assert_eq!(robot_member_name("robot$tools+ci", "os-images"), "tools+ci");
    }
}
