//! Azure Container Registry adapter.
//!
//! ACR exposes a flat repository catalog. Projects exist only as the distinct
//! first path segments of repository names, so they cannot be created and
//! have no members.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use regfleet_core::{Project, Registry, Repository, Result};

use crate::config::ClientConfig;
use crate::http::HttpClient;
use crate::provider::{project_name_of, projects_from_repositories, RegistryProvider};

const CATALOG_PATH: &str = "/acr/v1/_catalog";

#[derive(Debug, Default, Deserialize)]
struct Catalog {
    #[serde(default)]
    repositories: Vec<String>,
}

/// ACR registry provider.
#[derive(Debug)]
pub struct AcrProvider {
    registry: Registry,
    client: HttpClient,
}

impl AcrProvider {
    /// Creates a provider for an ACR registry.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the endpoint is invalid.
    pub fn new(registry: Registry, config: &ClientConfig) -> Result<Self> {
        let client = HttpClient::new(&registry, config)?;
        Ok(Self { registry, client })
    }

    async fn catalog(&self) -> Result<Vec<String>> {
        let catalog: Catalog = self
            .client
            .get_json(CATALOG_PATH, &[])
            .await
            .map_err(|e| e.into_core("registry", self.registry.name()))?;
        Ok(catalog.repositories)
    }
}

#[async_trait]
impl RegistryProvider for AcrProvider {
    fn registry(&self) -> &Registry {
        &self.registry
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        let repositories = self.catalog().await?;
        Ok(projects_from_repositories(
            repositories.iter().map(String::as_str),
        ))
    }

    async fn list_repositories(&self, project: &Project) -> Result<Vec<Repository>> {
        debug!(registry = %self.registry.name(), project = %project.name, "listing project repositories");
        Ok(self
            .catalog()
            .await?
            .into_iter()
            .filter(|name| project_name_of(name) == project.name)
            .map(|name| Repository::new(&project.name, name))
            .collect())
    }

    async fn delete_repository(&self, repository: &Repository) -> Result<()> {
        debug!(registry = %self.registry.name(), repository = %repository.name, "deleting ACR repository");
        self.client
            .delete(&format!("/acr/v1/{}", repository.name))
            .await
            .map_err(|e| e.into_core("repository", &repository.name))
    }

    async fn remove_project(&self, project: &Project) -> Result<()> {
        // Nothing to remove once the repositories are gone.
        debug!(registry = %self.registry.name(), project = %project.name, "project vanished with its repositories");
        Ok(())
    }
}
