//! # Regfleet Registry
//!
//! Registry provider adapters for the regfleet fleet reconciler.
//!
//! Each backend vendor is normalized into the [`RegistryProvider`] contract.
//! Optional capabilities ([`ProjectCreator`], [`MemberManager`]) are probed
//! at call sites, and every transport failure is converted into a
//! [`regfleet_core::Error`] before it leaves this crate.
//!
//! | Vendor | Projects | Members | Replication |
//! |--------|----------|---------|-------------|
//! | Harbor | native, creatable | users, groups, robots | push and pull |
//! | ACR | derived from the catalog | none | none |
//! | Artifactory | folders, creatable | users | pull |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use regfleet_core::{CliOptions, FleetConfig};
//! use regfleet_registry::{connect, ClientConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let fleet = FleetConfig::from_file("fleet.yaml")?;
//! for registry in fleet.registries(&CliOptions::default())? {
//!     let provider = connect(registry, &ClientConfig::default())?;
//!     for project in provider.list_projects().await? {
//!         println!("{}: {}", provider.registry().name(), project.name);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod acr;
pub mod artifactory;
mod config;
mod error;
pub mod harbor;
mod http;
pub mod memory;
mod provider;

use std::sync::Arc;

use regfleet_core::{ProviderKind, Registry, Result};

pub use acr::AcrProvider;
pub use artifactory::ArtifactoryProvider;
pub use config::{ClientConfig, DEFAULT_PAGE_SIZE, DEFAULT_TIMEOUT};
pub use harbor::HarborProvider;
pub use memory::InMemoryRegistry;
pub use provider::{
    create_project, delete_project, member_manager, project_name_of, projects_from_repositories,
    MemberManager, ProjectCreator, RegistryProvider, MEMBER_MANAGEMENT, PROJECT_CREATION,
};

/// Builds the provider matching the registry's vendor.
///
/// # Errors
///
/// Returns a configuration error if the registry endpoint is invalid.
pub fn connect(registry: Registry, config: &ClientConfig) -> Result<Arc<dyn RegistryProvider>> {
    tracing::debug!(
        registry = %registry.name(),
        provider = %registry.provider(),
        endpoint = %registry.api_endpoint(),
        "connecting to registry"
    );
    let provider: Arc<dyn RegistryProvider> = match registry.provider() {
        ProviderKind::Harbor => Arc::new(HarborProvider::new(registry, config)?),
        ProviderKind::Acr => Arc::new(AcrProvider::new(registry, config)?),
        ProviderKind::Artifactory => Arc::new(ArtifactoryProvider::new(registry, config)?),
    };
    Ok(provider)
}
