//! Replication planning and copy-tool job synchronization.

use std::sync::Arc;

use tracing::{info, warn};

use regfleet_core::topology::{plan_rule, validate_hubs};
use regfleet_core::{
    Error, ProjectSpec, Registry, ReplicationRule, ReplicationType, Repository, TopologyConfig,
};
use regfleet_registry::RegistryProvider;

use crate::error::{ReconcileError, Result};
use crate::jobs::{build_replication_job, endpoints, JobConfig, ReplicationJob};
use crate::manipulator::ResourceManipulator;
use crate::report::{ActionResult, ActionStatus};

/// Computes the replication rules `local` needs.
///
/// Every project expected on `local` is paired with every other registry
/// that also hosts it. Edges without replication are omitted.
///
/// # Errors
///
/// Returns [`Error::Configuration`] if the fleet declares more than one
/// global hub.
pub fn plan_replication(
    registries: &[Registry],
    projects: &[ProjectSpec],
    local: &Registry,
    config: &TopologyConfig,
) -> regfleet_core::Result<Vec<ReplicationRule>> {
    validate_hubs(registries)?;
    let mut rules = Vec::new();
    for project in projects.iter().filter(|p| p.is_expected_on(local.name())) {
        for remote in registries
            .iter()
            .filter(|r| r.name() != local.name() && project.is_expected_on(r.name()))
        {
            if let Some(rule) = plan_rule(local, remote, project, config)? {
                rules.push(rule);
            }
        }
    }
    Ok(rules)
}

/// Computes the replication rules of every registry in the fleet.
///
/// # Errors
///
/// Returns [`Error::Configuration`] if the fleet declares more than one
/// global hub.
pub fn plan_fleet_replication(
    registries: &[Registry],
    projects: &[ProjectSpec],
    config: &TopologyConfig,
) -> regfleet_core::Result<Vec<ReplicationRule>> {
    let mut rules = Vec::new();
    for local in registries {
        rules.extend(plan_replication(registries, projects, local, config)?);
    }
    Ok(rules)
}

fn describe(rule: &ReplicationRule) -> String {
    format!(
        "{} replication of {} between {} and {} ({}, {})",
        rule.direction,
        rule.project,
        rule.local_registry,
        rule.remote_registry,
        rule.trigger,
        rule.transport
    )
}

/// Writes the copy-tool jobs of `rules` through `manipulator`.
///
/// Rules replicated natively by the registries are skipped, and any copy-tool
/// job left over from an earlier configuration of the same edge is removed.
/// Each rule yields one result; a failing rule does not stop the others.
pub async fn sync_replication_jobs(
    rules: &[ReplicationRule],
    providers: &[Arc<dyn RegistryProvider>],
    manipulator: &dyn ResourceManipulator,
    config: &JobConfig,
) -> Vec<ActionResult> {
    let mut results = Vec::with_capacity(rules.len());
    for rule in rules {
        let description = describe(rule);
        let status = match rule.transport {
            ReplicationType::CopyTool => {
                match write_copy_tool_job(rule, providers, manipulator, config).await {
                    Ok(()) => ActionStatus::Succeeded,
                    Err(e) => {
                        warn!(
                            project = %rule.project,
                            local = %rule.local_registry,
                            remote = %rule.remote_registry,
                            error = %e,
                            "copy-tool job not written"
                        );
                        ActionStatus::Failed(e.to_string())
                    }
                }
            }
            ReplicationType::Registry => {
                match remove_copy_tool_job(rule, manipulator, config).await {
                    Ok(()) => {
                        info!(
                            project = %rule.project,
                            local = %rule.local_registry,
                            remote = %rule.remote_registry,
                            "native replication is configured on the registry"
                        );
                        ActionStatus::Skipped("replicated natively by the registry".to_string())
                    }
                    Err(e) => {
                        warn!(project = %rule.project, error = %e, "stale copy-tool job not removed");
                        ActionStatus::Failed(e.to_string())
                    }
                }
            }
        };
        results.push(ActionResult::new(description, status));
    }
    results
}

fn provider_for<'a>(
    providers: &'a [Arc<dyn RegistryProvider>],
    name: &str,
) -> Result<&'a dyn RegistryProvider> {
    providers
        .iter()
        .find(|p| p.registry().name() == name)
        .map(|provider| provider.as_ref())
        .ok_or_else(|| ReconcileError::UnknownRegistry {
            name: name.to_string(),
        })
}

async fn source_repositories(
    source: &dyn RegistryProvider,
    project: &str,
) -> regfleet_core::Result<Vec<Repository>> {
    let found = match source.get_project_by_name(project).await {
        Ok(found) => found,
        Err(Error::NotFound { .. }) => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    source.list_repositories(&found).await
}

async fn write_copy_tool_job(
    rule: &ReplicationRule,
    providers: &[Arc<dyn RegistryProvider>],
    manipulator: &dyn ResourceManipulator,
    config: &JobConfig,
) -> Result<()> {
    let local = provider_for(providers, &rule.local_registry)?;
    let remote = provider_for(providers, &rule.remote_registry)?;
    let (source, destination) = endpoints(rule, local.registry(), remote.registry());
    let source_provider = if source.name() == local.registry().name() {
        local
    } else {
        remote
    };

    let repositories = source_repositories(source_provider, &rule.project).await?;
    let job = build_replication_job(rule, source, destination, &repositories, config)?;
    write_job(&job, manipulator).await
}

async fn write_job(job: &ReplicationJob, manipulator: &dyn ResourceManipulator) -> Result<()> {
    for resource in job.resources() {
        manipulator
            .write_resource(&resource)
            .await?;
    }
    Ok(())
}

async fn remove_copy_tool_job(
    rule: &ReplicationRule,
    manipulator: &dyn ResourceManipulator,
    config: &JobConfig,
) -> Result<()> {
    for resource in ReplicationJob::identity(rule, config) {
        manipulator
            .remove_resource(&resource)
            .await?;
    }
    Ok(())
}
