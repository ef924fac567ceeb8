//! Replication command: prints replication rules and writes copy-tool jobs.

use anyhow::{Context, Result};
use clap::Args;
use regfleet_core::{ReplicationRule, TopologyConfig};
use regfleet_reconciler::copy_tool::DEFAULT_IMAGE;
use regfleet_reconciler::{
    plan_fleet_replication, sync_replication_jobs, ActionResult, ActionStatus, JobConfig,
};

use super::{FleetArgs, OutputFormat, TargetArgs};

/// Settings of generated copy-tool jobs.
#[derive(Args, Debug, Clone)]
pub struct JobArgs {
    /// Container image providing the copy tool
    #[arg(long, default_value = DEFAULT_IMAGE)]
    pub image: String,

    /// Trigger of pull rules without a cron or manual declaration
    #[arg(long, default_value = "cron */10 * * * *")]
    pub fallback_pull_trigger: String,
}

impl JobArgs {
    /// Returns the topology settings.
    pub fn topology(&self) -> TopologyConfig {
        TopologyConfig::default().with_fallback_pull_trigger(&self.fallback_pull_trigger)
    }

    /// Returns the job settings.
    pub fn job_config(&self, namespace: Option<&str>) -> JobConfig {
        let config = JobConfig::default().with_image(&self.image);
        match namespace {
            Some(namespace) => config.with_namespace(namespace),
            None => config,
        }
    }
}

/// Arguments for the replication command.
#[derive(Args)]
pub struct ReplicationArgs {
    #[command(flatten)]
    pub fleet: FleetArgs,

    #[command(flatten)]
    pub target: TargetArgs,

    #[command(flatten)]
    pub jobs: JobArgs,
}

/// Execute the replication command.
pub async fn execute(args: ReplicationArgs) -> Result<()> {
    let fleet = args.fleet.load()?;
    let rules = plan_fleet_replication(
        &fleet.registries,
        &fleet.config.projects,
        &args.jobs.topology(),
    )
    .context("Failed to plan replication")?;
    print_rules(&rules, args.fleet.output)?;

    let Some(manipulator) = args.target.manipulator().await? else {
        return Ok(());
    };
    let providers = args.fleet.connect(&fleet.registries)?;
    let job_config = args.jobs.job_config(args.target.namespace.as_deref());
    let results = sync_replication_jobs(&rules, &providers, manipulator.as_ref(), &job_config).await;
    print_job_results(&results);

    let failed = results.iter().filter(|r| r.is_failed()).count();
    if failed > 0 {
        anyhow::bail!("{failed} of {} replication jobs failed", results.len());
    }
    Ok(())
}

fn print_rules(rules: &[ReplicationRule], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(rules).context("Failed to encode rules")?;
            println!("{json}");
        }
        OutputFormat::Text => {
            println!("\n🔁 Replication rules ({}):", rules.len());
            for rule in rules {
                println!(
                    "   {} on {}: {} {} ({}, {})",
                    rule.project,
                    rule.local_registry,
                    rule.direction,
                    rule.remote_registry,
                    rule.trigger,
                    rule.transport
                );
            }
        }
    }
    Ok(())
}

/// Prints the outcome of writing replication jobs.
pub fn print_job_results(results: &[ActionResult]) {
    println!("\n🛠️  Replication jobs:");
    for result in results {
        let (icon, detail) = match &result.status {
            ActionStatus::Succeeded => ("✅", String::new()),
            ActionStatus::Failed(reason) => ("❌", format!(" - {reason}")),
            ActionStatus::Skipped(reason) => ("⏭️", format!(" - {reason}")),
            ActionStatus::Planned | ActionStatus::NotStarted => ("⏸️", String::new()),
        };
        println!("   {icon} {}{detail}", result.description);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job_args() -> JobArgs {
        JobArgs {
            image: "registry.example.com/skopeo:1.16".to_string(),
            fallback_pull_trigger: "cron 0 * * * *".to_string(),
        }
    }

    #[test]
    fn test_job_config_from_args() {
        let config = job_args().job_config(Some("registry-jobs"));
        assert_eq!(config.image, "registry.example.com/skopeo:1.16");
        assert_eq!(config.namespace.as_deref(), Some("registry-jobs"));
        assert_eq!(job_args().job_config(None).namespace, None);
    }

    #[test]
    fn test_topology_from_args() {
        assert_eq!(job_args().topology().fallback_pull_trigger, "cron 0 * * * *");
    }
}
