//! Plan command: a dry-run reconciliation.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use regfleet_reconciler::{ExecutorConfig, FleetReconciler};

use super::{print_report, FleetArgs};

/// Arguments for the plan command.
#[derive(Args)]
pub struct PlanArgs {
    #[command(flatten)]
    pub fleet: FleetArgs,

    /// Maximum number of units observed concurrently
    #[arg(long, default_value = "4")]
    pub max_concurrent: usize,

    /// Deadline of the whole run in seconds
    #[arg(long, default_value = "300")]
    pub deadline_secs: u64,
}

/// Execute the plan command.
pub async fn execute(args: PlanArgs) -> Result<()> {
    let fleet = args.fleet.load()?;
    let providers = args.fleet.connect(&fleet.registries)?;

    let config = ExecutorConfig::builder()
        .max_concurrent(args.max_concurrent)
        .deadline(Duration::from_secs(args.deadline_secs))
        .dry_run(true)
        .build();
    let reconciler =
        FleetReconciler::new(providers, config).context("Invalid executor configuration")?;

    let report = reconciler.reconcile(&fleet.config.projects).await;
    print_report(&report, args.fleet.output)?;

    if report.failed() > 0 {
        anyhow::bail!("{} units could not be observed", report.failed());
    }
    Ok(())
}
