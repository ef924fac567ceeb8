//! Apply command: reconciles the fleet and writes replication jobs.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use regfleet_reconciler::{
    plan_fleet_replication, sync_replication_jobs, ExecutorConfig, FleetReconciler, SecretFormat,
    SideEffectContext,
};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{info, warn};

use super::replication::{print_job_results, JobArgs};
use super::{print_report, FleetArgs, TargetArgs};

/// Serialization of persisted credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum CredentialFormat {
    /// YAML secret manifests
    #[default]
    Yaml,
    /// JSON secret manifests
    Json,
}

impl From<CredentialFormat> for SecretFormat {
    fn from(format: CredentialFormat) -> Self {
        match format {
            CredentialFormat::Yaml => Self::Yaml,
            CredentialFormat::Json => Self::Json,
        }
    }
}

/// Arguments for the apply command.
#[derive(Args)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub fleet: FleetArgs,

    /// Directory receiving generated robot credentials
    #[arg(long, env = "REGFLEET_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Serialization of credential files
    #[arg(long, value_enum, default_value_t = CredentialFormat::Yaml)]
    pub credential_format: CredentialFormat,

    /// Maximum number of units reconciled concurrently
    #[arg(long, default_value = "4")]
    pub max_concurrent: usize,

    /// Deadline of the whole run in seconds
    #[arg(long, default_value = "300")]
    pub deadline_secs: u64,

    #[command(flatten)]
    pub target: TargetArgs,

    #[command(flatten)]
    pub jobs: JobArgs,
}

/// Execute the apply command.
pub async fn execute(args: ApplyArgs) -> Result<()> {
    let fleet = args.fleet.load()?;
    let providers = args.fleet.connect(&fleet.registries)?;

    let deadline = Duration::from_secs(args.deadline_secs);
    let run_deadline = Instant::now() + deadline;
    let config = ExecutorConfig::builder()
        .max_concurrent(args.max_concurrent)
        .deadline(deadline)
        .build();
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let mut reconciler = FleetReconciler::new(providers.clone(), config)
        .context("Invalid executor configuration")?
        .with_cancellation(cancel_rx.clone());
    if let Some(dir) = &args.output_dir {
        let context = SideEffectContext::new(dir, args.credential_format.into())
            .with_context(|| format!("Failed to prepare output directory {}", dir.display()))?;
        reconciler = reconciler.with_side_effects(context);
    }

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, letting in-flight actions finish");
            // Receiver gone means the run already ended.
            let _ = cancel_tx.send(true);
        }
    });

    let report = reconciler.reconcile(&fleet.config.projects).await;
    print_report(&report, args.fleet.output)?;

    let mut failed_jobs = 0;
    if let Some(manipulator) = args.target.manipulator().await? {
        let topology = args.jobs.topology();
        let rules = plan_fleet_replication(&fleet.registries, &fleet.config.projects, &topology)
            .context("Failed to plan replication")?;
        let job_config = args.jobs.job_config(args.target.namespace.as_deref());
        let sync = sync_replication_jobs(&rules, &providers, manipulator.as_ref(), &job_config);
        match within_run(sync, run_deadline, cancel_rx).await {
            Some(results) => {
                failed_jobs = results.iter().filter(|r| r.is_failed()).count();
                print_job_results(&results);
            }
            None => {
                warn!(rules = rules.len(), "run ended before replication jobs were synced");
                anyhow::bail!("replication jobs not synced: run cancelled or deadline exceeded");
            }
        }
    } else {
        info!("no manifest directory or cluster selected, replication jobs not written");
    }

    if !report.is_fully_successful() || failed_jobs > 0 {
        anyhow::bail!(
            "reconciliation incomplete: {} units failed, {} not reconciled, {} replication jobs failed",
            report.failed(),
            report.not_reconciled(),
            failed_jobs
        );
    }
    Ok(())
}

/// Runs `work` unless the run is cancelled or `deadline` passes first.
///
/// Returns `None` when `work` was abandoned.
async fn within_run<F: Future>(
    work: F,
    deadline: Instant,
    mut cancel_rx: watch::Receiver<bool>,
) -> Option<F::Output> {
    if *cancel_rx.borrow() {
        return None;
    }
    tokio::select! {
        output = work => Some(output),
        () = tokio::time::sleep_until(deadline) => None,
        Ok(_) = cancel_rx.wait_for(|cancelled| *cancelled) => None,
    }
}
