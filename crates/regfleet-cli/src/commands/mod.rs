//! CLI commands and argument parsing.

pub mod apply;
pub mod plan;
pub mod replication;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use regfleet_core::{CliOptions, FleetConfig, Registry};
use regfleet_reconciler::{
    ActionStatus, KubeResourceManipulator, ManifestDirectory, ReconcileReport,
    ResourceManipulator, UnitStatus,
};
use regfleet_registry::{ClientConfig, RegistryProvider};

/// Regfleet - container registry fleet reconciler
#[derive(Parser)]
#[command(name = "regfleet")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Show the actions a reconciliation would perform
    Plan(plan::PlanArgs),

    /// Reconcile projects and members on every registry
    Apply(apply::ApplyArgs),

    /// Compute replication rules and write copy-tool jobs
    Replication(replication::ReplicationArgs),

    /// Print version information
    Version,
}

/// Output format of command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human readable summary
    #[default]
    Text,
    /// Pretty-printed JSON
    Json,
}

/// Arguments shared by every command reading the fleet snapshot.
#[derive(Args, Debug, Clone)]
pub struct FleetArgs {
    /// Fleet snapshot listing registries and expected projects
    #[arg(short, long, env = "REGFLEET_CONFIG")]
    pub config: PathBuf,

    /// Delete projects together with their repositories unless a registry
    /// annotation says otherwise
    #[arg(long)]
    pub force_delete: bool,

    /// Timeout of each registry API call in seconds
    #[arg(long, default_value = "30")]
    pub timeout_secs: u64,

    /// Output format: text, json
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,
}

/// A loaded fleet.
pub struct Fleet {
    /// The parsed snapshot.
    pub config: FleetConfig,
    /// Registries with merged options.
    pub registries: Vec<Registry>,
}

impl FleetArgs {
    /// Loads and validates the fleet snapshot.
    pub fn load(&self) -> Result<Fleet> {
        let config = FleetConfig::from_file(&self.config)
            .with_context(|| format!("Failed to load fleet snapshot {}", self.config.display()))?;
        let cli = CliOptions::default().with_force_delete(self.force_delete);
        let registries = config
            .registries(&cli)
            .context("Invalid registry topology")?;
        Ok(Fleet { config, registries })
    }

    /// Connects to every registry of the fleet.
    pub fn connect(&self, registries: &[Registry]) -> Result<Vec<Arc<dyn RegistryProvider>>> {
        let client = ClientConfig::new().with_timeout(Duration::from_secs(self.timeout_secs));
        registries
            .iter()
            .map(|registry| {
                regfleet_registry::connect(registry.clone(), &client)
                    .with_context(|| format!("Failed to connect to registry {}", registry.name()))
            })
            .collect()
    }
}

/// Where generated cluster objects are written.
#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    /// Write generated objects as YAML files into this directory
    #[arg(long, conflicts_with = "kube")]
    pub manifest_dir: Option<PathBuf>,

    /// Apply generated objects to the current Kubernetes context
    #[arg(long)]
    pub kube: bool,

    /// Namespace of generated objects
    #[arg(long)]
    pub namespace: Option<String>,
}

impl TargetArgs {
    /// Builds the selected manipulator, if any.
    pub async fn manipulator(&self) -> Result<Option<Box<dyn ResourceManipulator>>> {
        if let Some(dir) = &self.manifest_dir {
            let manifests = ManifestDirectory::new(dir)
                .with_context(|| format!("Failed to open manifest directory {}", dir.display()))?;
            return Ok(Some(Box::new(manifests)));
        }
        if self.kube {
            let client = kube::Client::try_default()
                .await
                .context("Failed to create Kubernetes client")?;
            let mut manipulator = KubeResourceManipulator::new(client);
            if let Some(namespace) = &self.namespace {
                manipulator = manipulator.with_namespace(namespace);
            }
            return Ok(Some(Box::new(manipulator)));
        }
        Ok(None)
    }
}

/// Prints a reconciliation report.
pub fn print_report(report: &ReconcileReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(report).context("Failed to encode report")?;
            println!("{json}");
        }
        OutputFormat::Text => print_report_text(report),
    }
    Ok(())
}

fn print_report_text(report: &ReconcileReport) {
    let mode = if report.dry_run { "Plan" } else { "Reconciliation" };
    println!("\n📊 {mode} {}:", report.run_id);
    for unit in &report.units {
        let (icon, detail) = match &unit.status {
            UnitStatus::Reconciled => ("✅", String::new()),
            UnitStatus::Failed(reason) => ("❌", format!(" - {reason}")),
            UnitStatus::Skipped(reason) => ("⏭️", format!(" - {reason}")),
            UnitStatus::NotReconciled(reason) => ("⏸️", format!(" - {reason}")),
        };
        println!("   {icon} {}{detail}", unit.label());
        for action in &unit.actions {
            let status = match &action.status {
                ActionStatus::Planned => "planned".to_string(),
                ActionStatus::Succeeded => "done".to_string(),
                ActionStatus::Failed(reason) => format!("failed: {reason}"),
                ActionStatus::Skipped(reason) => format!("skipped: {reason}"),
                ActionStatus::NotStarted => "not started".to_string(),
            };
            println!("      - {} ({status})", action.description);
        }
    }
    println!(
        "\n   Reconciled: {}  Failed: {}  Skipped: {}  Not reconciled: {}",
        report.succeeded(),
        report.failed(),
        report.skipped(),
        report.not_reconciled()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SNAPSHOT: &str = r"
registries:
  - name: hub
    provider: harbor
    apiEndpoint: https://hub.example.com
    username: admin
    password: secret
    role: GlobalHub
  - name: edge
    provider: acr
    apiEndpoint: https://edge.example.com
    username: admin
    password: secret
projects:
  - name: os-images
";

    #[test]
    fn test_parse_apply_flags() {
        let cli = Cli::try_parse_from([
            "regfleet",
            "apply",
            "--config",
            "fleet.yaml",
            "--force-delete",
            "--max-concurrent",
            "2",
            "--manifest-dir",
            "out",
        ])
        .unwrap();
        let Commands::Apply(args) = cli.command else {
            panic!("expected apply");
        };
        assert!(args.fleet.force_delete);
        assert_eq!(args.max_concurrent, 2);
        assert_eq!(args.target.manifest_dir, Some(PathBuf::from("out")));
    }

    #[test]
    fn test_manifest_dir_conflicts_with_kube() {
        let result = Cli::try_parse_from([
            "regfleet",
            "replication",
            "--config",
            "fleet.yaml",
            "--manifest-dir",
            "out",
            "--kube",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_load_fleet() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SNAPSHOT.as_bytes()).unwrap();
        let args = FleetArgs {
            config: file.path().to_path_buf(),
            force_delete: true,
            timeout_secs: 5,
            output: OutputFormat::Text,
        };
        let fleet = args.load().unwrap();
        assert_eq!(fleet.registries.len(), 2);
        assert!(fleet.registries.iter().all(|r| r.options().force_delete));
        assert_eq!(fleet.config.projects.len(), 1);
        assert_eq!(args.connect(&fleet.registries).unwrap().len(), 2);
    }

    #[test]
    fn test_load_missing_snapshot_fails() {
        let args = FleetArgs {
            config: PathBuf::from("/nonexistent/fleet.yaml"),
            force_delete: false,
            timeout_secs: 5,
            output: OutputFormat::Json,
        };
        assert!(args.load().is_err());
    }
}
