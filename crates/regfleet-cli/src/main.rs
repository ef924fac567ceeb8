//! Regfleet CLI - reconciles a fleet of container registries.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "regfleet=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Plan(args) => commands::plan::execute(args).await,
        Commands::Apply(args) => commands::apply::execute(args).await,
        Commands::Replication(args) => commands::replication::execute(args).await,
        Commands::Version => {
            println!("regfleet {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
