//! arbor is a CLI tool to deploy a plan of contracts and link their authorizations.

mod cli;
mod commands;
mod report;

use anyhow::Result;
use arbor_deploy::ArborConfig;
use clap::Parser;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env before clap reads PRIVATE_KEY and ARBOR_* from the environment.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let config = ArborConfig::load(cli.config.as_deref(), cli.network.as_deref())?;

    match &cli.command {
        Command::Deploy { plan, key, output } => {
            commands::deploy(&config, &plan.plan, key, output.as_deref()).await
        }
        Command::Check { plan } => commands::check(&config, &plan.plan),
        Command::Status { plan, link } => commands::status(&config, &plan.plan, *link).await,
        Command::Grant { plan, link, key } => {
            commands::grant(&config, &plan.plan, *link, key).await
        }
        Command::Revoke { plan, link, key } => {
            commands::revoke(&config, &plan.plan, *link, key).await
        }
    }
}
