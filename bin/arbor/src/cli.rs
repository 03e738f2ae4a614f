use std::path::PathBuf;

use alloy_core::primitives::Address;
use clap::{Args, Parser, Subcommand};
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(name = "arbor")]
#[command(
    author,
    version,
    about = "Deploy a plan of contracts and link their authorizations"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(
        short,
        long,
        env = "ARBOR_VERBOSITY",
        default_value_t = LevelFilter::INFO,
        global = true
    )]
    pub verbosity: LevelFilter,

    /// Path to a configuration file.
    ///
    /// If not provided, ./Arbor.toml is read when it exists.
    #[arg(long, alias = "conf", env = "ARBOR_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// The network to deploy to (blast-mainnet, blast-sepolia, blast-local or
    /// any network of the configuration file).
    #[arg(short, long, env = "ARBOR_NETWORK", global = true)]
    pub network: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Deploy every step of a plan, then link its authorization.
    Deploy {
        #[command(flatten)]
        plan: PlanArgs,

        #[command(flatten)]
        key: KeyArgs,

        /// Write the run report as JSON to this path.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate a plan against the artifacts without contacting the network.
    Check {
        #[command(flatten)]
        plan: PlanArgs,
    },

    /// Query the authorization status of a settable grantor.
    Status {
        #[command(flatten)]
        plan: PlanArgs,

        #[command(flatten)]
        link: LinkArgs,
    },

    /// Authorize a grantee on an already deployed grantor.
    Grant {
        #[command(flatten)]
        plan: PlanArgs,

        #[command(flatten)]
        link: LinkArgs,

        #[command(flatten)]
        key: KeyArgs,
    },

    /// Revoke a settable authorization.
    Revoke {
        #[command(flatten)]
        plan: PlanArgs,

        #[command(flatten)]
        link: LinkArgs,

        #[command(flatten)]
        key: KeyArgs,
    },
}

#[derive(Debug, Clone, Args)]
pub struct PlanArgs {
    /// Path to the deployment plan (TOML).
    #[arg(short, long, env = "ARBOR_PLAN")]
    pub plan: PathBuf,
}

#[derive(Clone, Args)]
pub struct KeyArgs {
    /// Hex-encoded private key of the deployer account.
    #[arg(long, env = "PRIVATE_KEY", hide_env_values = true)]
    pub private_key: String,
}

/// Deployed addresses of the plan's link endpoints.
#[derive(Debug, Clone, Copy, Args)]
pub struct LinkArgs {
    /// Address of the deployed grantor contract.
    #[arg(long)]
    pub grantor: Address,

    /// Address of the deployed grantee contract.
    #[arg(long)]
    pub grantee: Address,
}
