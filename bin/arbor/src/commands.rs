use std::path::Path;

use anyhow::{Context, Result};
use arbor_deploy::{
    ArborConfig, ConfirmationWaiter, DeploymentPlan, DirectoryResolver, Linker, Orchestrator,
    RpcLedger, Signer, ValidatedLink, ValidatedPlan, query_status, validate_plan,
};

use crate::{
    cli::{KeyArgs, LinkArgs},
    report::{self, ReportedError, RunReport},
};

fn load_signer(key: &KeyArgs) -> Result<Signer> {
    let signer =
        Signer::from_private_key(&key.private_key).context("Invalid deployer private key")?;
    tracing::info!(deployer = %signer.address(), "Using deployer account");
    Ok(signer)
}

async fn connect(config: &ArborConfig) -> Result<RpcLedger> {
    let network = config.active_network()?;
    RpcLedger::connect(network, &config.retry)
        .await
        .with_context(|| format!("Failed to connect to network `{}`", config.network))
}

/// Load a plan and check it against the configured artifacts.
fn load_plan(config: &ArborConfig, path: &Path) -> Result<ValidatedPlan> {
    let plan = DeploymentPlan::load_from_file(path)?;
    validate_plan(&plan, &DirectoryResolver::new(&config.artifacts))
        .with_context(|| format!("Plan {} is invalid", path.display()))
}

fn load_link(config: &ArborConfig, path: &Path) -> Result<ValidatedLink> {
    load_plan(config, path)?
        .link
        .with_context(|| format!("Plan {} declares no [link]", path.display()))
}

pub fn check(config: &ArborConfig, plan_path: &Path) -> Result<()> {
    let validated = load_plan(config, plan_path)?;

    println!(
        "Plan {} is valid: {} step(s){}",
        plan_path.display(),
        validated.steps.len(),
        validated
            .link
            .as_ref()
            .map(|link| format!(
                ", {} link {} -> {}",
                link.interface.mode_name(),
                link.grantor,
                link.grantee
            ))
            .unwrap_or_default()
    );
    println!("Fingerprint: {}", validated.fingerprint);

    Ok(())
}

pub async fn deploy(
    config: &ArborConfig,
    plan_path: &Path,
    key: &KeyArgs,
    output: Option<&Path>,
) -> Result<()> {
    // Validation comes first: an invalid plan never reaches the network
    let validated = load_plan(config, plan_path)?;
    let signer = load_signer(key)?;
    let ledger = connect(config).await?;
    let chain_id = ledger.chain_id();

    let resolver = DirectoryResolver::new(&config.artifacts);
    let orchestrator = Orchestrator::new(ledger, resolver, signer)
        .with_waiter(ConfirmationWaiter::new(&config.confirmation));

    let (result, error) = match orchestrator.run_validated(&validated).await {
        Ok(result) => (result, None),
        Err(err) => (err.partial, Some(err.error)),
    };

    report::print_run(&result, error.as_ref());

    if let Some(output) = output {
        RunReport {
            network: &config.network,
            chain_id,
            result: &result,
            error: error.as_ref().map(ReportedError::from),
        }
        .write_json(output)?;
    }

    match error {
        Some(error) => Err::<(), _>(error).context("Deployment failed"),
        None => Ok(()),
    }
}

pub async fn status(config: &ArborConfig, plan_path: &Path, link: LinkArgs) -> Result<()> {
    let interface = load_link(config, plan_path)?.interface;
    let ledger = connect(config).await?;

    let authorized = query_status(&ledger, &interface, link.grantor, link.grantee).await?;
    println!(
        "{} is {}authorized on {}",
        link.grantee,
        if authorized { "" } else { "not " },
        link.grantor
    );

    Ok(())
}

pub async fn grant(
    config: &ArborConfig,
    plan_path: &Path,
    link: LinkArgs,
    key: &KeyArgs,
) -> Result<()> {
    let interface = load_link(config, plan_path)?.interface;
    let signer = load_signer(key)?;
    let ledger = connect(config).await?;

    let waiter = ConfirmationWaiter::new(&config.confirmation);
    let outcome = Linker::new(&ledger, &signer, waiter)
        .link(&interface, link.grantor, link.grantee)
        .await
        .context("Grant failed")?;

    println!("{}", report::describe_outcome(&outcome));
    Ok(())
}

pub async fn revoke(
    config: &ArborConfig,
    plan_path: &Path,
    link: LinkArgs,
    key: &KeyArgs,
) -> Result<()> {
    let interface = load_link(config, plan_path)?.interface;
    let signer = load_signer(key)?;
    let ledger = connect(config).await?;

    let waiter = ConfirmationWaiter::new(&config.confirmation);
    let tx_hash = Linker::new(&ledger, &signer, waiter)
        .revoke(&interface, link.grantor, link.grantee)
        .await
        .context("Revoke failed")?;

    println!(
        "{} revoked on {} in {tx_hash}",
        link.grantee, link.grantor
    );
    Ok(())
}
