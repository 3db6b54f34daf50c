//! Implementations of the script commands

use std::path::Path;

use alloy_primitives::utils::parse_ether;
use tracing::{error, info, warn};

use crate::{
    constants::IMPERSONATED_BALANCE_ETHER,
    context::DeployContext,
    errors::ScriptError,
    release,
    strategy::{deploy_and_configure_strategy, load_declarations},
    utils::write_json_file,
};

/// Deploy and configure every declared strategy, in declaration order.
///
/// A failing strategy does not stop the others; the command fails at the end if any did.
pub async fn deploy(
    ctx: &DeployContext,
    declarations_path: &Path,
    only: &[String],
) -> Result<(), ScriptError> {
    // Fail on a missing deployer before reading anything
    ctx.deployer()?;

    let declarations = load_declarations(declarations_path)?;
    for alias in only {
        if !declarations.iter().any(|decl| &decl.alias == alias) {
            return Err(ScriptError::InvalidParameter(format!(
                "no strategy declared as {}",
                alias
            )));
        }
    }

    let mut failures = Vec::new();
    for declaration in &declarations {
        if !only.is_empty() && !only.contains(&declaration.alias) {
            continue;
        }

        match deploy_and_configure_strategy(ctx, declaration).await {
            Ok(deployed) => info!(
                alias = %declaration.alias,
                network = %ctx.network.name,
                address = %deployed.deployment.address,
                implementation = %deployed.implementation,
                "strategy deployed"
            ),
            Err(e) => {
                error!(alias = %declaration.alias, "failed to deploy strategy: {}", e);
                failures.push((declaration.alias.clone(), e.to_string()));
            }
        }
    }

    if !failures.is_empty() {
        return Err(ScriptError::DeployFailed(failures));
    }

    Ok(())
}

/// Create or update release `version`
pub fn create_release(
    version: &str,
    deployments_root: &Path,
    releases_root: &Path,
) -> Result<(), ScriptError> {
    release::create_release(version, deployments_root, releases_root)
}

/// Impersonate the deployer on a local fork and give it a large balance
pub async fn impersonate(ctx: &DeployContext) -> Result<(), ScriptError> {
    if !ctx.network.is_local() {
        return Err(ScriptError::UnsupportedNetwork(format!(
            "impersonation is only available on local networks, not {}",
            ctx.network.name
        )));
    }

    let deployer = ctx.deployer()?;
    let balance = parse_ether(&IMPERSONATED_BALANCE_ETHER.to_string())
        .map_err(|e| ScriptError::InvalidParameter(e.to_string()))?;
    ctx.chain
        .impersonate(deployer, balance)
        .await
        .map_err(|e| ScriptError::ContractInteraction(e.to_string()))?;

    info!(account = %deployer, %balance, network = %ctx.network.name, "impersonated deployer");
    Ok(())
}

/// Export the queued multisig transactions, optionally clearing the queue afterwards
pub fn safe_batch(
    ctx: &DeployContext,
    output: Option<&Path>,
    clear: bool,
) -> Result<(), ScriptError> {
    let batches = ctx.safe_batch.export(ctx.network.chain_id)?;
    if batches.is_empty() {
        warn!(network = %ctx.network.name, "no transactions queued for the multisig");
        return Ok(());
    }

    match output {
        Some(path) => {
            write_json_file(path, &batches)?;
            info!(path = %path.display(), safes = batches.len(), "exported safe batch");
        }
        None => {
            let json = serde_json::to_string_pretty(&batches)
                .map_err(|e| ScriptError::Serde(e.to_string()))?;
            println!("{}", json);
        }
    }

    if clear {
        ctx.safe_batch.clear()?;
        info!(network = %ctx.network.name, "cleared safe batch");
    }

    Ok(())
}
