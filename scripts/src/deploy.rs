//! Deployment and upgrade of an implementation behind an ERC1967 proxy
//!
//! Three records are maintained per strategy:
//! - `{contract}_Implementation`, shared by every strategy of the same contract type
//! - `{alias}_Proxy`, the proxy with its constructor arguments
//! - `{alias}`, the proxy address with the merged proxy and implementation ABI

use std::str::FromStr;

use alloy_primitives::{Address, Bytes, B256};
use alloy_sol_types::SolValue;
use serde_json::json;
use tracing::info;

use crate::{
    artifacts::Artifact,
    chain::read,
    constants::{
        IMPLEMENTATION_STORAGE_SLOT, IMPLEMENTATION_SUFFIX, PROXY_CONTRACT_NAME, PROXY_SUFFIX,
    },
    context::DeployContext,
    deployments::{merge_abis, Deployment},
    errors::ScriptError,
    governance::execute_as_governor,
    initializer::Initializer,
    solidity::IStrategy,
    storage_layout::{validate_upgrade, StorageLayout},
    utils::address_from_slot,
    verify::verify_proxy,
};

/// What to deploy, and how to initialize it
#[derive(Debug, Clone)]
pub struct DeployParams {
    /// The name of the strategy instance
    pub alias: String,
    /// The implementation contract type
    pub contract: String,
    /// The initializer invoked by the proxy constructor
    pub initializer: Initializer,
}

/// The outcome of [`deploy_or_upgrade`]
#[derive(Debug, Clone)]
pub struct DeployResult {
    /// The record saved under the strategy alias
    pub deployment: Deployment,
    /// The implementation the proxy should point at
    pub implementation: Address,
    /// Whether the proxy was created by this call
    pub newly_deployed: bool,
}

/// The record alias of a contract type's implementation
pub fn implementation_alias(contract: &str) -> String {
    format!("{}{}", contract, IMPLEMENTATION_SUFFIX)
}

/// The record alias of a strategy's proxy
pub fn proxy_alias(alias: &str) -> String {
    format!("{}{}", alias, PROXY_SUFFIX)
}

/// Deploy a proxied contract, or upgrade the existing proxy to the latest implementation
pub async fn deploy_or_upgrade(
    ctx: &DeployContext,
    params: &DeployParams,
) -> Result<DeployResult, ScriptError> {
    let deployer = ctx.deployer()?;
    let implementation_alias = implementation_alias(&params.contract);
    let artifact = ctx.artifacts.load(&params.contract)?;

    let previous_implementation = ctx.deployments.get(&implementation_alias)?;
    let unchanged = previous_implementation
        .as_ref()
        .is_some_and(|previous| previous.bytecode.as_ref() == Some(&artifact.bytecode));

    // New code must carry a layout, both to check this upgrade and the ones after it
    let new_layout = if unchanged {
        None
    } else {
        Some(artifact.storage_layout()?)
    };
    if let (Some(previous), Some(new_layout)) = (&previous_implementation, &new_layout) {
        let old_layout = previous
            .storage_layout
            .as_ref()
            .ok_or_else(|| ScriptError::MissingStorageLayout(implementation_alias.clone()))?;
        validate_upgrade(&params.contract, old_layout, new_layout, &artifact.abi)?;
    }

    let implementation = deploy_implementation(
        ctx,
        deployer,
        &implementation_alias,
        &artifact,
        previous_implementation.as_ref(),
        new_layout,
    )
    .await?;

    let proxy_alias = proxy_alias(&params.alias);
    let Some(mut proxy) = ctx.deployments.get(&proxy_alias)? else {
        return deploy_proxy(ctx, deployer, params, &artifact, implementation).await;
    };

    if proxy.implementation != Some(implementation) {
        proxy.implementation = Some(implementation);
        ctx.deployments.save(&proxy_alias, &proxy)?;
    }

    let current = current_implementation(ctx, proxy.address).await?;
    if previous_implementation.is_some() && current != implementation {
        let governor = read(ctx.chain.as_ref(), proxy.address, IStrategy::governorCall {})
            .await?
            ._0;
        info!(
            alias = %params.alias,
            from = %current,
            to = %implementation,
            "upgrading proxy"
        );

        let upgrade = IStrategy::upgradeToAndCallCall {
            newImplementation: implementation,
            data: Bytes::new(),
        };
        execute_as_governor(ctx, proxy.address, upgrade, governor).await?;
    }

    let mut deployment = ctx.deployments.get(&params.alias)?.unwrap_or_else(|| proxy.clone());
    deployment.address = proxy.address;
    deployment.abi = merge_abis(&[&proxy.abi, &artifact.abi]);
    deployment.implementation = Some(implementation);
    ctx.deployments.save(&params.alias, &deployment)?;

    Ok(DeployResult {
        deployment,
        implementation,
        newly_deployed: false,
    })
}

/// Deploy the implementation unless the recorded one is identical and still on chain
async fn deploy_implementation(
    ctx: &DeployContext,
    deployer: Address,
    alias: &str,
    artifact: &Artifact,
    previous: Option<&Deployment>,
    layout: Option<StorageLayout>,
) -> Result<Address, ScriptError> {
    if let Some(previous) = previous {
        let same_args = previous.args.as_ref().map_or(true, |args| args.is_empty());
        if previous.bytecode.as_ref() == Some(&artifact.bytecode) && same_args {
            let code = ctx
                .chain
                .code_at(previous.address)
                .await
                .map_err(|e| ScriptError::ContractInteraction(e.to_string()))?;
            if !code.is_empty() {
                info!(alias, address = %previous.address, "reusing deployed implementation");
                return Ok(previous.address);
            }
        }
    }

    let receipt = ctx
        .chain
        .deploy(deployer, artifact.init_code(&[]))
        .await
        .map_err(|e| ScriptError::ContractDeployment(format!("{}: {}", alias, e)))?;
    info!(
        alias,
        address = %receipt.address,
        tx_hash = %receipt.tx_hash,
        "deployed implementation"
    );

    let record = Deployment {
        address: receipt.address,
        abi: artifact.abi.clone(),
        transaction_hash: Some(receipt.tx_hash),
        args: Some(Vec::new()),
        bytecode: Some(artifact.bytecode.clone()),
        implementation: None,
        storage_layout: layout.or_else(|| previous.and_then(|p| p.storage_layout.clone())),
        num_deployments: Some(previous.and_then(|p| p.num_deployments).unwrap_or(0) + 1),
    };
    ctx.deployments.save(alias, &record)?;

    Ok(receipt.address)
}

/// Deploy a fresh proxy initialized against `implementation`
async fn deploy_proxy(
    ctx: &DeployContext,
    deployer: Address,
    params: &DeployParams,
    artifact: &Artifact,
    implementation: Address,
) -> Result<DeployResult, ScriptError> {
    let init_data = params.initializer.encode(&artifact.abi)?;
    let proxy_artifact = ctx.artifacts.load(PROXY_CONTRACT_NAME)?;
    let constructor_args = (implementation, init_data.clone()).abi_encode_params();

    let proxy_alias = proxy_alias(&params.alias);
    let receipt = ctx
        .chain
        .deploy(deployer, proxy_artifact.init_code(&constructor_args))
        .await
        .map_err(|e| ScriptError::ContractDeployment(format!("{}: {}", proxy_alias, e)))?;
    info!(
        alias = %params.alias,
        address = %receipt.address,
        tx_hash = %receipt.tx_hash,
        "deployed proxy"
    );

    let args = vec![json!(implementation), json!(init_data)];
    let proxy = Deployment {
        address: receipt.address,
        abi: proxy_artifact.abi.clone(),
        transaction_hash: Some(receipt.tx_hash),
        args: Some(args),
        bytecode: Some(proxy_artifact.bytecode.clone()),
        implementation: Some(implementation),
        storage_layout: None,
        num_deployments: Some(1),
    };
    ctx.deployments.save(&proxy_alias, &proxy)?;

    let deployment = Deployment {
        abi: merge_abis(&[&proxy_artifact.abi, &artifact.abi]),
        ..proxy
    };
    ctx.deployments.save(&params.alias, &deployment)?;

    verify_proxy(ctx, receipt.address, implementation, &proxy_artifact, &constructor_args).await;

    Ok(DeployResult {
        deployment,
        implementation,
        newly_deployed: true,
    })
}

/// Read the implementation a proxy currently delegates to
pub async fn current_implementation(
    ctx: &DeployContext,
    proxy: Address,
) -> Result<Address, ScriptError> {
    let slot = B256::from_str(IMPLEMENTATION_STORAGE_SLOT)
        .map_err(|e| ScriptError::InvalidParameter(e.to_string()))?;
    let value = ctx
        .chain
        .storage_at(proxy, slot)
        .await
        .map_err(|e| ScriptError::ContractInteraction(e.to_string()))?;

    Ok(address_from_slot(value))
}
