//! Per-network deployment records
//!
//! Each named contract instance is persisted as `deployments/{network}/{alias}.json`,
//! mirroring the hardhat-deploy format so existing deployment directories keep working.

use std::{
    fs,
    path::{Path, PathBuf},
};

use alloy::json_abi::JsonAbi;
use alloy_primitives::{Address, Bytes, TxHash};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::{
    constants::{CHAIN_ID_FILE, JSON_EXTENSION, SUPPORTS_INTERFACE_FUNCTION},
    errors::ScriptError,
    storage_layout::StorageLayout,
    utils::{read_json_file, write_json_file},
};

/// A persisted contract deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    /// The on-chain address
    pub address: Address,
    /// The interface callable at `address`
    pub abi: JsonAbi,
    /// The creation transaction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<TxHash>,
    /// The constructor arguments, as JSON values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<Value>>,
    /// The creation bytecode, without constructor arguments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytecode: Option<Bytes>,
    /// For proxies, the implementation the record was last pointed at
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implementation: Option<Address>,
    /// For implementations, the storage layout used to validate later upgrades
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_layout: Option<StorageLayout>,
    /// How many times this alias has been (re)deployed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_deployments: Option<u64>,
}

/// The deployment records of a single network
#[derive(Debug, Clone)]
pub struct DeploymentStore {
    /// The network's deployments directory
    dir: PathBuf,
    /// The chain ID recorded alongside the deployments
    chain_id: u64,
}

impl DeploymentStore {
    /// Open the store for `network` under `deployments_root`
    pub fn new(deployments_root: &Path, network: &str, chain_id: u64) -> Self {
        Self {
            dir: deployments_root.join(network),
            chain_id,
        }
    }

    /// The path of the record for `alias`
    pub fn path(&self, alias: &str) -> PathBuf {
        self.dir.join(format!("{}{}", alias, JSON_EXTENSION))
    }

    /// Fetch the record for `alias`, if one exists
    pub fn get(&self, alias: &str) -> Result<Option<Deployment>, ScriptError> {
        let path = self.path(alias);
        if !path.exists() {
            return Ok(None);
        }

        read_json_file(&path).map(Some)
    }

    /// Persist the record for `alias`, replacing any previous one
    pub fn save(&self, alias: &str, deployment: &Deployment) -> Result<(), ScriptError> {
        write_json_file(&self.path(alias), deployment)?;

        let chain_id_path = self.dir.join(CHAIN_ID_FILE);
        if !chain_id_path.exists() {
            fs::write(&chain_id_path, self.chain_id.to_string()).map_err(|e| {
                ScriptError::WriteFile(format!("{}: {}", chain_id_path.display(), e))
            })?;
        }

        debug!(alias, address = %deployment.address, "saved deployment");
        Ok(())
    }
}

/// Merge several ABIs into one, keeping the first occurrence of every selector.
///
/// ERC165 `supportsInterface` is dropped, as proxy and implementation may both declare it.
pub fn merge_abis(abis: &[&JsonAbi]) -> JsonAbi {
    let mut merged = JsonAbi::default();

    for abi in abis {
        if merged.constructor.is_none() {
            merged.constructor = abi.constructor.clone();
        }
        if merged.fallback.is_none() {
            merged.fallback = abi.fallback.clone();
        }
        if merged.receive.is_none() {
            merged.receive = abi.receive.clone();
        }

        for function in abi.functions() {
            if function.name == SUPPORTS_INTERFACE_FUNCTION {
                continue;
            }
            let overloads = merged.functions.entry(function.name.clone()).or_default();
            if !overloads.iter().any(|f| f.selector() == function.selector()) {
                overloads.push(function.clone());
            }
        }

        for event in abi.events() {
            let overloads = merged.events.entry(event.name.clone()).or_default();
            if !overloads.iter().any(|e| e.selector() == event.selector()) {
                overloads.push(event.clone());
            }
        }

        for error in abi.errors() {
            let overloads = merged.errors.entry(error.name.clone()).or_default();
            if !overloads.iter().any(|e| e.selector() == error.selector()) {
                overloads.push(error.clone());
            }
        }
    }

    merged
}
