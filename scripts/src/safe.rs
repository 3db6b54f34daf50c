//! The batch of privileged transactions awaiting execution by a Safe multisig
//!
//! Transactions the operator key could not execute are appended to
//! `safe-batch/{network}.json` and later exported in the Safe Transaction Builder format,
//! from which the multisig owners execute them.

use std::{
    fs,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use alloy_primitives::{Address, Bytes};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    constants::{JSON_EXTENSION, SAFE_TX_BUILDER_VERSION},
    errors::ScriptError,
    utils::{read_json_file, write_json_file},
};

/// A privileged call to be executed by the multisig
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMultisigTx {
    /// The governor (the Safe) that must send the call
    pub from: Address,
    /// The contract being called
    pub to: Address,
    /// The wei attached to the call, always zero
    pub value: String,
    /// The encoded call
    pub data: Bytes,
}

impl PendingMultisigTx {
    /// A zero-value call from `from` to `to`
    pub fn new(from: Address, to: Address, data: Bytes) -> Self {
        Self {
            from,
            to,
            value: "0".to_string(),
            data,
        }
    }
}

/// The pending batch of a single network
#[derive(Debug, Clone)]
pub struct SafeBatch {
    /// The batch file
    path: PathBuf,
}

impl SafeBatch {
    /// Open the batch for `network` under `batch_root`
    pub fn new(batch_root: &Path, network: &str) -> Self {
        Self {
            path: batch_root.join(format!("{}{}", network, JSON_EXTENSION)),
        }
    }

    /// The queued transactions, in the order they were queued
    pub fn load(&self) -> Result<Vec<PendingMultisigTx>, ScriptError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        read_json_file(&self.path)
    }

    /// Queue a transaction, returning `false` if an identical one is already queued
    pub fn append(&self, tx: PendingMultisigTx) -> Result<bool, ScriptError> {
        let mut txs = self.load()?;
        if txs.contains(&tx) {
            debug!(to = %tx.to, "transaction already queued for the safe");
            return Ok(false);
        }

        txs.push(tx);
        write_json_file(&self.path, &txs)?;
        Ok(true)
    }

    /// Drop every queued transaction
    pub fn clear(&self) -> Result<(), ScriptError> {
        if self.path.exists() {
            fs::remove_file(&self.path)
                .map_err(|e| ScriptError::WriteFile(format!("{}: {}", self.path.display(), e)))?;
        }

        Ok(())
    }

    /// Render the queue as one Transaction Builder document per Safe
    pub fn export(&self, chain_id: u64) -> Result<Vec<TxBuilderBatch>, ScriptError> {
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or_default();

        let txs = self.load()?;
        let batches = txs
            .iter()
            .map(|tx| tx.from)
            .unique()
            .map(|safe| TxBuilderBatch {
                version: SAFE_TX_BUILDER_VERSION.to_string(),
                chain_id: chain_id.to_string(),
                created_at,
                meta: TxBuilderMeta {
                    name: format!("Strategy configuration for {:#x}", safe),
                    description: String::new(),
                    created_from_safe_address: safe,
                },
                transactions: txs
                    .iter()
                    .filter(|tx| tx.from == safe)
                    .map(|tx| TxBuilderTransaction {
                        to: tx.to,
                        value: tx.value.clone(),
                        data: tx.data.clone(),
                    })
                    .collect(),
            })
            .collect();

        Ok(batches)
    }
}

/// A Safe Transaction Builder batch file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TxBuilderBatch {
    /// The document format version
    pub version: String,
    /// The chain the batch targets
    pub chain_id: String,
    /// Creation time, in milliseconds since the epoch
    pub created_at: u64,
    /// Batch metadata
    pub meta: TxBuilderMeta,
    /// The calls, executed in order
    pub transactions: Vec<TxBuilderTransaction>,
}

/// Metadata of a Transaction Builder batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TxBuilderMeta {
    /// Display name
    pub name: String,
    /// Display description
    pub description: String,
    /// The Safe expected to execute the batch
    pub created_from_safe_address: Address,
}

/// A single call of a Transaction Builder batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TxBuilderTransaction {
    /// The contract being called
    pub to: Address,
    /// The wei attached
    pub value: String,
    /// The encoded call
    pub data: Bytes,
}
