//! Utilities for the deploy scripts.

use std::{fs, path::Path, str::FromStr};

use alloy_primitives::{Address, B256};
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    constants::{NUM_BYTES_ADDRESS, NUM_BYTES_STORAGE_SLOT},
    errors::ScriptError,
};

/// Read and deserialize a JSON file
pub fn read_json_file<T: DeserializeOwned>(file_path: &Path) -> Result<T, ScriptError> {
    let contents = fs::read_to_string(file_path)
        .map_err(|e| ScriptError::ReadFile(format!("{}: {}", file_path.display(), e)))?;

    serde_json::from_str(&contents)
        .map_err(|e| ScriptError::Serde(format!("{}: {}", file_path.display(), e)))
}

/// Serialize a value as pretty-printed JSON and write it to disk,
/// creating any missing parent directories
pub fn write_json_file<T: Serialize>(file_path: &Path, value: &T) -> Result<(), ScriptError> {
    if let Some(parent) = file_path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| ScriptError::WriteFile(format!("{}: {}", parent.display(), e)))?;
    }

    let contents = serde_json::to_string_pretty(value)
        .map_err(|e| ScriptError::Serde(format!("{}: {}", file_path.display(), e)))?;

    fs::write(file_path, contents)
        .map_err(|e| ScriptError::WriteFile(format!("{}: {}", file_path.display(), e)))
}

/// Parse a hex address given on the command line or in a declaration
pub fn parse_address(address: &str) -> Result<Address, ScriptError> {
    Address::from_str(address)
        .map_err(|e| ScriptError::InvalidParameter(format!("address {}: {}", address, e)))
}

/// Extract the address held in the low-order bytes of a storage slot
pub fn address_from_slot(slot_value: B256) -> Address {
    Address::from_slice(&slot_value[NUM_BYTES_STORAGE_SLOT - NUM_BYTES_ADDRESS..])
}
