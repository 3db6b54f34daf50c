//! Definitions of errors that can occur during the execution of the strategy deployment scripts

use std::{
    error::Error,
    fmt::{self, Display, Formatter},
};

use itertools::Itertools;

use crate::storage_layout::LayoutIssue;

/// Errors that can occur during the execution of the strategy deployment scripts
#[derive(Debug)]
pub enum ScriptError {
    /// The `deployer` account was not configured
    MissingDeployerAccount,
    /// A required parameter was missing or malformed
    InvalidParameter(String),
    /// Error reading a file from disk
    ReadFile(String),
    /// Error writing a file to disk
    WriteFile(String),
    /// Error parsing a compilation artifact
    ArtifactParsing(String),
    /// The artifact or deployment record carries no storage layout
    MissingStorageLayout(String),
    /// Error initializing the RPC client
    ClientInitialization(String),
    /// Error constructing calldata for a contract method
    CalldataConstruction(String),
    /// Error deploying a contract
    ContractDeployment(String),
    /// Error calling a contract method
    ContractInteraction(String),
    /// The new implementation cannot safely replace the old one behind the proxy
    UpgradeIncompatible {
        /// The contract type being upgraded
        contract: String,
        /// Every incompatibility found
        issues: Vec<LayoutIssue>,
    },
    /// Error de/serializing a file format
    Serde(String),
    /// The operation is only permitted on local networks
    UnsupportedNetwork(String),
    /// One or more strategies failed to deploy
    DeployFailed(Vec<(String, String)>),
    /// One or more networks failed while creating a release
    ReleaseFailed(Vec<(String, String)>),
}

impl Display for ScriptError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ScriptError::MissingDeployerAccount => {
                write!(f, "the 'deployer' named account wasn't set")
            }
            ScriptError::InvalidParameter(s) => write!(f, "invalid parameter: {}", s),
            ScriptError::ReadFile(s) => write!(f, "error reading file: {}", s),
            ScriptError::WriteFile(s) => write!(f, "error writing file: {}", s),
            ScriptError::ArtifactParsing(s) => write!(f, "error parsing artifact: {}", s),
            ScriptError::MissingStorageLayout(s) => {
                write!(f, "no storage layout available for {}", s)
            }
            ScriptError::ClientInitialization(s) => write!(f, "error initializing client: {}", s),
            ScriptError::CalldataConstruction(s) => write!(f, "error constructing calldata: {}", s),
            ScriptError::ContractDeployment(s) => write!(f, "error deploying contract: {}", s),
            ScriptError::ContractInteraction(s) => {
                write!(f, "error interacting with contract: {}", s)
            }
            ScriptError::UpgradeIncompatible { contract, issues } => write!(
                f,
                "upgrade of {} is incompatible with the deployed proxy:\n  {}",
                contract,
                issues.iter().join("\n  ")
            ),
            ScriptError::Serde(s) => write!(f, "error de/serializing: {}", s),
            ScriptError::UnsupportedNetwork(s) => write!(f, "unsupported network: {}", s),
            ScriptError::DeployFailed(failures) => write!(
                f,
                "{} strategies failed to deploy: {}",
                failures.len(),
                failures
                    .iter()
                    .map(|(alias, err)| format!("{alias} ({err})"))
                    .join(", ")
            ),
            ScriptError::ReleaseFailed(failures) => write!(
                f,
                "release creation failed for {} networks: {}",
                failures.len(),
                failures
                    .iter()
                    .map(|(network, err)| format!("{network} ({err})"))
                    .join(", ")
            ),
        }
    }
}

impl Error for ScriptError {}
