//! Loading of compiled contract artifacts
//!
//! Both Hardhat (`artifacts/<source>/<Name>.json`, with a `.dbg.json` sidecar pointing at
//! the build info) and Foundry (`out/<source>/<Name>.json`, bytecode nested under
//! `object`) layouts are understood.

use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use alloy::json_abi::JsonAbi;
use alloy_primitives::Bytes;
use serde::Deserialize;
use serde_json::Value;

use crate::{
    constants::{BUILD_INFO_DIR, DEBUG_ARTIFACT_SUFFIX, JSON_EXTENSION, UNLINKED_LIBRARY_MARKER},
    errors::ScriptError,
    storage_layout::StorageLayout,
    utils::read_json_file,
};

/// A compiled contract ready to be deployed
#[derive(Debug, Clone)]
pub struct Artifact {
    /// The contract name
    pub contract_name: String,
    /// The source file the contract was compiled from, if recorded
    pub source_name: Option<String>,
    /// The contract ABI
    pub abi: JsonAbi,
    /// The creation bytecode, without constructor arguments
    pub bytecode: Bytes,
    /// The storage layout, when emitted directly into the artifact
    storage_layout: Option<StorageLayout>,
    /// The Hardhat build info file this artifact was produced by
    build_info_path: Option<PathBuf>,
}

/// The compiler input and output an artifact was produced from
#[derive(Debug, Clone)]
pub struct BuildInfo {
    /// The full compiler version, e.g. `0.8.25+commit.b61c2a91`
    pub solc_long_version: String,
    /// The standard JSON input given to the compiler
    pub input: Value,
    /// The standard JSON output of the compiler
    output: Value,
}

/// An artifact file as written by Hardhat or Foundry
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawArtifact {
    /// The contract name, absent in Foundry output
    #[serde(default)]
    contract_name: Option<String>,
    /// The source file the contract is defined in
    #[serde(default)]
    source_name: Option<String>,
    /// The contract ABI
    abi: JsonAbi,
    /// The creation code
    bytecode: RawBytecode,
    /// The solc storage layout, when the compiler emitted one
    #[serde(default)]
    storage_layout: Option<StorageLayout>,
    /// The solc metadata
    #[serde(default)]
    metadata: Option<Value>,
}

/// Creation code, either a bare hex string or a Foundry bytecode object
#[derive(Deserialize)]
#[serde(untagged)]
enum RawBytecode {
    /// Hardhat's bare hex string
    Hex(String),
    /// Foundry's `{ "object": ... }`
    Object {
        /// The hex-encoded code
        object: String,
    },
}

/// A Hardhat `.dbg.json` file
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DebugArtifact {
    /// Path of the build-info file, relative to the debug file
    build_info: PathBuf,
}

/// A Hardhat build-info file
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBuildInfo {
    /// The full compiler version, commit included
    solc_long_version: String,
    /// The standard-JSON compiler input
    input: Value,
    /// The standard-JSON compiler output
    #[serde(default)]
    output: Value,
}

impl Artifact {
    /// The creation code for a deployment with the given encoded constructor arguments
    pub fn init_code(&self, constructor_args: &[u8]) -> Bytes {
        [self.bytecode.as_ref(), constructor_args].concat().into()
    }

    /// The fully qualified `source:Name` identifier, as explorers expect it
    pub fn qualified_name(&self) -> String {
        match &self.source_name {
            Some(source) => format!("{}:{}", source, self.contract_name),
            None => self.contract_name.clone(),
        }
    }

    /// The storage layout of the contract, taken from the artifact itself or its build info
    pub fn storage_layout(&self) -> Result<StorageLayout, ScriptError> {
        if let Some(layout) = &self.storage_layout {
            return Ok(layout.clone());
        }

        let missing = || ScriptError::MissingStorageLayout(self.contract_name.clone());
        let build_info = self.build_info()?.ok_or_else(missing)?;
        let source = self.source_name.as_deref().ok_or_else(missing)?;
        let layout = build_info.output["contracts"][source][&self.contract_name]["storageLayout"]
            .clone();
        if layout.is_null() {
            return Err(missing());
        }

        serde_json::from_value(layout).map_err(|e| ScriptError::ArtifactParsing(e.to_string()))
    }

    /// The build info this artifact was produced by, if one is referenced
    pub fn build_info(&self) -> Result<Option<BuildInfo>, ScriptError> {
        let Some(path) = &self.build_info_path else {
            return Ok(None);
        };

        let raw: RawBuildInfo = read_json_file(path)?;
        Ok(Some(BuildInfo {
            solc_long_version: raw.solc_long_version,
            input: raw.input,
            output: raw.output,
        }))
    }
}

/// Looks up artifacts by contract name under a build output directory
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    /// The root of the build output
    root: PathBuf,
}

impl ArtifactStore {
    /// Create a store rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Load the artifact for `name`, either a bare contract name or `source.sol:Name`
    pub fn load(&self, name: &str) -> Result<Artifact, ScriptError> {
        let (source, contract) = match name.rsplit_once(':') {
            Some((source, contract)) => (Some(source), contract),
            None => (None, name),
        };

        let file_name = format!("{}{}", contract, JSON_EXTENSION);
        let mut candidates = Vec::new();
        find_files(&self.root, &file_name, &mut candidates)?;
        candidates.sort();

        let mut artifacts = candidates
            .iter()
            .map(|path| parse_artifact(path, contract))
            .collect::<Result<Vec<_>, _>>()?;
        if let Some(source) = source {
            artifacts.retain(|artifact| artifact.source_name.as_deref() == Some(source));
        }

        match artifacts.len() {
            0 => Err(ScriptError::ArtifactParsing(format!(
                "no artifact for {} under {}",
                name,
                self.root.display()
            ))),
            1 => Ok(artifacts.remove(0)),
            n => Err(ScriptError::ArtifactParsing(format!(
                "{} artifacts named {}, use a fully qualified name",
                n, name
            ))),
        }
    }
}

/// Recursively collect files named `file_name`, skipping build info directories
fn find_files(dir: &Path, file_name: &str, found: &mut Vec<PathBuf>) -> Result<(), ScriptError> {
    let entries = fs::read_dir(dir)
        .map_err(|e| ScriptError::ReadFile(format!("{}: {}", dir.display(), e)))?;

    for entry in entries {
        let entry = entry.map_err(|e| ScriptError::ReadFile(e.to_string()))?;
        let path = entry.path();
        if path.is_dir() {
            if entry.file_name() != BUILD_INFO_DIR {
                find_files(&path, file_name, found)?;
            }
        } else if entry.file_name().to_str() == Some(file_name) {
            found.push(path);
        }
    }

    Ok(())
}

/// Read and decode the artifact file of `contract`
fn parse_artifact(path: &Path, contract: &str) -> Result<Artifact, ScriptError> {
    let raw: RawArtifact = read_json_file(path)?;

    let bytecode = match raw.bytecode {
        RawBytecode::Hex(hex) | RawBytecode::Object { object: hex } => hex,
    };
    if bytecode.contains(UNLINKED_LIBRARY_MARKER) {
        return Err(ScriptError::ArtifactParsing(format!(
            "{} has unlinked library references",
            contract
        )));
    }
    let bytecode =
        Bytes::from_str(&bytecode).map_err(|e| ScriptError::ArtifactParsing(e.to_string()))?;
    if bytecode.is_empty() {
        return Err(ScriptError::ArtifactParsing(format!(
            "{} has no bytecode, is it abstract?",
            contract
        )));
    }

    // Foundry records the source in the compilation target of the metadata
    let source_name = raw.source_name.or_else(|| {
        raw.metadata
            .as_ref()
            .and_then(|metadata| metadata["settings"]["compilationTarget"].as_object())
            .and_then(|target| target.keys().next().cloned())
    });

    let debug_path = path.with_file_name(format!("{}{}", contract, DEBUG_ARTIFACT_SUFFIX));
    let build_info_path = if debug_path.exists() {
        let debug: DebugArtifact = read_json_file(&debug_path)?;
        debug_path.parent().map(|dir| dir.join(debug.build_info))
    } else {
        None
    };

    Ok(Artifact {
        contract_name: raw.contract_name.unwrap_or_else(|| contract.to_string()),
        source_name,
        abi: raw.abi,
        bytecode,
        storage_layout: raw.storage_layout,
        build_info_path,
    })
}
