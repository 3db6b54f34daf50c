//! Creation of versioned release manifests from the per-network deployment records
//!
//! A release is a single `releases/{version}/contracts.json` file listing, per network,
//! the address of every deployment. Each release starts as a copy of the latest previous
//! one, so networks that were not redeployed carry forward unchanged.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use alloy_primitives::Address;
use semver::Version;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::{
    constants::{JSON_EXTENSION, RELEASE_EXCLUDED_NETWORK, RELEASE_FILE},
    errors::ScriptError,
    utils::{read_json_file, write_json_file},
};

/// Deployment name to address, for a single network
pub type NetworkDeployments = BTreeMap<String, Address>;

/// The contents of a release file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseManifest {
    /// The semantic version of the release
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// The deployments of every released network
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkDeployments>,
}

/// The only field of a deployment record a release needs
#[derive(Deserialize)]
struct DeployedAddress {
    /// The deployment address
    address: Address,
}

/// List every directory entry name under `dir`, sorted, skipping hidden entries
fn sorted_entries(dir: &Path) -> Result<Vec<(String, PathBuf)>, ScriptError> {
    let entries = fs::read_dir(dir)
        .map_err(|e| ScriptError::ReadFile(format!("{}: {}", dir.display(), e)))?;

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ScriptError::ReadFile(e.to_string()))?;
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if !name.starts_with('.') {
            names.push((name, entry.path()));
        }
    }

    names.sort();
    Ok(names)
}

/// Read the address of every deployment file in a network directory.
///
/// Any file whose name contains `.json` counts, keyed by the name up to the first
/// `.json`. Files are read in name order, so on a key collision the later file wins.
pub fn get_deployment_data(network_dir: &Path) -> Result<NetworkDeployments, ScriptError> {
    let mut deployments = NetworkDeployments::new();

    for (name, path) in sorted_entries(network_dir)? {
        if path.is_dir() {
            continue;
        }
        let Some((key, _)) = name.split_once(JSON_EXTENSION) else {
            continue;
        };

        let deployed: DeployedAddress = read_json_file(&path)?;
        deployments.insert(key.to_string(), deployed.address);
    }

    Ok(deployments)
}

/// Load the release with the highest semantic version, or an empty manifest if none exists
pub fn get_previous_release(releases_root: &Path) -> Result<ReleaseManifest, ScriptError> {
    if !releases_root.exists() {
        return Ok(ReleaseManifest::default());
    }

    let latest = sorted_entries(releases_root)?
        .into_iter()
        .filter_map(|(name, path)| Version::parse(&name).ok().map(|version| (version, path)))
        .max_by(|(a, _), (b, _)| a.cmp(b));

    match latest {
        Some((_, path)) if path.join(RELEASE_FILE).exists() => {
            read_json_file(&path.join(RELEASE_FILE))
        }
        _ => Ok(ReleaseManifest::default()),
    }
}

/// Fold a single network's deployments into the release `version`
pub fn create_release_for(
    network: &str,
    version: &str,
    deployments_root: &Path,
    releases_root: &Path,
) -> Result<PathBuf, ScriptError> {
    let deployments = get_deployment_data(&deployments_root.join(network))?;

    // The latest release is updated in place when its version matches, otherwise it seeds
    // the new version
    let mut manifest = get_previous_release(releases_root)?;
    if manifest.version.as_deref() != Some(version) {
        manifest.version = Some(version.to_string());
    }
    manifest.networks.insert(network.to_string(), deployments);

    let release_file = releases_root.join(version).join(RELEASE_FILE);

    write_json_file(&release_file, &manifest)?;
    info!(network, release = version, "release created");

    Ok(release_file)
}

/// Create or update release `version` from every network's deployments.
///
/// Networks are processed independently; the task fails at the end if any of them did.
pub fn create_release(
    version: &str,
    deployments_root: &Path,
    releases_root: &Path,
) -> Result<(), ScriptError> {
    Version::parse(version)
        .map_err(|e| ScriptError::InvalidParameter(format!("release {}: {}", version, e)))?;

    let mut failures = Vec::new();
    for (network, path) in sorted_entries(deployments_root)? {
        if network == RELEASE_EXCLUDED_NETWORK || !path.is_dir() {
            continue;
        }

        if let Err(e) = create_release_for(&network, version, deployments_root, releases_root) {
            error!(network = %network, "failed to create release: {}", e);
            failures.push((network, e.to_string()));
        }
    }

    if !failures.is_empty() {
        return Err(ScriptError::ReleaseFailed(failures));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{fs, path::Path};

    use alloy_primitives::{address, Address};
    use serde_json::json;
    use tempfile::tempdir;

    use crate::errors::ScriptError;

    use super::{create_release, get_deployment_data, get_previous_release, ReleaseManifest};

    const ADDRESS_A: Address = address!("00000000000000000000000000000000000000a1");
    const ADDRESS_B: Address = address!("00000000000000000000000000000000000000b2");
    const ADDRESS_C: Address = address!("00000000000000000000000000000000000000c3");

    fn write_deployment(dir: &Path, file_name: &str, address: Address) {
        fs::create_dir_all(dir).unwrap();
        fs::write(
            dir.join(file_name),
            json!({ "address": address, "abi": [] }).to_string(),
        )
        .unwrap();
    }

    fn write_release(releases: &Path, version: &str, manifest: serde_json::Value) {
        let dir = releases.join(version);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("contracts.json"), manifest.to_string()).unwrap();
    }

    fn read_release(releases: &Path, version: &str) -> ReleaseManifest {
        let contents = fs::read_to_string(releases.join(version).join("contracts.json")).unwrap();
        serde_json::from_str(&contents).unwrap()
    }

    #[test]
    fn test_deployment_data_skips_non_deployments() {
        let dir = tempdir().unwrap();
        write_deployment(dir.path(), "Yearn_ETH.json", ADDRESS_A);
        write_deployment(dir.path(), "Yearn_ETH_Proxy.json", ADDRESS_B);
        fs::write(dir.path().join(".chainId"), "1").unwrap();
        fs::create_dir_all(dir.path().join("solcInputs")).unwrap();

        let data = get_deployment_data(dir.path()).unwrap();
        assert_eq!(
            data.into_iter().collect::<Vec<_>>(),
            vec![
                ("Yearn_ETH".to_string(), ADDRESS_A),
                ("Yearn_ETH_Proxy".to_string(), ADDRESS_B),
            ]
        );
    }

    #[test]
    fn test_later_file_wins_on_key_collision() {
        let dir = tempdir().unwrap();
        write_deployment(dir.path(), "Yearn_ETH.json", ADDRESS_A);
        write_deployment(dir.path(), "Yearn_ETH.json.bak", ADDRESS_B);

        let data = get_deployment_data(dir.path()).unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(data["Yearn_ETH"], ADDRESS_B);
    }

    #[test]
    fn test_previous_release_ordering() {
        let dir = tempdir().unwrap();
        assert_eq!(
            get_previous_release(&dir.path().join("releases")).unwrap(),
            ReleaseManifest::default()
        );

        write_release(dir.path(), "1.9.0", json!({ "version": "1.9.0", "networks": {} }));
        write_release(dir.path(), "1.10.0", json!({ "version": "1.10.0", "networks": {} }));
        fs::write(dir.path().join(".DS_Store"), "").unwrap();
        fs::create_dir_all(dir.path().join("drafts")).unwrap();

        let previous = get_previous_release(dir.path()).unwrap();
        assert_eq!(previous.version.as_deref(), Some("1.10.0"));

        // The latest release without a manifest reads as empty
        fs::create_dir_all(dir.path().join("2.0.0")).unwrap();
        assert_eq!(
            get_previous_release(dir.path()).unwrap(),
            ReleaseManifest::default()
        );
    }

    #[test]
    fn test_new_release_carries_previous_networks_forward() {
        let dir = tempdir().unwrap();
        let deployments = dir.path().join("deployments");
        let releases = dir.path().join("releases");

        write_release(
            &releases,
            "1.0.0",
            json!({ "version": "1.0.0", "networks": { "optimism": { "CompoundV3_ETH": ADDRESS_C } } }),
        );
        write_deployment(&deployments.join("mainnet"), "Yearn_ETH.json", ADDRESS_A);
        write_deployment(&deployments.join("localhost"), "Yearn_ETH.json", ADDRESS_B);

        create_release("1.1.0", &deployments, &releases).unwrap();

        let release = read_release(&releases, "1.1.0");
        assert_eq!(release.version.as_deref(), Some("1.1.0"));
        assert_eq!(release.networks["optimism"]["CompoundV3_ETH"], ADDRESS_C);
        assert_eq!(release.networks["mainnet"]["Yearn_ETH"], ADDRESS_A);
        assert!(!release.networks.contains_key("localhost"));

        // The previous release is left untouched
        assert_eq!(read_release(&releases, "1.0.0").networks.len(), 1);
    }

    #[test]
    fn test_same_version_is_updated_in_place() {
        let dir = tempdir().unwrap();
        let deployments = dir.path().join("deployments");
        let releases = dir.path().join("releases");

        write_release(
            &releases,
            "1.1.0",
            json!({
                "version": "1.1.0",
                "networks": {
                    "mainnet": { "Old_Strategy": ADDRESS_C },
                    "base": { "Morpho_XLend_USDC": ADDRESS_B }
                }
            }),
        );
        write_deployment(&deployments.join("mainnet"), "Yearn_ETH.json", ADDRESS_A);

        create_release("1.1.0", &deployments, &releases).unwrap();

        let release = read_release(&releases, "1.1.0");
        assert_eq!(release.networks["mainnet"].len(), 1);
        assert_eq!(release.networks["mainnet"]["Yearn_ETH"], ADDRESS_A);
        assert_eq!(release.networks["base"]["Morpho_XLend_USDC"], ADDRESS_B);
    }

    #[test]
    fn test_older_version_is_seeded_from_latest_release() {
        let dir = tempdir().unwrap();
        let deployments = dir.path().join("deployments");
        let releases = dir.path().join("releases");

        write_release(
            &releases,
            "1.0.0",
            json!({ "version": "1.0.0", "networks": { "base": { "Morpho_XLend_USDC": ADDRESS_B } } }),
        );
        write_release(
            &releases,
            "2.0.0",
            json!({ "version": "2.0.0", "networks": { "optimism": { "CompoundV3_ETH": ADDRESS_C } } }),
        );
        write_deployment(&deployments.join("mainnet"), "Yearn_ETH.json", ADDRESS_A);

        create_release("1.0.0", &deployments, &releases).unwrap();

        let release = read_release(&releases, "1.0.0");
        assert_eq!(release.version.as_deref(), Some("1.0.0"));
        assert_eq!(
            release.networks.keys().collect::<Vec<_>>(),
            vec!["mainnet", "optimism"]
        );
        assert_eq!(release.networks["optimism"]["CompoundV3_ETH"], ADDRESS_C);

        // The latest release is left untouched
        assert_eq!(read_release(&releases, "2.0.0").version.as_deref(), Some("2.0.0"));
    }

    #[test]
    fn test_first_release_document() {
        let dir = tempdir().unwrap();
        let deployments = dir.path().join("deployments");
        let releases = dir.path().join("releases");

        write_deployment(&deployments.join("mainnet"), "StrategyA.json", ADDRESS_A);
        write_deployment(&deployments.join("mainnet"), "StrategyB.json", ADDRESS_B);

        create_release("1.2.0", &deployments, &releases).unwrap();

        let contents = fs::read_to_string(releases.join("1.2.0/contracts.json")).unwrap();
        let a = serde_json::to_string(&ADDRESS_A).unwrap();
        let b = serde_json::to_string(&ADDRESS_B).unwrap();
        let expected = format!(
            "{{\n  \"version\": \"1.2.0\",\n  \"networks\": {{\n    \"mainnet\": {{\n      \
             \"StrategyA\": {a},\n      \"StrategyB\": {b}\n    }}\n  }}\n}}"
        );
        assert_eq!(contents, expected);
    }

    #[test]
    fn test_failing_network_does_not_stop_others() {
        let dir = tempdir().unwrap();
        let deployments = dir.path().join("deployments");
        let releases = dir.path().join("releases");

        write_deployment(&deployments.join("base"), "Morpho_XLend_USDC.json", ADDRESS_A);
        fs::create_dir_all(deployments.join("mainnet")).unwrap();
        fs::write(deployments.join("mainnet").join("Broken.json"), "{").unwrap();
        write_deployment(&deployments.join("optimism"), "CompoundV3_ETH.json", ADDRESS_B);

        let result = create_release("1.0.0", &deployments, &releases);
        let Err(ScriptError::ReleaseFailed(failures)) = result else {
            panic!("expected the release to fail");
        };
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "mainnet");

        let release = read_release(&releases, "1.0.0");
        assert!(release.networks.contains_key("base"));
        assert!(release.networks.contains_key("optimism"));
        assert!(!release.networks.contains_key("mainnet"));
    }

    #[test]
    fn test_invalid_version_is_rejected() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            create_release("latest", dir.path(), dir.path()),
            Err(ScriptError::InvalidParameter(_))
        ));
    }
}
