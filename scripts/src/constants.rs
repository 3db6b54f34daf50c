//! Constants used in the deploy scripts

/// The storage slot containing the implementation address in an ERC1967 proxy.
///
/// This is specified in EIP1967: https://eips.ethereum.org/EIPS/eip-1967#logic-contract-address
pub const IMPLEMENTATION_STORAGE_SLOT: &str =
    "0x360894a13ba1a3210667c828492db98dca3e2076cc3735a920a3ca505d382bbc";

/// The number of bytes stored in a single storage slot
pub const NUM_BYTES_STORAGE_SLOT: usize = 32;

/// The number of bytes in an Ethereum address
pub const NUM_BYTES_ADDRESS: usize = 20;

/// The name of the proxy artifact deployed in front of every implementation
pub const PROXY_CONTRACT_NAME: &str = "ERC1967Proxy";

/// Suffix appended to a contract type to form its implementation deployment alias
pub const IMPLEMENTATION_SUFFIX: &str = "_Implementation";

/// Suffix appended to a strategy alias to form its proxy deployment alias
pub const PROXY_SUFFIX: &str = "_Proxy";

/// The initializer invoked through the proxy when no method name is declared
pub const DEFAULT_INITIALIZER: &str = "initialize";

/// The upgrade entrypoint every UUPS implementation must expose
pub const UPGRADE_FUNCTION: &str = "upgradeToAndCall";

/// The ERC165 function elided when merging proxy and implementation ABIs
pub const SUPPORTS_INTERFACE_FUNCTION: &str = "supportsInterface";

/// Networks on which source verification is skipped and impersonation is allowed
pub const LOCAL_NETWORKS: [&str; 2] = ["hardhat", "localhost"];

/// The network whose deployments are never included in a release
pub const RELEASE_EXCLUDED_NETWORK: &str = "localhost";

/// The extension marking a deployment file
pub const JSON_EXTENSION: &str = ".json";

/// The file in a network's deployments directory holding its chain ID
pub const CHAIN_ID_FILE: &str = ".chainId";

/// The name of the manifest file within a release directory
pub const RELEASE_FILE: &str = "contracts.json";

/// The suffix of the Hardhat debug sidecar pointing an artifact at its build info
pub const DEBUG_ARTIFACT_SUFFIX: &str = ".dbg.json";

/// The directory holding Hardhat build info files, never scanned for artifacts
pub const BUILD_INFO_DIR: &str = "build-info";

/// The marker solc leaves in bytecode when a library has not been linked
pub const UNLINKED_LIBRARY_MARKER: &str = "__$";

/// The label prefix of reserved storage gaps in upgradeable contracts
pub const STORAGE_GAP_PREFIX: &str = "__gap";

/// Default debt ratio when registering a strategy with its pool accountant
pub const DEFAULT_DEBT_RATIO: u64 = 0;

/// Default external deposit fee when registering a strategy with its pool accountant
pub const DEFAULT_EXTERNAL_DEPOSIT_FEE: u64 = 0;

/// The keeper added to strategies that declare none
pub const DEFAULT_KEEPER: &str = "0x76d266DFD3754f090488ae12F6Bd115cD7E77eBD";

/// The balance, in ether, given to an impersonated deployer on a local fork
pub const IMPERSONATED_BALANCE_ETHER: u64 = 1_000_000;

/// The Safe Transaction Builder document version
pub const SAFE_TX_BUILDER_VERSION: &str = "1.0";

/// Explorer API endpoint for Ethereum mainnet
pub const ETHERSCAN_MAINNET_API_URL: &str = "https://api.etherscan.io/api";

/// Explorer API endpoint for Optimism
pub const ETHERSCAN_OPTIMISM_API_URL: &str = "https://api-optimistic.etherscan.io/api";

/// Explorer API endpoint for Base
pub const ETHERSCAN_BASE_API_URL: &str = "https://api.basescan.org/api";

/// The timeout of a single explorer API request, in seconds
pub const VERIFY_REQUEST_TIMEOUT_SECS: u64 = 30;

/// The explorer response message for a contract whose source is already published
pub const ALREADY_VERIFIED_MESSAGE: &str = "already verified";

/// Revert reasons that mean the sender is not allowed to make the call
pub const UNAUTHORIZED_REVERT_MARKERS: [&str; 4] = [
    "not-governor",
    "not-authorized",
    "unauthorized",
    "caller is not the owner",
];

/// Node errors that mean the node holds no key for the sender
pub const UNKNOWN_SIGNER_MARKERS: [&str; 4] = [
    "unknown account",
    "account not recognized",
    "no signer available",
    "authentication needed",
];
