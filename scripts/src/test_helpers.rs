//! An in-memory chain and build fixtures for exercising the scripts without a node

use std::{
    collections::{HashMap, HashSet},
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    sync::{Arc, Mutex, MutexGuard},
};

use alloy::json_abi::JsonAbi;
use alloy_primitives::{address, Address, Bytes, TxHash, B256, U256};
use alloy_sol_types::{SolCall, SolValue};
use async_trait::async_trait;
use serde_json::json;
use tempfile::{tempdir, TempDir};

use crate::{
    artifacts::ArtifactStore,
    chain::{Chain, ChainError, DeployReceipt},
    constants::IMPLEMENTATION_STORAGE_SLOT,
    context::DeployContext,
    deployments::DeploymentStore,
    safe::SafeBatch,
    solidity::{IPoolAccountant, IStrategy, IERC20},
    storage_layout::StorageLayout,
    types::Network,
};

/// The chain ID reported by [`MockChain`]
pub const MOCK_CHAIN_ID: u64 = 31337;

/// The pool every mock strategy reports
pub const POOL: Address = address!("00000000000000000000000000000000000000e1");
/// The collateral token every mock strategy reports
pub const COLLATERAL: Address = address!("00000000000000000000000000000000000000e2");
/// The pool accountant every mock strategy reports
pub const ACCOUNTANT: Address = address!("00000000000000000000000000000000000000e3");

/// Creation code of the strategy fixture
pub const YEARN_BYTECODE: &str = "0x608060405234801561001057600080fd5b50";
/// Creation code of the proxy fixture, recognized by [`MockChain`] on deploy
pub const PROXY_BYTECODE: &str = "0x60a0604052610b5f";

/// A transaction recorded by [`MockChain`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentTx {
    /// The sender
    pub from: Address,
    /// The called contract
    pub to: Address,
    /// The calldata
    pub data: Bytes,
}

/// A contract creation recorded by [`MockChain`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployedTx {
    /// The sender
    pub from: Address,
    /// The created contract
    pub address: Address,
    /// Creation code with encoded constructor args
    pub init_code: Bytes,
}

/// Everything [`MockChain`] knows about its accounts and contracts
#[derive(Default)]
struct MockState {
    /// Accounts allowed to send
    signers: HashSet<Address>,
    /// Deployed code by address
    code: HashMap<Address, Bytes>,
    /// Written storage slots
    storage: HashMap<(Address, B256), B256>,
    /// Governor of strategies without their own entry
    default_governor: Address,
    /// Per-strategy governors
    governors: HashMap<Address, Address>,
    /// Keepers added to each strategy
    keepers: HashMap<Address, Vec<Address>>,
    /// Strategies registered with the accountant
    active: HashSet<Address>,
    /// Allowance of strategies that never approved
    default_allowance: U256,
    /// Allowances granted by `approveToken`
    allowances: HashMap<Address, U256>,
    /// Every `(token, spender)` allowance read
    allowance_queries: Vec<(Address, Address)>,
    /// Accepted transactions
    sent: Vec<SentTx>,
    /// Accepted contract creations
    deployed: Vec<DeployedTx>,
    /// An error to fail the next send with
    next_send_failure: Option<ChainError>,
}

impl MockState {
    /// The governor `strategy` reports
    fn governor_of(&self, strategy: Address) -> Address {
        self.governors
            .get(&strategy)
            .copied()
            .unwrap_or(self.default_governor)
    }

    /// Reject a privileged call not sent by the governor of `target`
    fn require_governor(&self, from: Address, target: Address) -> Result<(), ChainError> {
        if from == self.governor_of(target) {
            Ok(())
        } else {
            Err(ChainError::Unauthorized("not-governor".to_string()))
        }
    }
}

/// A chain that answers the strategy, accountant and token calls the scripts make.
///
/// Every address behaves as a strategy reporting [`POOL`], [`COLLATERAL`] and
/// [`ACCOUNTANT`]. Sends are only accepted from the configured signers, and
/// privileged calls only from the governor.
#[derive(Clone, Default)]
pub struct MockChain {
    /// State shared by every clone
    state: Arc<Mutex<MockState>>,
}

impl MockChain {
    /// A chain on which `signers` can send transactions
    pub fn new(signers: &[Address]) -> Self {
        let chain = Self::default();
        chain.state().signers.extend(signers);
        chain
    }

    /// Lock the shared state
    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    /// Set the governor reported by every strategy
    pub fn set_default_governor(&self, governor: Address) {
        self.state().default_governor = governor;
    }

    /// Set the governor reported by a single strategy
    pub fn set_strategy_governor(&self, strategy: Address, governor: Address) {
        self.state().governors.insert(strategy, governor);
    }

    /// Set the allowance reported for strategies that never approved
    pub fn set_default_allowance(&self, allowance: U256) {
        self.state().default_allowance = allowance;
    }

    /// Make the next send fail with `error`
    pub fn fail_next_send(&self, error: ChainError) {
        self.state().next_send_failure = Some(error);
    }

    /// Transactions accepted so far
    pub fn sent(&self) -> Vec<SentTx> {
        self.state().sent.clone()
    }

    /// Contracts created so far
    pub fn deployed(&self) -> Vec<DeployedTx> {
        self.state().deployed.clone()
    }

    /// The allowance `owner` granted through `approveToken`
    pub fn allowance(&self, owner: Address) -> U256 {
        let state = self.state();
        state
            .allowances
            .get(&owner)
            .copied()
            .unwrap_or(state.default_allowance)
    }

    /// Keepers added to `strategy`
    pub fn keepers(&self, strategy: Address) -> Vec<Address> {
        self.state()
            .keepers
            .get(&strategy)
            .cloned()
            .unwrap_or_default()
    }

    /// Whether `strategy` was added to the accountant
    pub fn is_active(&self, strategy: Address) -> bool {
        self.state().active.contains(&strategy)
    }

    /// The `(token, spender)` pairs allowances were read for
    pub fn allowance_queries(&self) -> Vec<(Address, Address)> {
        self.state().allowance_queries.clone()
    }
}

/// The function selector of calldata
fn selector(data: &[u8]) -> Result<[u8; 4], ChainError> {
    data.get(..4)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| ChainError::Reverted("calldata too short".to_string()))
}

/// Decode calldata as call `C`
fn decode<C: SolCall>(data: &[u8]) -> Result<C, ChainError> {
    C::abi_decode(data, true).map_err(|e| ChainError::Reverted(e.to_string()))
}

/// The EIP-1967 implementation slot as a storage key
fn implementation_slot() -> B256 {
    B256::from_str(IMPLEMENTATION_STORAGE_SLOT).unwrap()
}

#[async_trait]
impl Chain for MockChain {
    async fn chain_id(&self) -> Result<u64, ChainError> {
        Ok(MOCK_CHAIN_ID)
    }

    async fn code_at(&self, address: Address) -> Result<Bytes, ChainError> {
        Ok(self.state().code.get(&address).cloned().unwrap_or_default())
    }

    async fn storage_at(&self, address: Address, slot: B256) -> Result<B256, ChainError> {
        Ok(self
            .state()
            .storage
            .get(&(address, slot))
            .copied()
            .unwrap_or_default())
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError> {
        let mut state = self.state();
        let output = match selector(&data)? {
            IStrategy::poolCall::SELECTOR => (POOL,).abi_encode_params(),
            IStrategy::collateralTokenCall::SELECTOR => (COLLATERAL,).abi_encode_params(),
            IStrategy::poolAccountantCall::SELECTOR => (ACCOUNTANT,).abi_encode_params(),
            IStrategy::governorCall::SELECTOR => (state.governor_of(to),).abi_encode_params(),
            IStrategy::keepersCall::SELECTOR => {
                let keepers = state.keepers.get(&to).cloned().unwrap_or_default();
                (keepers,).abi_encode_params()
            }
            IStrategy::isActiveCall::SELECTOR => (state.active.contains(&to),).abi_encode_params(),
            IERC20::allowanceCall::SELECTOR => {
                let call: IERC20::allowanceCall = decode(&data)?;
                state.allowance_queries.push((to, call.spender));
                let allowance = state
                    .allowances
                    .get(&call.owner)
                    .copied()
                    .unwrap_or(state.default_allowance);
                (allowance,).abi_encode_params()
            }
            other => {
                return Err(ChainError::Reverted(format!("unknown selector {:?}", other)));
            }
        };

        Ok(output.into())
    }

    async fn deploy(&self, from: Address, init_code: Bytes) -> Result<DeployReceipt, ChainError> {
        let mut state = self.state();
        if !state.signers.contains(&from) {
            return Err(ChainError::UnknownSigner(from));
        }

        let nonce = state.deployed.len() as u64;
        let address = Address::from_word(B256::from(U256::from(0x1000 + nonce)));

        let proxy_code = Bytes::from_str(PROXY_BYTECODE).unwrap();
        if let Some(args) = init_code.strip_prefix(&proxy_code[..]) {
            let (implementation, _init_data) =
                <(Address, Bytes)>::abi_decode_params(args, true)
                    .map_err(|e| ChainError::Reverted(e.to_string()))?;
            state.storage.insert(
                (address, implementation_slot()),
                B256::left_padding_from(implementation.as_slice()),
            );
        }

        state.code.insert(address, init_code.clone());
        state.deployed.push(DeployedTx {
            from,
            address,
            init_code,
        });

        Ok(DeployReceipt {
            address,
            tx_hash: TxHash::from(U256::from(nonce + 1)),
        })
    }

    async fn send(&self, from: Address, to: Address, data: Bytes) -> Result<TxHash, ChainError> {
        let mut state = self.state();
        if let Some(error) = state.next_send_failure.take() {
            return Err(error);
        }
        if !state.signers.contains(&from) {
            return Err(ChainError::UnknownSigner(from));
        }

        match selector(&data)? {
            IStrategy::addKeeperCall::SELECTOR => {
                state.require_governor(from, to)?;
                let call: IStrategy::addKeeperCall = decode(&data)?;
                state.keepers.entry(to).or_default().push(call.keeperAddress);
            }
            IStrategy::upgradeToAndCallCall::SELECTOR => {
                state.require_governor(from, to)?;
                let call: IStrategy::upgradeToAndCallCall = decode(&data)?;
                state.storage.insert(
                    (to, implementation_slot()),
                    B256::left_padding_from(call.newImplementation.as_slice()),
                );
            }
            IStrategy::approveTokenCall::SELECTOR => {
                let call: IStrategy::approveTokenCall = decode(&data)?;
                state.allowances.insert(to, call.approvalAmount);
            }
            IPoolAccountant::addStrategyCall::SELECTOR => {
                if from != state.default_governor {
                    return Err(ChainError::Unauthorized("not-governor".to_string()));
                }
                let call: IPoolAccountant::addStrategyCall = decode(&data)?;
                state.active.insert(call.strategy);
            }
            _ => {}
        }

        state.sent.push(SentTx { from, to, data });
        Ok(TxHash::from(U256::from(0x10000 + state.sent.len())))
    }

    async fn impersonate(&self, account: Address, _balance: U256) -> Result<(), ChainError> {
        self.state().signers.insert(account);
        Ok(())
    }
}

// ------------
// | Fixtures |
// ------------

/// The ABI of the strategy fixture
pub fn strategy_abi() -> JsonAbi {
    JsonAbi::parse([
        "function initialize(address pool, address swapper, address receiptToken, string name)",
        "function pool() view returns (address)",
        "function collateralToken() view returns (address)",
        "function governor() view returns (address)",
        "function keepers() view returns (address[])",
        "function isActive() view returns (bool)",
        "function poolAccountant() view returns (address)",
        "function addKeeper(address keeperAddress)",
        "function approveToken(uint256 approvalAmount)",
        "function upgradeToAndCall(address newImplementation, bytes data) payable",
        "function supportsInterface(bytes4 interfaceId) view returns (bool)",
    ])
    .unwrap()
}

/// The storage layout of the strategy fixture
pub fn yearn_layout() -> StorageLayout {
    serde_json::from_value(json!({
        "storage": [
            { "contract": "Yearn", "label": "_initialized", "offset": 0, "slot": "0", "type": "t_uint8" },
            { "contract": "Yearn", "label": "pool", "offset": 0, "slot": "1", "type": "t_address" },
            { "contract": "Yearn", "label": "__gap", "offset": 0, "slot": "2", "type": "t_array(t_uint256)49_storage" }
        ],
        "types": {
            "t_uint8": { "encoding": "inplace", "label": "uint8", "numberOfBytes": "1" },
            "t_address": { "encoding": "inplace", "label": "address", "numberOfBytes": "20" },
            "t_uint256": { "encoding": "inplace", "label": "uint256", "numberOfBytes": "32" },
            "t_array(t_uint256)49_storage": {
                "encoding": "inplace",
                "label": "uint256[49]",
                "numberOfBytes": "1568",
                "base": "t_uint256"
            }
        }
    }))
    .unwrap()
}

/// Write a Hardhat-style strategy artifact under `root/artifacts`, returning its path
pub fn write_artifact(
    root: &Path,
    name: &str,
    bytecode: &str,
    layout: Option<&StorageLayout>,
) -> PathBuf {
    let dir = root.join("artifacts/contracts").join(format!("{}.sol", name));
    fs::create_dir_all(&dir).unwrap();

    let path = dir.join(format!("{}.json", name));
    fs::write(
        &path,
        json!({
            "contractName": name,
            "abi": strategy_abi(),
            "bytecode": bytecode,
            "storageLayout": layout,
        })
        .to_string(),
    )
    .unwrap();

    path
}

/// Write the proxy artifact under `root/artifacts`, returning its path
pub fn write_proxy_artifact(root: &Path) -> PathBuf {
    let dir = root.join("artifacts/ERC1967Proxy.sol");
    fs::create_dir_all(&dir).unwrap();

    let abi = JsonAbi::parse([
        "constructor(address implementation, bytes _data) payable",
        "event Upgraded(address indexed implementation)",
    ])
    .unwrap();

    let path = dir.join("ERC1967Proxy.json");
    fs::write(
        &path,
        json!({ "contractName": "ERC1967Proxy", "abi": abi, "bytecode": PROXY_BYTECODE })
            .to_string(),
    )
    .unwrap();

    path
}

/// A context over `chain` whose stores live in a fresh temporary directory
pub fn test_context(
    chain: MockChain,
    network: &str,
    deployer: Option<Address>,
) -> (DeployContext, TempDir) {
    let dir = tempdir().unwrap();
    write_artifact(dir.path(), "Yearn", YEARN_BYTECODE, Some(&yearn_layout()));
    write_proxy_artifact(dir.path());

    let ctx = DeployContext {
        network: Network::new(network, MOCK_CHAIN_ID),
        deployer,
        chain: Arc::new(chain),
        deployments: DeploymentStore::new(&dir.path().join("deployments"), network, MOCK_CHAIN_ID),
        artifacts: ArtifactStore::new(dir.path().join("artifacts")),
        safe_batch: SafeBatch::new(&dir.path().join("safe-batch"), network),
        verifier: None,
    };

    (ctx, dir)
}
