//! The chain client used by the deploy scripts, and its JSON-RPC implementation

use std::{
    error::Error,
    fmt::{self, Display, Formatter},
    str::FromStr,
};

use alloy::{
    network::{EthereumWallet, TransactionBuilder},
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::types::TransactionRequest,
    signers::local::PrivateKeySigner,
    transports::{http::reqwest::Url, RpcError, TransportErrorKind},
};
use alloy_primitives::{Address, Bytes, TxHash, B256, U256};
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use tracing::debug;

use crate::{
    constants::{UNAUTHORIZED_REVERT_MARKERS, UNKNOWN_SIGNER_MARKERS},
    errors::ScriptError,
};

/// Failures surfaced by a [`Chain`]
///
/// The governance dispatcher relies on the distinction between the first two variants
/// (the call may be queued for the multisig) and the rest (the call failed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// No key is available to sign for the sender
    UnknownSigner(Address),
    /// The call reverted because the sender is not permitted to make it
    Unauthorized(String),
    /// The transaction reverted for any other reason
    Reverted(String),
    /// The RPC request itself failed
    Transport(String),
}

impl Display for ChainError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ChainError::UnknownSigner(address) => write!(f, "unknown signer {:#x}", address),
            ChainError::Unauthorized(s) => write!(f, "unauthorized sender: {}", s),
            ChainError::Reverted(s) => write!(f, "transaction reverted: {}", s),
            ChainError::Transport(s) => write!(f, "rpc error: {}", s),
        }
    }
}

impl Error for ChainError {}

/// The result of a contract creation transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeployReceipt {
    /// The address of the created contract
    pub address: Address,
    /// The hash of the creation transaction
    pub tx_hash: TxHash,
}

/// The narrow set of chain interactions the scripts need.
///
/// Every method is a blocking round trip from the caller's point of view; the scripts
/// never issue two of them concurrently.
#[async_trait]
pub trait Chain: Send + Sync {
    /// The chain ID of the connected network
    async fn chain_id(&self) -> Result<u64, ChainError>;

    /// The runtime code at `address`, empty if no contract lives there
    async fn code_at(&self, address: Address) -> Result<Bytes, ChainError>;

    /// The raw value of a storage slot
    async fn storage_at(&self, address: Address, slot: B256) -> Result<B256, ChainError>;

    /// Execute a read-only call against the latest block
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError>;

    /// Send a contract creation transaction and wait for its receipt
    async fn deploy(&self, from: Address, init_code: Bytes) -> Result<DeployReceipt, ChainError>;

    /// Send a transaction from `from` and wait for its receipt
    async fn send(&self, from: Address, to: Address, data: Bytes) -> Result<TxHash, ChainError>;

    /// Impersonate `account` and set its balance; only supported by local dev nodes
    async fn impersonate(&self, account: Address, balance: U256) -> Result<(), ChainError>;
}

/// Execute a view call and decode its return values
pub async fn read<C: SolCall>(
    chain: &dyn Chain,
    to: Address,
    call: C,
) -> Result<C::Return, ScriptError> {
    let output = chain
        .call(to, call.abi_encode().into())
        .await
        .map_err(|e| ScriptError::ContractInteraction(format!("{}: {}", C::SIGNATURE, e)))?;

    C::abi_decode_returns(&output, true /* validate */)
        .map_err(|e| ScriptError::Serde(format!("{}: {}", C::SIGNATURE, e)))
}

// ------------
// | JSON-RPC |
// ------------

/// A [`Chain`] backed by an HTTP JSON-RPC endpoint and a local private key
pub struct RpcChain {
    /// Provider that signs with the local key
    signed: DynProvider,
    /// Provider that leaves signing to the node, used for impersonated senders
    unsigned: DynProvider,
    /// The address of the local key
    signer: Address,
    /// Whether the node signs for arbitrary senders (local forks only)
    impersonation: bool,
}

impl RpcChain {
    /// The address transactions are signed with
    pub fn signer(&self) -> Address {
        self.signer
    }

    /// Pick the provider able to send from `from`
    fn provider_for(&self, from: Address) -> Result<&DynProvider, ChainError> {
        if from == self.signer {
            Ok(&self.signed)
        } else if self.impersonation {
            Ok(&self.unsigned)
        } else {
            Err(ChainError::UnknownSigner(from))
        }
    }

    /// Send a transaction request and wait for a successful receipt
    async fn send_request(
        &self,
        from: Address,
        tx: TransactionRequest,
    ) -> Result<(TxHash, Option<Address>), ChainError> {
        let provider = self.provider_for(from)?;
        if from != self.signer {
            // Local nodes only sign for senders they were told to impersonate
            provider
                .raw_request::<_, serde_json::Value>("hardhat_impersonateAccount".into(), (from,))
                .await
                .map_err(|e| match e {
                    RpcError::ErrorResp(_) => ChainError::UnknownSigner(from),
                    e => classify_rpc_error(from, e),
                })?;
        }

        let receipt = provider
            .send_transaction(tx.with_from(from))
            .await
            .map_err(|e| classify_rpc_error(from, e))?
            .get_receipt()
            .await
            .map_err(|e| ChainError::Transport(e.to_string()))?;

        if !receipt.status() {
            return Err(ChainError::Reverted(format!(
                "{:#x}",
                receipt.transaction_hash
            )));
        }

        Ok((receipt.transaction_hash, receipt.contract_address))
    }
}

/// Sets up the chain client, reading in the private key and RPC url.
///
/// When `impersonation` is set, transactions from senders other than the local key are
/// handed to the node unsigned after it is asked to impersonate the sender, which only dev
/// nodes support.
pub async fn setup_client(
    priv_key: &str,
    rpc_url: &str,
    impersonation: bool,
) -> Result<RpcChain, ScriptError> {
    let url =
        Url::from_str(rpc_url).map_err(|e| ScriptError::ClientInitialization(e.to_string()))?;
    let wallet = PrivateKeySigner::from_str(priv_key)
        .map_err(|e| ScriptError::ClientInitialization(e.to_string()))?;
    let signer = wallet.address();

    let signed = ProviderBuilder::new()
        .wallet(EthereumWallet::from(wallet))
        .on_http(url.clone())
        .erased();
    let unsigned = ProviderBuilder::new().on_http(url).erased();

    let chain_id = signed
        .get_chain_id()
        .await
        .map_err(|e| ScriptError::ClientInitialization(e.to_string()))?;
    debug!(chain_id, signer = %signer, "connected to rpc endpoint");

    Ok(RpcChain {
        signed,
        unsigned,
        signer,
        impersonation,
    })
}

/// Sort an RPC failure for a request sent as `from` into the [`ChainError`] taxonomy
fn classify_rpc_error(from: Address, err: RpcError<TransportErrorKind>) -> ChainError {
    match err {
        RpcError::ErrorResp(payload) => classify_error_message(from, &payload.message),
        err => ChainError::Transport(err.to_string()),
    }
}

/// Sort a node error message by the markers it contains
fn classify_error_message(from: Address, message: &str) -> ChainError {
    let lowercase = message.to_lowercase();
    let contains_any = |markers: &[&str]| markers.iter().any(|m| lowercase.contains(m));

    if contains_any(&UNKNOWN_SIGNER_MARKERS) {
        ChainError::UnknownSigner(from)
    } else if contains_any(&UNAUTHORIZED_REVERT_MARKERS) {
        ChainError::Unauthorized(message.to_string())
    } else if lowercase.contains("revert") {
        ChainError::Reverted(message.to_string())
    } else {
        ChainError::Transport(message.to_string())
    }
}

#[async_trait]
impl Chain for RpcChain {
    async fn chain_id(&self) -> Result<u64, ChainError> {
        self.signed.get_chain_id().await.map_err(|e| classify_rpc_error(self.signer, e))
    }

    async fn code_at(&self, address: Address) -> Result<Bytes, ChainError> {
        self.signed
            .get_code_at(address)
            .await
            .map_err(|e| classify_rpc_error(self.signer, e))
    }

    async fn storage_at(&self, address: Address, slot: B256) -> Result<B256, ChainError> {
        let value = self
            .signed
            .get_storage_at(address, U256::from_be_bytes(slot.0))
            .await
            .map_err(|e| classify_rpc_error(self.signer, e))?;

        Ok(B256::from(value.to_be_bytes::<32>()))
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError> {
        let tx = TransactionRequest::default().with_to(to).with_input(data);
        self.signed.call(&tx).await.map_err(|e| classify_rpc_error(self.signer, e))
    }

    async fn deploy(&self, from: Address, init_code: Bytes) -> Result<DeployReceipt, ChainError> {
        let tx = TransactionRequest::default().with_deploy_code(init_code);
        let (tx_hash, address) = self.send_request(from, tx).await?;
        let address = address.ok_or_else(|| {
            ChainError::Reverted(format!("no contract address in receipt of {:#x}", tx_hash))
        })?;

        Ok(DeployReceipt { address, tx_hash })
    }

    async fn send(&self, from: Address, to: Address, data: Bytes) -> Result<TxHash, ChainError> {
        let tx = TransactionRequest::default().with_to(to).with_input(data);
        let (tx_hash, _) = self.send_request(from, tx).await?;
        Ok(tx_hash)
    }

    async fn impersonate(&self, account: Address, balance: U256) -> Result<(), ChainError> {
        self.unsigned
            .raw_request::<_, serde_json::Value>("hardhat_impersonateAccount".into(), (account,))
            .await
            .map_err(|e| classify_rpc_error(account, e))?;
        self.unsigned
            .raw_request::<_, serde_json::Value>("hardhat_setBalance".into(), (account, balance))
            .await
            .map_err(|e| classify_rpc_error(account, e))?;

        Ok(())
    }
}
