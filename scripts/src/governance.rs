//! Dispatch of privileged calls that must come from a strategy's governor
//!
//! A privileged call is first attempted directly. If the operator key cannot act as the
//! governor, the call is appended to the network's Safe batch instead, to be executed
//! later by the multisig owners.

use std::fmt::{self, Display};

use alloy_primitives::{Address, Bytes, TxHash};
use alloy_sol_types::SolCall;
use tracing::{info, warn};

use crate::{
    chain::{Chain, ChainError},
    context::DeployContext,
    errors::ScriptError,
    safe::PendingMultisigTx,
};

/// A call that only the governor is allowed to make
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivilegedCall {
    /// The governor the call must be sent from
    pub from: Address,
    /// The contract being called
    pub to: Address,
    /// The encoded call
    pub data: Bytes,
    /// A human readable description, used in logs
    pub description: String,
}

impl PrivilegedCall {
    /// Build a privileged call from a typed contract call
    pub fn new<C: SolCall>(from: Address, to: Address, call: C) -> Self {
        Self {
            from,
            to,
            data: call.abi_encode().into(),
            description: C::SIGNATURE.to_string(),
        }
    }
}

/// The three possible results of attempting a privileged call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallAttempt {
    /// The call was mined
    Executed(TxHash),
    /// The sender could not be used; the call belongs in the multisig batch
    Queued(PendingMultisigTx),
    /// The call failed for a reason queuing would not fix
    Failed(ChainError),
}

/// The successful outcomes of dispatching a privileged call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GovernanceOutcome {
    /// The call was executed directly
    Executed(TxHash),
    /// The call was queued for the multisig
    Queued,
}

impl Display for GovernanceOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GovernanceOutcome::Executed(tx_hash) => write!(f, "executed in {:#x}", tx_hash),
            GovernanceOutcome::Queued => write!(f, "queued for the multisig"),
        }
    }
}

/// Send the call from its governor, classifying the result
pub async fn attempt(chain: &dyn Chain, call: &PrivilegedCall) -> CallAttempt {
    match chain.send(call.from, call.to, call.data.clone()).await {
        Ok(tx_hash) => CallAttempt::Executed(tx_hash),
        Err(ChainError::UnknownSigner(_)) | Err(ChainError::Unauthorized(_)) => {
            CallAttempt::Queued(PendingMultisigTx::new(call.from, call.to, call.data.clone()))
        }
        Err(e) => CallAttempt::Failed(e),
    }
}

/// Execute the call directly if possible, otherwise queue it in the Safe batch
pub async fn execute_or_queue(
    ctx: &DeployContext,
    call: PrivilegedCall,
) -> Result<GovernanceOutcome, ScriptError> {
    match attempt(ctx.chain.as_ref(), &call).await {
        CallAttempt::Executed(tx_hash) => {
            info!(
                call = %call.description,
                to = %call.to,
                tx_hash = %tx_hash,
                "executed privileged call"
            );
            Ok(GovernanceOutcome::Executed(tx_hash))
        }
        CallAttempt::Queued(pending) => enqueue(ctx, pending, &call.description),
        CallAttempt::Failed(e) => Err(ScriptError::ContractInteraction(format!(
            "{} on {:#x}: {}",
            call.description, call.to, e
        ))),
    }
}

/// Append the call to the Safe batch without attempting it
pub fn queue_for_multisig(
    ctx: &DeployContext,
    call: &PrivilegedCall,
) -> Result<GovernanceOutcome, ScriptError> {
    let pending = PendingMultisigTx::new(call.from, call.to, call.data.clone());
    enqueue(ctx, pending, &call.description)
}

/// Append a pending call to the network's Safe batch
fn enqueue(
    ctx: &DeployContext,
    pending: PendingMultisigTx,
    description: &str,
) -> Result<GovernanceOutcome, ScriptError> {
    let (governor, to) = (pending.from, pending.to);
    if !ctx.safe_batch.append(pending)? {
        warn!(call = description, to = %to, "call was already queued");
    }

    info!(
        call = description,
        governor = %governor,
        to = %to,
        network = %ctx.network.name,
        "signer is not the governor, queued call for the multisig"
    );
    Ok(GovernanceOutcome::Queued)
}

/// Dispatch a typed call to `target` on behalf of `governor`
pub async fn execute_as_governor<C: SolCall>(
    ctx: &DeployContext,
    target: Address,
    call: C,
    governor: Address,
) -> Result<GovernanceOutcome, ScriptError> {
    execute_or_queue(ctx, PrivilegedCall::new(governor, target, call)).await
}
