//! The explicit context threaded through every deployment operation

use std::sync::Arc;

use alloy_primitives::Address;

use crate::{
    artifacts::ArtifactStore, chain::Chain, deployments::DeploymentStore, errors::ScriptError,
    safe::SafeBatch, types::Network, verify::Verifier,
};

/// Everything a deployment step needs to know about where and as whom it runs
#[derive(Clone)]
pub struct DeployContext {
    /// The target network
    pub network: Network,
    /// The `deployer` named account, if configured
    pub deployer: Option<Address>,
    /// The chain client
    pub chain: Arc<dyn Chain>,
    /// The network's deployment records
    pub deployments: DeploymentStore,
    /// The compiled contracts
    pub artifacts: ArtifactStore,
    /// The queue of transactions awaiting the multisig
    pub safe_batch: SafeBatch,
    /// The source verifier, absent when no explorer is configured
    pub verifier: Option<Arc<dyn Verifier>>,
}

impl DeployContext {
    /// The deployer account, which every deployment step requires
    pub fn deployer(&self) -> Result<Address, ScriptError> {
        self.deployer.ok_or(ScriptError::MissingDeployerAccount)
    }
}
