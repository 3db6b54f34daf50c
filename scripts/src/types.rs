//! Type definitions used throughout the scripts

use std::fmt::{self, Display};

use crate::constants::{
    ETHERSCAN_BASE_API_URL, ETHERSCAN_MAINNET_API_URL, ETHERSCAN_OPTIMISM_API_URL, LOCAL_NETWORKS,
};

/// The network the scripts run against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Network {
    /// The network name, which also names its deployments directory
    pub name: String,
    /// The EIP-155 chain ID
    pub chain_id: u64,
}

impl Network {
    /// Construct a network
    pub fn new(name: impl Into<String>, chain_id: u64) -> Self {
        Self {
            name: name.into(),
            chain_id,
        }
    }

    /// Whether this is a local development network
    pub fn is_local(&self) -> bool {
        LOCAL_NETWORKS.contains(&self.name.as_str())
    }

    /// The default Etherscan-compatible API endpoint for this chain, if one is known
    pub fn explorer_api_url(&self) -> Option<&'static str> {
        match self.chain_id {
            1 => Some(ETHERSCAN_MAINNET_API_URL),
            10 => Some(ETHERSCAN_OPTIMISM_API_URL),
            8453 => Some(ETHERSCAN_BASE_API_URL),
            _ => None,
        }
    }
}

impl Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.chain_id)
    }
}
