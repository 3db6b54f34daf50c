//! Definitions of CLI arguments and commands for the strategy scripts

use std::{path::PathBuf, sync::Arc};

use alloy_primitives::Address;
use clap::{Args, Parser, Subcommand};

use crate::{
    artifacts::ArtifactStore,
    chain::{setup_client, Chain},
    commands::{create_release, deploy, impersonate, safe_batch},
    constants::LOCAL_NETWORKS,
    context::DeployContext,
    deployments::DeploymentStore,
    errors::ScriptError,
    safe::SafeBatch,
    types::Network,
    verify::{EtherscanVerifier, Verifier},
};

/// Deploy, upgrade and release proxied strategies
#[derive(Parser)]
#[command(name = "strategy-scripts")]
pub struct Cli {
    /// Private key of the operator
    #[arg(short, long, env = "PRIVATE_KEY", hide_env_values = true)]
    pub priv_key: Option<String>,

    /// Network RPC URL
    #[arg(short, long, env = "RPC_URL")]
    pub rpc_url: Option<String>,

    /// The network name, which selects the deployments directory
    #[arg(short, long, env = "NETWORK")]
    pub network: Option<String>,

    /// The account deployments are sent from
    #[arg(short, long, env = "DEPLOYER")]
    pub deployer: Option<Address>,

    /// API key of the Etherscan-compatible explorer used for source verification
    #[arg(long, env = "ETHERSCAN_API_KEY", hide_env_values = true)]
    pub etherscan_api_key: Option<String>,

    /// Explorer API endpoint, for chains without a known default
    #[arg(long)]
    pub explorer_api_url: Option<String>,

    /// Root of the per-network deployment records
    #[arg(long, env = "DEPLOYMENTS_PATH", default_value = "deployments")]
    pub deployments_path: PathBuf,

    /// Root of the release manifests
    #[arg(long, env = "RELEASES_PATH", default_value = "releases")]
    pub releases_path: PathBuf,

    /// Root of the compiled contract artifacts
    #[arg(long, env = "ARTIFACTS_PATH", default_value = "artifacts")]
    pub artifacts_path: PathBuf,

    /// Root of the per-network Safe batches
    #[arg(long, env = "SAFE_BATCH_PATH", default_value = "safe-batch")]
    pub safe_batch_path: PathBuf,

    /// The command to run
    #[command(subcommand)]
    pub command: Command,
}

/// The available commands
#[derive(Subcommand)]
pub enum Command {
    /// Deploy or upgrade the declared strategies, then configure them
    Deploy(DeployArgs),
    /// Create or update a release manifest from every network's deployments
    CreateRelease(CreateReleaseArgs),
    /// Impersonate the deployer on a local fork and fund it
    Impersonate,
    /// Export the queued multisig transactions for the Safe Transaction Builder
    SafeBatch(SafeBatchArgs),
}

/// Deploy and configure strategies
#[derive(Args)]
pub struct DeployArgs {
    /// JSON file holding the array of strategy declarations
    #[arg(long)]
    pub declarations: PathBuf,

    /// Only deploy the strategies with these aliases
    #[arg(long, num_args = 1..)]
    pub only: Vec<String>,
}

/// Create a release
#[derive(Args)]
pub struct CreateReleaseArgs {
    /// The semantic version of the release
    #[arg(long)]
    pub release: String,
}

/// Export the Safe batch
#[derive(Args)]
pub struct SafeBatchArgs {
    /// File to write the Transaction Builder document to, stdout if omitted
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Empty the batch once it has been exported
    #[arg(long)]
    pub clear: bool,
}

impl Cli {
    /// Run the selected command
    pub async fn run(self) -> Result<(), ScriptError> {
        match &self.command {
            // Releases are assembled from every network's files alone
            Command::CreateRelease(args) => {
                create_release(&args.release, &self.deployments_path, &self.releases_path)
            }
            Command::Deploy(args) => {
                let ctx = self.context().await?;
                deploy(&ctx, &args.declarations, &args.only).await
            }
            Command::Impersonate => impersonate(&self.context().await?).await,
            Command::SafeBatch(args) => {
                let ctx = self.context().await?;
                safe_batch(&ctx, args.output.as_deref(), args.clear)
            }
        }
    }

    /// Connect to the network and assemble the deployment context
    async fn context(&self) -> Result<DeployContext, ScriptError> {
        let network_name = required(&self.network, "NETWORK")?;
        let priv_key = required(&self.priv_key, "PRIVATE_KEY")?;
        let rpc_url = required(&self.rpc_url, "RPC_URL")?;

        // Local dev nodes sign for impersonated senders
        let impersonation = LOCAL_NETWORKS.contains(&network_name);
        let chain = setup_client(priv_key, rpc_url, impersonation).await?;
        let chain_id = chain
            .chain_id()
            .await
            .map_err(|e| ScriptError::ClientInitialization(e.to_string()))?;
        let network = Network::new(network_name, chain_id);

        Ok(DeployContext {
            deployer: self.deployer,
            chain: Arc::new(chain),
            deployments: DeploymentStore::new(&self.deployments_path, &network.name, chain_id),
            artifacts: ArtifactStore::new(self.artifacts_path.clone()),
            safe_batch: SafeBatch::new(&self.safe_batch_path, &network.name),
            verifier: self.verifier(&network)?,
            network,
        })
    }

    /// The explorer client, if an API key is set and the chain has an endpoint
    fn verifier(&self, network: &Network) -> Result<Option<Arc<dyn Verifier>>, ScriptError> {
        let Some(api_key) = &self.etherscan_api_key else {
            return Ok(None);
        };
        let api_url = match &self.explorer_api_url {
            Some(url) => url.clone(),
            None => match network.explorer_api_url() {
                Some(url) => url.to_string(),
                None => return Ok(None),
            },
        };

        let verifier = EtherscanVerifier::new(api_url, api_key.clone())?;
        Ok(Some(Arc::new(verifier)))
    }
}

/// The value of a setting, or an error naming it
fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, ScriptError> {
    value
        .as_deref()
        .ok_or_else(|| ScriptError::InvalidParameter(format!("{} is not set", name)))
}
