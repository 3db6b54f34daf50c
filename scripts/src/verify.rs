//! Source verification on Etherscan-compatible block explorers
//!
//! Verification is best effort: failures are logged and never abort a deployment.

use std::time::Duration;

use alloy_primitives::{hex, Address};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::{
    artifacts::Artifact,
    constants::{ALREADY_VERIFIED_MESSAGE, VERIFY_REQUEST_TIMEOUT_SECS},
    context::DeployContext,
    errors::ScriptError,
};

/// The explorer's answer to a verification request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationStatus {
    /// The request was accepted, identified by the returned GUID
    Submitted(String),
    /// The explorer already has the source
    AlreadyVerified,
}

/// A service able to publish contract sources
#[async_trait]
pub trait Verifier: Send + Sync {
    /// Submit the source of the contract deployed at `address`
    async fn verify_source(
        &self,
        address: Address,
        artifact: &Artifact,
        constructor_args: &[u8],
    ) -> Result<VerificationStatus, ScriptError>;

    /// Mark `proxy` as a proxy for `implementation`
    async fn link_proxy(
        &self,
        proxy: Address,
        implementation: Address,
    ) -> Result<VerificationStatus, ScriptError>;
}

/// The common envelope of Etherscan API responses
#[derive(Debug, Deserialize)]
struct EtherscanResponse {
    /// `1` on success, `0` otherwise
    status: String,
    /// A short status text
    #[allow(dead_code)]
    message: String,
    /// The GUID of a submission, or the error or status detail
    result: String,
}

/// A [`Verifier`] talking to an Etherscan-compatible API
pub struct EtherscanVerifier {
    /// The HTTP client
    client: Client,
    /// The API endpoint
    api_url: String,
    /// The API key
    api_key: String,
}

impl EtherscanVerifier {
    /// Create a verifier for the given endpoint
    pub fn new(api_url: String, api_key: String) -> Result<Self, ScriptError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(VERIFY_REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| ScriptError::ClientInitialization(e.to_string()))?;

        Ok(Self {
            client,
            api_url,
            api_key,
        })
    }

    /// Post a form to the contract module of the API
    async fn post(
        &self,
        action: &str,
        params: Vec<(&str, String)>,
    ) -> Result<VerificationStatus, ScriptError> {
        let mut form = vec![
            ("apikey", self.api_key.clone()),
            ("module", "contract".to_string()),
            ("action", action.to_string()),
        ];
        form.extend(params);

        let response = self
            .client
            .post(&self.api_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| ScriptError::ContractInteraction(format!("{}: {}", action, e)))?;
        if !response.status().is_success() {
            return Err(ScriptError::ContractInteraction(format!(
                "{}: explorer responded with {}",
                action,
                response.status()
            )));
        }

        let body: EtherscanResponse = response
            .json()
            .await
            .map_err(|e| ScriptError::Serde(format!("{}: {}", action, e)))?;
        interpret_response(body)
    }
}

#[async_trait]
impl Verifier for EtherscanVerifier {
    async fn verify_source(
        &self,
        address: Address,
        artifact: &Artifact,
        constructor_args: &[u8],
    ) -> Result<VerificationStatus, ScriptError> {
        let build_info = artifact.build_info()?.ok_or_else(|| {
            ScriptError::ArtifactParsing(format!(
                "{} has no build info to verify with",
                artifact.contract_name
            ))
        })?;

        let params = vec![
            ("contractaddress", format!("{:#x}", address)),
            ("sourceCode", build_info.input.to_string()),
            ("codeformat", "solidity-standard-json-input".to_string()),
            ("contractname", artifact.qualified_name()),
            ("compilerversion", format!("v{}", build_info.solc_long_version)),
            // The explorer API misspells this parameter
            ("constructorArguements", hex::encode(constructor_args)),
        ];
        self.post("verifysourcecode", params).await
    }

    async fn link_proxy(
        &self,
        proxy: Address,
        implementation: Address,
    ) -> Result<VerificationStatus, ScriptError> {
        let params = vec![
            ("address", format!("{:#x}", proxy)),
            ("expectedimplementation", format!("{:#x}", implementation)),
        ];
        self.post("verifyproxycontract", params).await
    }
}

/// Map an API response onto a status, treating an already published source as success
fn interpret_response(response: EtherscanResponse) -> Result<VerificationStatus, ScriptError> {
    if response.status == "1" {
        return Ok(VerificationStatus::Submitted(response.result));
    }
    if response.result.to_lowercase().contains(ALREADY_VERIFIED_MESSAGE) {
        return Ok(VerificationStatus::AlreadyVerified);
    }

    Err(ScriptError::ContractInteraction(response.result))
}

/// Whether verification should be attempted at all in this context
fn verifier_for(ctx: &DeployContext) -> Option<&dyn Verifier> {
    if ctx.network.is_local() {
        debug!(network = %ctx.network.name, "skipping verification on local network");
        return None;
    }
    if ctx.verifier.is_none() {
        debug!(network = %ctx.network.name, "no explorer configured, skipping verification");
    }

    ctx.verifier.as_deref()
}

/// Log the outcome of a verification request without failing the flow
fn log_status(address: Address, result: Result<VerificationStatus, ScriptError>) {
    match result {
        Ok(VerificationStatus::Submitted(guid)) => {
            info!(address = %address, guid = %guid, "submitted source for verification")
        }
        Ok(VerificationStatus::AlreadyVerified) => {
            info!(address = %address, "source already verified")
        }
        Err(e) => warn!(address = %address, "verification failed: {}", e),
    }
}

/// Verify a deployed contract, logging rather than returning any failure
pub async fn verify_contract(
    ctx: &DeployContext,
    address: Address,
    artifact: &Artifact,
    constructor_args: &[u8],
) {
    if let Some(verifier) = verifier_for(ctx) {
        log_status(address, verifier.verify_source(address, artifact, constructor_args).await);
    }
}

/// Verify a freshly deployed proxy and link it to its implementation
pub async fn verify_proxy(
    ctx: &DeployContext,
    proxy: Address,
    implementation: Address,
    proxy_artifact: &Artifact,
    constructor_args: &[u8],
) {
    let Some(verifier) = verifier_for(ctx) else {
        return;
    };

    log_status(proxy, verifier.verify_source(proxy, proxy_artifact, constructor_args).await);
    log_status(proxy, verifier.link_proxy(proxy, implementation).await);
}
