//! Source verification through the Etherscan API

use std::time::Duration;

use alloy_primitives::{hex, Address, Bytes};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::info;

use crate::{
    artifacts::ArtifactStore,
    constants::{ETHERSCAN_CODE_FORMAT, VERIFY_STATUS_POLL_ATTEMPTS, VERIFY_STATUS_POLL_INTERVAL},
    errors::ScriptError,
    traits::ContractVerifier,
};

/// The envelope of every Etherscan API response
#[derive(Clone, Debug, Deserialize)]
struct EtherscanResponse {
    /// "1" on success, "0" otherwise
    status: String,
    /// A short status message, "OK" or "NOTOK"
    message: String,
    /// The payload, a GUID or a human readable status
    result: String,
}

/// The outcome of a `verifysourcecode` request
#[derive(Clone, Debug, PartialEq, Eq)]
enum SubmissionStatus {
    /// The submission was accepted and is tracked under the given GUID
    Submitted(String),
    /// The source was verified before
    AlreadyVerified,
    /// The explorer has not indexed the contract's bytecode yet
    NotIndexed,
    /// The submission was rejected
    Rejected(String),
}

/// The outcome of a `checkverifystatus` request
#[derive(Clone, Debug, PartialEq, Eq)]
enum CheckStatus {
    /// The source is verified
    Verified,
    /// The explorer has not processed the submission yet
    Pending,
    /// Verification failed
    Failed(String),
}

impl EtherscanResponse {
    /// Interpret the response to a `verifysourcecode` request
    fn submission_status(&self) -> SubmissionStatus {
        let result = self.result.to_lowercase();
        if result.contains("already verified") {
            SubmissionStatus::AlreadyVerified
        } else if result.contains("unable to locate contractcode") {
            SubmissionStatus::NotIndexed
        } else if self.status == "1" {
            SubmissionStatus::Submitted(self.result.clone())
        } else {
            SubmissionStatus::Rejected(self.failure_reason())
        }
    }

    /// Interpret the response to a `checkverifystatus` request
    fn check_status(&self) -> CheckStatus {
        let result = self.result.to_lowercase();
        if result.contains("already verified") || result.starts_with("pass") {
            CheckStatus::Verified
        } else if result.contains("pending") || result.contains("in queue") {
            CheckStatus::Pending
        } else {
            CheckStatus::Failed(self.failure_reason())
        }
    }

    /// The error text of a failed request
    fn failure_reason(&self) -> String {
        format!("{}: {}", self.message, self.result)
    }
}

/// Verifies contracts on Etherscan (or a compatible explorer) using the
/// Hardhat build info of the deployed artifacts
#[derive(Clone, Debug)]
pub struct EtherscanVerifier {
    /// The HTTP client
    client: Client,
    /// The API endpoint
    api_url: Url,
    /// The API key
    api_key: String,
    /// The chain the contracts are deployed on
    chain_id: u64,
    /// The compiled contracts
    artifacts: ArtifactStore,
    /// The delay between retried submissions and status checks
    poll_interval: Duration,
}

impl EtherscanVerifier {
    /// Create a verifier for contracts deployed on the given chain
    pub fn new(
        api_url: &str,
        api_key: String,
        chain_id: u64,
        artifacts: ArtifactStore,
    ) -> Result<Self, ScriptError> {
        let api_url = Url::parse(api_url).map_err(|e| ScriptError::Verification(e.to_string()))?;
        Ok(Self {
            client: Client::new(),
            api_url,
            api_key,
            chain_id,
            artifacts,
            poll_interval: VERIFY_STATUS_POLL_INTERVAL,
        })
    }

    /// Set the delay between retried submissions and status checks
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Submit a verification request
    async fn submit(&self, form: &[(&str, String)]) -> Result<EtherscanResponse, ScriptError> {
        self.client
            .post(self.api_url.clone())
            .query(&[("chainid", self.chain_id.to_string())])
            .form(form)
            .send()
            .await
            .map_err(|e| ScriptError::Verification(e.to_string()))?
            .json()
            .await
            .map_err(|e| ScriptError::Verification(e.to_string()))
    }

    /// Query the status of a submitted verification request
    async fn check(&self, guid: &str) -> Result<EtherscanResponse, ScriptError> {
        self.client
            .get(self.api_url.clone())
            .query(&[
                ("chainid", self.chain_id.to_string()),
                ("module", "contract".to_string()),
                ("action", "checkverifystatus".to_string()),
                ("guid", guid.to_string()),
                ("apikey", self.api_key.clone()),
            ])
            .send()
            .await
            .map_err(|e| ScriptError::Verification(e.to_string()))?
            .json()
            .await
            .map_err(|e| ScriptError::Verification(e.to_string()))
    }

    /// Submit the request, retrying while the explorer indexes the contract.
    /// Returns the GUID of the submission, or `None` if the contract is
    /// already verified.
    async fn submit_until_indexed(
        &self,
        form: &[(&str, String)],
    ) -> Result<Option<String>, ScriptError> {
        for _ in 0..VERIFY_STATUS_POLL_ATTEMPTS {
            match self.submit(form).await?.submission_status() {
                SubmissionStatus::Submitted(guid) => return Ok(Some(guid)),
                SubmissionStatus::AlreadyVerified => return Ok(None),
                SubmissionStatus::NotIndexed => {
                    info!("contract not yet indexed by the explorer, retrying...");
                    tokio::time::sleep(self.poll_interval).await;
                }
                SubmissionStatus::Rejected(reason) => {
                    return Err(ScriptError::Verification(reason))
                }
            }
        }

        Err(ScriptError::Verification(
            "explorer never indexed the contract".to_string(),
        ))
    }
}

#[async_trait]
impl ContractVerifier for EtherscanVerifier {
    async fn verify(
        &self,
        contract: &str,
        address: Address,
        constructor_args: &Bytes,
    ) -> Result<(), ScriptError> {
        let artifact = self.artifacts.load(contract)?;
        let build_info = self.artifacts.build_info(contract)?;
        let source_code = serde_json::to_string(&build_info.input)
            .map_err(|e| ScriptError::ArtifactParsing(e.to_string()))?;

        let form = [
            ("module", "contract".to_string()),
            ("action", "verifysourcecode".to_string()),
            ("apikey", self.api_key.clone()),
            ("codeformat", ETHERSCAN_CODE_FORMAT.to_string()),
            ("sourceCode", source_code),
            ("contractaddress", format!("{address:#x}")),
            ("contractname", artifact.fully_qualified_name()?),
            (
                "compilerversion",
                format!("v{}", build_info.solc_long_version),
            ),
            // Etherscan's spelling
            ("constructorArguements", hex::encode(constructor_args)),
        ];

        let Some(guid) = self.submit_until_indexed(&form).await? else {
            info!("{contract} at {address:#x} is already verified");
            return Ok(());
        };
        info!("submitted {contract} for verification, guid: {guid}");

        for _ in 0..VERIFY_STATUS_POLL_ATTEMPTS {
            tokio::time::sleep(self.poll_interval).await;
            match self.check(&guid).await?.check_status() {
                CheckStatus::Verified => {
                    info!("successfully verified {contract} at {address:#x}");
                    return Ok(());
                }
                CheckStatus::Failed(reason) => return Err(ScriptError::Verification(reason)),
                CheckStatus::Pending => {}
            }
        }

        Err(ScriptError::Verification(format!(
            "verification of {contract} still pending after {VERIFY_STATUS_POLL_ATTEMPTS} checks"
        )))
    }
}
