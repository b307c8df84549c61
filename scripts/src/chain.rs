//! Chain access for the deploy scripts, backed by an alloy provider

use std::str::FromStr;

use alloy::{
    network::{Ethereum, TransactionBuilder},
    primitives::{aliases::U96, ruint::UintTryFrom, Address, Bytes, Log, U256},
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::types::TransactionRequest,
    signers::local::PrivateKeySigner,
    sol_types::SolEvent,
    transports::http::reqwest::Url,
};
use async_trait::async_trait;
use tracing::info;

use crate::{
    artifacts::ArtifactStore,
    deployments::DeploymentRecord,
    errors::ScriptError,
    solidity::VRFCoordinatorV2Mock::{self, VRFCoordinatorV2MockInstance},
    traits::{Deployer, VrfCoordinator},
};

/// The provider type used by the scripts, with the deployer's wallet attached
pub type Wallet = DynProvider<Ethereum>;

/// Sets up a provider signing with the given private key, returning it along
/// with the deployer's address
pub fn setup_client(priv_key: &str, rpc_url: &str) -> Result<(Wallet, Address), ScriptError> {
    let signer = PrivateKeySigner::from_str(priv_key)
        .map_err(|e| ScriptError::ClientInitialization(e.to_string()))?;
    let deployer = signer.address();

    let url = Url::parse(rpc_url).map_err(|e| ScriptError::ClientInitialization(e.to_string()))?;
    let provider = ProviderBuilder::new().wallet(signer).connect_http(url);

    Ok((DynProvider::new(provider), deployer))
}

/// Fetch the chain ID reported by the node
pub async fn fetch_chain_id(provider: &Wallet) -> Result<u64, ScriptError> {
    provider
        .get_chain_id()
        .await
        .map_err(|e| ScriptError::ClientInitialization(e.to_string()))
}

/// Deploys contracts from an artifacts directory through an alloy provider
#[derive(Clone)]
pub struct AlloyDeployer {
    /// The provider, signing as the deployer
    provider: Wallet,
    /// The deployer's address
    deployer: Address,
    /// The compiled contracts
    artifacts: ArtifactStore,
}

impl AlloyDeployer {
    /// Create a deployer sending from `deployer` through `provider`
    pub fn new(provider: Wallet, deployer: Address, artifacts: ArtifactStore) -> Self {
        Self {
            provider,
            deployer,
            artifacts,
        }
    }
}

#[async_trait]
impl Deployer for AlloyDeployer {
    type Coordinator = MockCoordinator;

    fn deployer_address(&self) -> Address {
        self.deployer
    }

    fn coordinator_at(&self, address: Address) -> MockCoordinator {
        MockCoordinator::new(address, self.provider.clone())
    }

    async fn deploy(
        &self,
        contract: &str,
        constructor_args: Bytes,
        confirmations: u64,
    ) -> Result<DeploymentRecord, ScriptError> {
        let artifact = self.artifacts.load(contract)?;
        let deploy_code: Bytes = [artifact.bytecode.as_ref(), constructor_args.as_ref()]
            .concat()
            .into();

        let tx = TransactionRequest::default()
            .with_from(self.deployer)
            .with_deploy_code(deploy_code);

        let pending_tx = self
            .provider
            .send_transaction(tx)
            .await
            .map_err(|e| ScriptError::ContractDeployment(e.to_string()))?;
        info!(
            "deploying \"{}\" (tx: {:#x})...",
            contract,
            pending_tx.tx_hash()
        );

        let receipt = pending_tx
            .with_required_confirmations(confirmations)
            .get_receipt()
            .await
            .map_err(|e| ScriptError::ContractDeployment(e.to_string()))?;

        if !receipt.status() {
            return Err(ScriptError::ContractDeployment(format!(
                "deployment of {} reverted in tx {:#x}",
                contract, receipt.transaction_hash
            )));
        }
        let address = receipt.contract_address.ok_or_else(|| {
            ScriptError::ContractDeployment(format!("no contract address in receipt of {contract}"))
        })?;
        info!(
            "deployed \"{}\" at {:#x} with {} gas",
            contract, address, receipt.gas_used
        );

        Ok(DeploymentRecord {
            address,
            transaction_hash: receipt.transaction_hash,
            block_number: receipt.block_number,
            args: constructor_args,
        })
    }

    async fn has_code(&self, address: Address) -> Result<bool, ScriptError> {
        let code = self
            .provider
            .get_code_at(address)
            .await
            .map_err(|e| ScriptError::ContractInteraction(e.to_string()))?;
        Ok(!code.is_empty())
    }
}

/// A deployed `VRFCoordinatorV2Mock`
#[derive(Clone)]
pub struct MockCoordinator {
    /// The contract binding
    instance: VRFCoordinatorV2MockInstance<Wallet>,
}

impl MockCoordinator {
    /// Bind to the mock at the given address
    pub fn new(address: Address, provider: Wallet) -> Self {
        Self {
            instance: VRFCoordinatorV2Mock::new(address, provider),
        }
    }
}

#[async_trait]
impl VrfCoordinator for MockCoordinator {
    fn address(&self) -> Address {
        *self.instance.address()
    }

    async fn create_subscription(&self) -> Result<u64, ScriptError> {
        let receipt = self
            .instance
            .createSubscription()
            .send()
            .await
            .map_err(|e| ScriptError::ContractInteraction(e.to_string()))?
            .get_receipt()
            .await
            .map_err(|e| ScriptError::ContractInteraction(e.to_string()))?;

        let logs: Vec<Log> = receipt
            .inner
            .logs()
            .iter()
            .map(|log| log.inner.clone())
            .collect();
        subscription_id_from_logs(&logs, self.address())
    }

    async fn fund_subscription(
        &self,
        subscription_id: u64,
        amount: U256,
    ) -> Result<(), ScriptError> {
        let amount = to_uint96(amount)?;
        self.instance
            .fundSubscription(subscription_id, amount)
            .send()
            .await
            .map_err(|e| ScriptError::ContractInteraction(e.to_string()))?
            .get_receipt()
            .await
            .map_err(|e| ScriptError::ContractInteraction(e.to_string()))?;

        Ok(())
    }

    async fn add_consumer(
        &self,
        subscription_id: u64,
        consumer: Address,
    ) -> Result<(), ScriptError> {
        self.instance
            .addConsumer(subscription_id, consumer)
            .send()
            .await
            .map_err(|e| ScriptError::ContractInteraction(e.to_string()))?
            .get_receipt()
            .await
            .map_err(|e| ScriptError::ContractInteraction(e.to_string()))?;

        Ok(())
    }
}

/// Narrow an amount to the `uint96` the coordinator accepts
fn to_uint96(amount: U256) -> Result<U96, ScriptError> {
    U96::uint_try_from(amount).map_err(|e| {
        ScriptError::CalldataConstruction(format!("{amount} does not fit in a uint96: {e}"))
    })
}

/// Extract the ID of a newly created subscription from the logs of the
/// creating transaction
pub fn subscription_id_from_logs(logs: &[Log], coordinator: Address) -> Result<u64, ScriptError> {
    logs.iter()
        .filter(|log| log.address == coordinator)
        .find_map(|log| VRFCoordinatorV2Mock::SubscriptionCreated::decode_log(log).ok())
        .map(|event| event.data.subId)
        .ok_or_else(|| {
            ScriptError::EventParse(format!(
                "no SubscriptionCreated event emitted by {coordinator:#x}"
            ))
        })
}
