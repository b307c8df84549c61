//! The on-chain and off-chain capabilities the deployment steps are written against

use alloy_primitives::{Address, Bytes, U256};
use async_trait::async_trait;

use crate::{deployments::DeploymentRecord, errors::ScriptError};

/// Deploys contracts from compiled artifacts on behalf of the deployer account
#[async_trait]
pub trait Deployer: Send + Sync {
    /// The handle used to interact with a deployed VRF coordinator
    type Coordinator: VrfCoordinator;

    /// The address of the deployer account
    fn deployer_address(&self) -> Address;

    /// Get a handle to the VRF coordinator at the given address
    fn coordinator_at(&self, address: Address) -> Self::Coordinator;

    /// Deploy the named contract with the given ABI-encoded constructor
    /// arguments, waiting for `confirmations` blocks
    async fn deploy(
        &self,
        contract: &str,
        constructor_args: Bytes,
        confirmations: u64,
    ) -> Result<DeploymentRecord, ScriptError>;

    /// Whether there is contract code at the given address
    async fn has_code(&self, address: Address) -> Result<bool, ScriptError>;
}

/// A VRF coordinator managing prepaid randomness subscriptions
#[async_trait]
pub trait VrfCoordinator: Send + Sync {
    /// The address of the coordinator contract
    fn address(&self) -> Address;

    /// Create a new subscription, returning its ID once the creating
    /// transaction is final
    async fn create_subscription(&self) -> Result<u64, ScriptError>;

    /// Fund the given subscription with `amount` wei
    async fn fund_subscription(&self, subscription_id: u64, amount: U256)
        -> Result<(), ScriptError>;

    /// Allow `consumer` to request randomness paid for by the subscription
    async fn add_consumer(&self, subscription_id: u64, consumer: Address)
        -> Result<(), ScriptError>;
}

/// Publishes the source of a deployed contract to a block explorer
#[async_trait]
pub trait ContractVerifier: Send + Sync {
    /// Verify the named contract deployed at `address` with the given
    /// ABI-encoded constructor arguments
    async fn verify(
        &self,
        contract: &str,
        address: Address,
        constructor_args: &Bytes,
    ) -> Result<(), ScriptError>;
}
