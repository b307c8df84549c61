//! Type definitions used throughout the scripts

use std::fmt::{self, Display};

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::SolValue;
use clap::ValueEnum;

use crate::{
    config::{is_development_network, NetworkConfig, NetworkConfigTable},
    constants::DEFAULT_DEPLOY_CONFIRMATIONS,
    errors::ScriptError,
};

/// The Solidity types of the Raffle constructor parameters, in order
type RaffleConstructorParams = (Address, U256, B256, u64, u32, U256);

/// The arguments passed to the Raffle constructor
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeploymentArgs {
    /// The VRF coordinator the raffle requests randomness from
    pub vrf_coordinator: Address,
    /// The raffle entrance fee in wei
    pub entrance_fee: U256,
    /// The VRF gas lane key hash
    pub gas_lane: B256,
    /// The VRF subscription paying for randomness requests
    pub subscription_id: u64,
    /// The gas limit of the VRF callback
    pub callback_gas_limit: u32,
    /// The number of seconds between raffle draws
    pub interval: U256,
}

impl DeploymentArgs {
    /// Assemble the constructor arguments from the chain's config and the
    /// resolved coordinator and subscription
    pub fn new(vrf_coordinator: Address, subscription_id: u64, config: &NetworkConfig) -> Self {
        Self {
            vrf_coordinator,
            entrance_fee: config.raffle_entrance_fee,
            gas_lane: config.gas_lane,
            subscription_id,
            callback_gas_limit: config.callback_gas_limit,
            interval: U256::from(config.keepers_update_interval),
        }
    }

    /// ABI-encode the arguments as constructor parameters
    pub fn abi_encode(&self) -> Bytes {
        let params: RaffleConstructorParams = (
            self.vrf_coordinator,
            self.entrance_fee,
            self.gas_lane,
            self.subscription_id,
            self.callback_gas_limit,
            self.interval,
        );
        params.abi_encode_params().into()
    }

    /// Decode ABI-encoded constructor parameters
    pub fn abi_decode(data: &[u8]) -> Result<Self, ScriptError> {
        let (
            vrf_coordinator,
            entrance_fee,
            gas_lane,
            subscription_id,
            callback_gas_limit,
            interval,
        ) = RaffleConstructorParams::abi_decode_params(data)
            .map_err(|e| ScriptError::CalldataConstruction(e.to_string()))?;

        Ok(Self {
            vrf_coordinator,
            entrance_fee,
            gas_lane,
            subscription_id,
            callback_gas_limit,
            interval,
        })
    }
}

impl Display for DeploymentArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:#x}, {}, {}, {}, {}, {}]",
            self.vrf_coordinator,
            self.entrance_fee,
            self.gas_lane,
            self.subscription_id,
            self.callback_gas_limit,
            self.interval
        )
    }
}

/// Tags used to select deployment steps
#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
pub enum DeployTag {
    /// Every step
    All,
    /// The mock provisioning step
    Mocks,
    /// The raffle deployment step
    Raffle,
}

/// The deployment steps, in dependency order
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DeployStep {
    /// Deploy the VRF coordinator mock on development networks
    Mocks,
    /// Deploy the raffle contract
    Raffle,
}

impl DeployStep {
    /// All steps, ordered such that every step follows its dependencies
    pub const ALL: [DeployStep; 2] = [DeployStep::Mocks, DeployStep::Raffle];

    /// The tags which select this step
    pub fn tags(&self) -> &'static [DeployTag] {
        match self {
            DeployStep::Mocks => &[DeployTag::All, DeployTag::Mocks],
            DeployStep::Raffle => &[DeployTag::All, DeployTag::Raffle],
        }
    }

    /// The steps which must run before this one
    pub fn dependencies(&self) -> &'static [DeployStep] {
        match self {
            DeployStep::Mocks => &[],
            DeployStep::Raffle => &[DeployStep::Mocks],
        }
    }

    /// Select the steps carrying any of the given tags, along with their
    /// dependencies, in the order they must run
    pub fn select(tags: &[DeployTag]) -> Vec<DeployStep> {
        let mut selected: Vec<DeployStep> = Vec::new();
        for step in Self::ALL {
            if step.tags().iter().any(|tag| tags.contains(tag)) {
                step.add_with_dependencies(&mut selected);
            }
        }

        // `ALL` is topologically ordered, so re-sorting by it orders the selection
        Self::ALL
            .into_iter()
            .filter(|step| selected.contains(step))
            .collect()
    }

    /// Add this step and, transitively, its dependencies to the selection
    fn add_with_dependencies(self, selected: &mut Vec<DeployStep>) {
        if selected.contains(&self) {
            return;
        }
        selected.push(self);
        for dep in self.dependencies() {
            dep.add_with_dependencies(selected);
        }
    }
}

impl Display for DeployStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeployStep::Mocks => write!(f, "mocks"),
            DeployStep::Raffle => write!(f, "raffle"),
        }
    }
}

/// The network a deployment run targets
#[derive(Clone, Debug)]
pub struct DeployContext {
    /// The name of the network, used to detect development networks
    pub network: String,
    /// The chain ID reported by the node
    pub chain_id: u64,
    /// The static network configuration table
    pub network_config: NetworkConfigTable,
    /// A confirmation count overriding the network config
    pub confirmations: Option<u64>,
}

impl DeployContext {
    /// Whether the run targets a local development network
    pub fn is_development(&self) -> bool {
        is_development_network(&self.network)
    }

    /// The config entry for the active chain
    pub fn chain_config(&self) -> Result<&NetworkConfig, ScriptError> {
        self.network_config.get(self.chain_id)
    }

    /// The number of confirmations to wait for on deployment. A count of zero
    /// is treated as unset.
    pub fn confirmations(&self) -> u64 {
        self.confirmations
            .filter(|count| *count > 0)
            .or_else(|| {
                self.chain_config()
                    .ok()
                    .and_then(|config| config.block_confirmations)
                    .filter(|count| *count > 0)
            })
            .unwrap_or(DEFAULT_DEPLOY_CONFIRMATIONS)
    }
}
