//! The per-chain network configuration table

use std::{collections::BTreeMap, fs, path::Path};

use alloy_primitives::{utils::parse_ether, Address, B256, U256};
use serde::{Deserialize, Deserializer};

use crate::{
    constants::{DEFAULT_NETWORK_CONFIG, DEVELOPMENT_CHAINS},
    errors::ScriptError,
};

/// Whether the named network is a local development network
pub fn is_development_network(network: &str) -> bool {
    DEVELOPMENT_CHAINS.contains(&network)
}

/// The deployment parameters configured for a single chain
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct NetworkConfig {
    /// A human-readable name for the chain
    pub name: String,
    /// The address of the VRF coordinator, only set on live networks
    #[serde(default)]
    pub vrf_coordinator_v2: Option<Address>,
    /// The VRF subscription used by the raffle, only set on live networks
    #[serde(default)]
    pub subscription_id: Option<u64>,
    /// The raffle entrance fee in wei, written in ether in the config file
    #[serde(deserialize_with = "deserialize_ether")]
    pub raffle_entrance_fee: U256,
    /// The key hash selecting the maximum gas price of the VRF callback
    pub gas_lane: B256,
    /// The gas limit of the VRF callback
    pub callback_gas_limit: u32,
    /// The number of seconds between raffle draws
    pub keepers_update_interval: u64,
    /// The number of confirmations to wait for when deploying
    #[serde(default)]
    pub block_confirmations: Option<u64>,
}

/// Parses an ether-denominated decimal string into wei
fn deserialize_ether<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
    let ether = String::deserialize(deserializer)?;
    parse_ether(&ether).map_err(serde::de::Error::custom)
}

/// The network configuration table, keyed by chain ID
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(transparent)]
pub struct NetworkConfigTable {
    /// The configured chains
    networks: BTreeMap<u64, NetworkConfig>,
}

impl NetworkConfigTable {
    /// Parse a table from its JSON representation
    pub fn from_json(json: &str) -> Result<Self, ScriptError> {
        serde_json::from_str(json).map_err(|e| ScriptError::ReadConfig(e.to_string()))
    }

    /// Load the table from the given file, falling back to the table
    /// compiled into the binary
    pub fn load(path: Option<&Path>) -> Result<Self, ScriptError> {
        match path {
            Some(path) => {
                let json = fs::read_to_string(path).map_err(|e| {
                    ScriptError::ReadConfig(format!("{}: {}", path.display(), e))
                })?;
                Self::from_json(&json)
            }
            None => Self::from_json(DEFAULT_NETWORK_CONFIG),
        }
    }

    /// Get the config for the given chain
    pub fn get(&self, chain_id: u64) -> Result<&NetworkConfig, ScriptError> {
        self.networks
            .get(&chain_id)
            .ok_or_else(|| ScriptError::ConfigMissing(format!("no entry for chain {chain_id}")))
    }

    /// Add or replace the config for a chain
    pub fn insert(&mut self, chain_id: u64, config: NetworkConfig) {
        self.networks.insert(chain_id, config);
    }
}

impl NetworkConfig {
    /// The VRF coordinator address of a live network
    pub fn vrf_coordinator(&self) -> Result<Address, ScriptError> {
        self.vrf_coordinator_v2.ok_or_else(|| {
            ScriptError::ConfigMissing(format!("no `vrf_coordinator_v2` for {}", self.name))
        })
    }

    /// The VRF subscription of a live network
    pub fn subscription(&self) -> Result<u64, ScriptError> {
        self.subscription_id.ok_or_else(|| {
            ScriptError::ConfigMissing(format!("no `subscription_id` for {}", self.name))
        })
    }
}
