//! Reading and writing deployment records in the deployments file
//!
//! The file maps network names to the contracts deployed on them:
//! ```json
//! {
//!     "sepolia": {
//!         "chain_id": 11155111,
//!         "contracts": {
//!             "Raffle": { "address": "0x..", "transaction_hash": "0x..", ... }
//!         }
//!     }
//! }
//! ```

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use alloy_primitives::{Address, Bytes, B256};
use serde::{Deserialize, Serialize};

use crate::errors::ScriptError;

/// The record of a single contract deployment
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    /// The address of the deployed contract
    pub address: Address,
    /// The hash of the deployment transaction
    pub transaction_hash: B256,
    /// The block in which the contract was deployed
    #[serde(default)]
    pub block_number: Option<u64>,
    /// The ABI-encoded constructor arguments
    #[serde(default)]
    pub args: Bytes,
}

/// The contracts deployed on a single network
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct NetworkDeployments {
    /// The chain ID of the network at deployment time
    chain_id: u64,
    /// Deployment records keyed by contract name
    contracts: BTreeMap<String, DeploymentRecord>,
}

/// The deployment records of every network, optionally backed by a file
#[derive(Debug, Default)]
pub struct DeploymentStore {
    /// The file the records are persisted to, if any
    path: Option<PathBuf>,
    /// The records, keyed by network name
    networks: BTreeMap<String, NetworkDeployments>,
}

impl DeploymentStore {
    /// A store which is never persisted
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load the store from the given file. A missing file yields an empty store
    /// which will be created on the first save.
    pub fn load(path: &Path) -> Result<Self, ScriptError> {
        let networks = if path.exists() {
            let contents = fs::read_to_string(path)
                .map_err(|e| ScriptError::ReadDeployments(e.to_string()))?;
            serde_json::from_str(&contents)
                .map_err(|e| ScriptError::ReadDeployments(e.to_string()))?
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path: Some(path.to_path_buf()),
            networks,
        })
    }

    /// Get the record of a contract deployed on the given network. Records
    /// written while the network ran under another chain ID are ignored.
    pub fn get(
        &self,
        network: &str,
        chain_id: u64,
        contract: &str,
    ) -> Option<&DeploymentRecord> {
        let deployments = self.networks.get(network)?;
        if deployments.chain_id != chain_id {
            return None;
        }
        deployments.contracts.get(contract)
    }

    /// Record a deployment, replacing any previous record of the contract
    pub fn insert(
        &mut self,
        network: &str,
        chain_id: u64,
        contract: &str,
        record: DeploymentRecord,
    ) {
        let deployments = self.networks.entry(network.to_string()).or_default();
        // A network whose chain ID changed has been reset, its old records are stale
        if deployments.chain_id != chain_id {
            deployments.contracts.clear();
            deployments.chain_id = chain_id;
        }
        deployments.contracts.insert(contract.to_string(), record);
    }

    /// Record a deployment and persist the store
    pub fn save_deployment(
        &mut self,
        network: &str,
        chain_id: u64,
        contract: &str,
        record: DeploymentRecord,
    ) -> Result<(), ScriptError> {
        self.insert(network, chain_id, contract, record);
        self.save()
    }

    /// Write the store to its backing file, if it has one
    pub fn save(&self) -> Result<(), ScriptError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let contents = serde_json::to_string_pretty(&self.networks)
            .map_err(|e| ScriptError::WriteDeployments(e.to_string()))?;
        fs::write(path, contents).map_err(|e| ScriptError::WriteDeployments(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{bytes, Address, B256};
    use eyre::Result;

    use super::*;

    fn record(last_byte: u8) -> DeploymentRecord {
        DeploymentRecord {
            address: Address::with_last_byte(last_byte),
            transaction_hash: B256::with_last_byte(last_byte),
            block_number: Some(last_byte as u64),
            args: bytes!("deadbeef"),
        }
    }

    #[test]
    fn test_missing_file_is_empty() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = DeploymentStore::load(&dir.path().join("deployments.json"))?;
        assert!(store.get("localhost", 31337, "Raffle").is_none());
        Ok(())
    }

    #[test]
    fn test_records_survive_reload() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("deployments.json");

        let mut store = DeploymentStore::load(&path)?;
        store.save_deployment("sepolia", 11155111, "Raffle", record(1))?;
        store.save_deployment("localhost", 31337, "Raffle", record(2))?;

        let reloaded = DeploymentStore::load(&path)?;
        assert_eq!(
            reloaded.get("sepolia", 11155111, "Raffle"),
            Some(&record(1))
        );
        assert_eq!(reloaded.get("localhost", 31337, "Raffle"), Some(&record(2)));
        assert!(reloaded
            .get("sepolia", 11155111, "VRFCoordinatorV2Mock")
            .is_none());
        Ok(())
    }

    #[test]
    fn test_chain_id_change_drops_stale_records() {
        let mut store = DeploymentStore::in_memory();
        store.insert("localhost", 31337, "VRFCoordinatorV2Mock", record(1));
        store.insert("localhost", 1337, "Raffle", record(2));

        assert!(store.get("localhost", 1337, "VRFCoordinatorV2Mock").is_none());
        assert_eq!(store.get("localhost", 1337, "Raffle"), Some(&record(2)));
    }

    #[test]
    fn test_records_of_other_chain_ignored() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("deployments.json");

        let mut store = DeploymentStore::load(&path)?;
        store.save_deployment("localhost", 31337, "VRFCoordinatorV2Mock", record(1))?;

        // The node was restarted under another chain ID
        let reloaded = DeploymentStore::load(&path)?;
        assert!(reloaded
            .get("localhost", 1337, "VRFCoordinatorV2Mock")
            .is_none());
        assert_eq!(
            reloaded.get("localhost", 31337, "VRFCoordinatorV2Mock"),
            Some(&record(1))
        );
        Ok(())
    }

    #[test]
    fn test_malformed_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("deployments.json");
        fs::write(&path, "not json")?;

        assert!(matches!(
            DeploymentStore::load(&path),
            Err(ScriptError::ReadDeployments(_))
        ));
        Ok(())
    }
}
