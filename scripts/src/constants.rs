//! Constants used in the deploy scripts

use std::time::Duration;

/// The name of the Raffle contract artifact
pub const RAFFLE_CONTRACT_NAME: &str = "Raffle";

/// The name of the VRF coordinator mock contract artifact
pub const VRF_COORDINATOR_MOCK_CONTRACT_NAME: &str = "VRFCoordinatorV2Mock";

/// The amount, in wei, with which a mock subscription is funded (1 ether)
///
/// The mock does not move any real funds, so this is a placeholder value
pub const SUBSCRIPTION_FUND_AMOUNT_WEI: u128 = 1_000_000_000_000_000_000;

/// The premium, in LINK wei, charged by the mock coordinator per request (0.25 LINK)
pub const MOCK_BASE_FEE_WEI: u128 = 250_000_000_000_000_000;

/// The LINK per gas price configured on the mock coordinator
pub const MOCK_GAS_PRICE_LINK: u128 = 1_000_000_000;

/// The names of the networks on which mocks are deployed and verification is skipped
pub const DEVELOPMENT_CHAINS: [&str; 3] = ["hardhat", "localhost", "anvil"];

/// The number of confirmations to wait for a deployment transaction when the
/// network config does not specify one
pub const DEFAULT_DEPLOY_CONFIRMATIONS: u64 = 1;

/// The network configuration table compiled into the binary
pub const DEFAULT_NETWORK_CONFIG: &str = include_str!("../config/networks.json");

/// The default path of the deployments file
pub const DEFAULT_DEPLOYMENTS_PATH: &str = "deployments.json";

/// The default directory containing compiled contract artifacts
pub const DEFAULT_ARTIFACTS_DIR: &str = "artifacts";

/// The name of the directory holding Hardhat build info files
pub const BUILD_INFO_DIR: &str = "build-info";

/// The suffix of a Hardhat debug file, which points at the build info
pub const DBG_FILE_SUFFIX: &str = ".dbg.json";

/// The default RPC URL, a local node
pub const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8545";

/// The default Etherscan API endpoint
pub const DEFAULT_ETHERSCAN_API_URL: &str = "https://api.etherscan.io/v2/api";

/// The code format used when submitting sources for verification
pub const ETHERSCAN_CODE_FORMAT: &str = "solidity-standard-json-input";

/// The number of times the verification status is polled
pub const VERIFY_STATUS_POLL_ATTEMPTS: usize = 10;

/// The interval between verification status polls
pub const VERIFY_STATUS_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// The separator logged at the end of every deployment step
pub const LOG_SEPARATOR: &str = "----------------------------------------------------";
