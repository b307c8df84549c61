//! Definitions of CLI arguments and commands for deploy scripts

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::{
    artifacts::ArtifactStore,
    chain::{fetch_chain_id, setup_client, AlloyDeployer},
    commands::{deploy_mocks, deploy_raffle, run_steps, verify_deployment},
    config::NetworkConfigTable,
    constants::{
        DEFAULT_ARTIFACTS_DIR, DEFAULT_DEPLOYMENTS_PATH, DEFAULT_ETHERSCAN_API_URL,
        DEFAULT_RPC_URL, RAFFLE_CONTRACT_NAME,
    },
    deployments::DeploymentStore,
    errors::ScriptError,
    types::{DeployContext, DeployTag},
    verify::EtherscanVerifier,
};

/// Deploy the Raffle contract, and the mocks it depends on locally
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Private key of the deployer
    #[arg(short, long, env = "PRIVATE_KEY", hide_env_values = true)]
    pub priv_key: String,

    /// Network RPC URL
    #[arg(short, long, env = "RPC_URL", default_value = DEFAULT_RPC_URL)]
    pub rpc_url: String,

    /// Name of the target network, `hardhat`, `localhost` and `anvil`
    /// are treated as development networks
    #[arg(short, long, default_value = "localhost")]
    pub network: String,

    /// Path to the file recording deployed contracts
    #[arg(short, long, default_value = DEFAULT_DEPLOYMENTS_PATH)]
    pub deployments_path: PathBuf,

    /// Directory containing the compiled contract artifacts
    #[arg(short, long, default_value = DEFAULT_ARTIFACTS_DIR)]
    pub artifacts_dir: PathBuf,

    /// Path to a network config table replacing the built-in one
    #[arg(long)]
    pub network_config: Option<PathBuf>,

    /// Number of confirmations to wait for on deployment, overriding the
    /// network config
    #[arg(short, long)]
    pub confirmations: Option<u64>,

    /// Etherscan API key, verification is skipped when unset
    #[arg(long, env = "ETHERSCAN_API_KEY", hide_env_values = true)]
    pub etherscan_api_key: Option<String>,

    /// Etherscan API endpoint
    #[arg(long, default_value = DEFAULT_ETHERSCAN_API_URL)]
    pub etherscan_api_url: String,

    #[command(subcommand)]
    pub command: Command,
}

/// The deployment commands
#[derive(Subcommand)]
pub enum Command {
    /// Run the deployment steps selected by tag, with their dependencies
    Deploy(DeployArgs),
    /// Deploy the VRF coordinator mock on a development network
    DeployMocks,
    /// Deploy the Raffle contract, expecting mocks on development networks
    DeployRaffle,
    /// Verify a recorded deployment on Etherscan
    Verify(VerifyArgs),
}

/// Run tagged deployment steps
#[derive(Args)]
pub struct DeployArgs {
    /// The tags selecting the steps to run
    #[arg(short, long, value_enum, value_delimiter = ',', default_value = "all")]
    pub tags: Vec<DeployTag>,
}

/// Verify a recorded deployment
#[derive(Args)]
pub struct VerifyArgs {
    /// The name of the deployed contract
    #[arg(long, default_value = RAFFLE_CONTRACT_NAME)]
    pub contract: String,
}

impl Cli {
    /// The Etherscan API key, if one is set. An empty key disables verification.
    pub fn etherscan_api_key(&self) -> Option<String> {
        self.etherscan_api_key
            .clone()
            .filter(|api_key| !api_key.trim().is_empty())
    }

    /// Set up the clients and run the selected command
    pub async fn run(self) -> Result<(), ScriptError> {
        let etherscan_api_key = self.etherscan_api_key();
        let (provider, deployer_address) = setup_client(&self.priv_key, &self.rpc_url)?;
        let chain_id = fetch_chain_id(&provider).await?;

        let ctx = DeployContext {
            network: self.network,
            chain_id,
            network_config: NetworkConfigTable::load(self.network_config.as_deref())?,
            confirmations: self.confirmations,
        };
        let mut store = DeploymentStore::load(&self.deployments_path)?;

        let artifacts = ArtifactStore::new(self.artifacts_dir);
        let verifier = etherscan_api_key
            .map(|api_key| {
                EtherscanVerifier::new(
                    &self.etherscan_api_url,
                    api_key,
                    chain_id,
                    artifacts.clone(),
                )
            })
            .transpose()?;
        let deployer = AlloyDeployer::new(provider, deployer_address, artifacts);

        match self.command {
            Command::Deploy(args) => {
                run_steps(&ctx, &mut store, &deployer, verifier.as_ref(), &args.tags).await
            }
            Command::DeployMocks => deploy_mocks(&ctx, &mut store, &deployer).await.map(|_| ()),
            Command::DeployRaffle => {
                deploy_raffle(&ctx, &mut store, &deployer, verifier.as_ref())
                    .await
                    .map(|_| ())
            }
            Command::Verify(args) => {
                verify_deployment(&ctx, &store, verifier.as_ref(), &args.contract).await
            }
        }
    }
}
