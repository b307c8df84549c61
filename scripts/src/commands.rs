//! Implementations of the deployment steps

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolValue;
use tracing::{info, warn};

use crate::{
    constants::{
        LOG_SEPARATOR, MOCK_BASE_FEE_WEI, MOCK_GAS_PRICE_LINK, RAFFLE_CONTRACT_NAME,
        SUBSCRIPTION_FUND_AMOUNT_WEI, VRF_COORDINATOR_MOCK_CONTRACT_NAME,
    },
    deployments::{DeploymentRecord, DeploymentStore},
    errors::ScriptError,
    traits::{ContractVerifier, Deployer, VrfCoordinator},
    types::{DeployContext, DeployStep, DeployTag, DeploymentArgs},
};

/// The amount every mock subscription is funded with
pub fn subscription_fund_amount() -> U256 {
    U256::from(SUBSCRIPTION_FUND_AMOUNT_WEI)
}

/// The ABI-encoded `VRFCoordinatorV2Mock(uint96 baseFee, uint96 gasPriceLink)`
/// constructor arguments
fn mock_constructor_args() -> Bytes {
    (U256::from(MOCK_BASE_FEE_WEI), U256::from(MOCK_GAS_PRICE_LINK))
        .abi_encode_params()
        .into()
}

/// Run the steps selected by the given tags, dependencies first
pub async fn run_steps<D: Deployer, V: ContractVerifier>(
    ctx: &DeployContext,
    store: &mut DeploymentStore,
    deployer: &D,
    verifier: Option<&V>,
    tags: &[DeployTag],
) -> Result<(), ScriptError> {
    let steps = DeployStep::select(tags);
    if steps.is_empty() {
        warn!("no deployment steps match tags {:?}", tags);
    }

    for step in steps {
        info!("running deployment step `{}` on {}", step, ctx.network);
        match step {
            DeployStep::Mocks => {
                deploy_mocks(ctx, store, deployer).await?;
            }
            DeployStep::Raffle => {
                deploy_raffle(ctx, store, deployer, verifier).await?;
            }
        }
    }

    Ok(())
}

/// Deploy the VRF coordinator mock if the context targets a development network.
///
/// A mock already recorded for the network is reused as long as its code is
/// still on chain. Returns the address of the mock, or `None` on live networks.
pub async fn deploy_mocks<D: Deployer>(
    ctx: &DeployContext,
    store: &mut DeploymentStore,
    deployer: &D,
) -> Result<Option<Address>, ScriptError> {
    if !ctx.is_development() {
        info!("{} is a live network, not deploying mocks", ctx.network);
        return Ok(None);
    }

    let existing = store
        .get(&ctx.network, ctx.chain_id, VRF_COORDINATOR_MOCK_CONTRACT_NAME)
        .map(|record| record.address);
    if let Some(address) = existing {
        if deployer.has_code(address).await? {
            info!(
                "reusing \"{}\" at {:#x}",
                VRF_COORDINATOR_MOCK_CONTRACT_NAME, address
            );
            return Ok(Some(address));
        }
    }

    info!("Local network detected! Deploying mocks...");
    let record = deployer
        .deploy(
            VRF_COORDINATOR_MOCK_CONTRACT_NAME,
            mock_constructor_args(),
            ctx.confirmations(),
        )
        .await?;
    let address = record.address;
    store.save_deployment(
        &ctx.network,
        ctx.chain_id,
        VRF_COORDINATOR_MOCK_CONTRACT_NAME,
        record,
    )?;

    info!("Mocks Deployed!");
    info!("{}", LOG_SEPARATOR);
    Ok(Some(address))
}

/// Deploy the Raffle contract.
///
/// On development networks the VRF coordinator is the previously deployed
/// mock, on which a fresh subscription is created and funded. On live
/// networks the coordinator and subscription come from the network config.
/// Live deployments are verified when a verifier is given; a failed
/// verification is logged and does not fail the step.
pub async fn deploy_raffle<D: Deployer, V: ContractVerifier>(
    ctx: &DeployContext,
    store: &mut DeploymentStore,
    deployer: &D,
    verifier: Option<&V>,
) -> Result<DeploymentRecord, ScriptError> {
    let config = ctx.chain_config()?;

    let mut mock_subscription = None;
    let (vrf_coordinator, subscription_id) = if ctx.is_development() {
        let coordinator = connect_mock(ctx, store, deployer).await?;

        let subscription_id = coordinator.create_subscription().await?;
        info!("created VRF subscription {}", subscription_id);
        // The mock does not move real funds
        coordinator
            .fund_subscription(subscription_id, subscription_fund_amount())
            .await?;

        let address = coordinator.address();
        mock_subscription = Some((coordinator, subscription_id));
        (address, subscription_id)
    } else {
        (config.vrf_coordinator()?, config.subscription()?)
    };

    let args = DeploymentArgs::new(vrf_coordinator, subscription_id, config);
    info!(
        "deploying \"{}\" from {:#x} with args {}",
        RAFFLE_CONTRACT_NAME,
        deployer.deployer_address(),
        args
    );
    let record = deployer
        .deploy(RAFFLE_CONTRACT_NAME, args.abi_encode(), ctx.confirmations())
        .await?;
    store.save_deployment(
        &ctx.network,
        ctx.chain_id,
        RAFFLE_CONTRACT_NAME,
        record.clone(),
    )?;

    // The mock rejects randomness requests from unregistered consumers
    if let Some((coordinator, subscription_id)) = mock_subscription {
        coordinator
            .add_consumer(subscription_id, record.address)
            .await?;
        info!(
            "added {:#x} as consumer of subscription {}",
            record.address, subscription_id
        );
    }

    if !ctx.is_development() {
        if let Some(verifier) = verifier {
            info!("Verifying...");
            if let Err(e) = verifier
                .verify(RAFFLE_CONTRACT_NAME, record.address, &record.args)
                .await
            {
                warn!("failed to verify {}: {}", RAFFLE_CONTRACT_NAME, e);
            }
        }
    }

    info!("{}", LOG_SEPARATOR);
    Ok(record)
}

/// Verify a contract previously deployed to the context's network
pub async fn verify_deployment<V: ContractVerifier>(
    ctx: &DeployContext,
    store: &DeploymentStore,
    verifier: Option<&V>,
    contract: &str,
) -> Result<(), ScriptError> {
    if ctx.is_development() {
        return Err(ScriptError::Verification(format!(
            "{} is a development network",
            ctx.network
        )));
    }

    let record = store
        .get(&ctx.network, ctx.chain_id, contract)
        .ok_or_else(|| {
            ScriptError::ReadDeployments(format!(
                "no deployment of {} recorded for {}",
                contract, ctx.network
            ))
        })?;
    let verifier = verifier.ok_or_else(|| {
        ScriptError::Verification("no block explorer API key configured".to_string())
    })?;

    if contract == RAFFLE_CONTRACT_NAME {
        let args = DeploymentArgs::abi_decode(&record.args)?;
        info!("verifying {} at {:#x} with args {}", contract, record.address, args);
    }

    info!("Verifying...");
    verifier.verify(contract, record.address, &record.args).await
}

/// Connect to the VRF coordinator mock recorded for the context's network
async fn connect_mock<D: Deployer>(
    ctx: &DeployContext,
    store: &DeploymentStore,
    deployer: &D,
) -> Result<D::Coordinator, ScriptError> {
    let address = store
        .get(&ctx.network, ctx.chain_id, VRF_COORDINATOR_MOCK_CONTRACT_NAME)
        .map(|record| record.address)
        .ok_or_else(|| {
            ScriptError::MissingMock(format!(
                "no {} recorded for {}, deploy the mocks first",
                VRF_COORDINATOR_MOCK_CONTRACT_NAME, ctx.network
            ))
        })?;

    if !deployer.has_code(address).await? {
        return Err(ScriptError::MissingMock(format!(
            "no code at the recorded {} address {:#x}",
            VRF_COORDINATOR_MOCK_CONTRACT_NAME, address
        )));
    }

    Ok(deployer.coordinator_at(address))
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use alloy_primitives::{address, b256, Address, Bytes, B256, U256};
    use async_trait::async_trait;
    use eyre::Result;

    use super::*;
    use crate::config::NetworkConfigTable;

    /// The ID of the first subscription created on the fake coordinator
    const FIRST_SUBSCRIPTION_ID: u64 = 42;

    /// Everything the fakes observed
    #[derive(Default)]
    struct ChainState {
        /// (contract, constructor args, confirmations) of each deployment
        deployments: Vec<(String, Bytes, u64)>,
        /// Addresses holding code
        code: Vec<Address>,
        /// (coordinator, subscription) of each created subscription
        subscriptions: Vec<(Address, u64)>,
        /// (subscription, amount) of each funding
        fundings: Vec<(u64, U256)>,
        /// (subscription, consumer) of each added consumer
        consumers: Vec<(u64, Address)>,
    }

    impl ChainState {
        fn deployments_of(&self, contract: &str) -> usize {
            self.deployments
                .iter()
                .filter(|(name, _, _)| name == contract)
                .count()
        }
    }

    #[derive(Clone, Default)]
    struct FakeDeployer {
        state: Arc<Mutex<ChainState>>,
    }

    struct FakeCoordinator {
        address: Address,
        state: Arc<Mutex<ChainState>>,
    }

    #[derive(Default)]
    struct FakeVerifier {
        fail: bool,
        calls: Mutex<Vec<(String, Address, Bytes)>>,
    }

    #[async_trait]
    impl Deployer for FakeDeployer {
        type Coordinator = FakeCoordinator;

        fn deployer_address(&self) -> Address {
            Address::with_last_byte(0xde)
        }

        fn coordinator_at(&self, address: Address) -> FakeCoordinator {
            FakeCoordinator {
                address,
                state: self.state.clone(),
            }
        }

        async fn deploy(
            &self,
            contract: &str,
            constructor_args: Bytes,
            confirmations: u64,
        ) -> Result<DeploymentRecord, ScriptError> {
            let mut state = self.state.lock().unwrap();
            state
                .deployments
                .push((contract.to_string(), constructor_args.clone(), confirmations));

            let nonce = state.deployments.len() as u8;
            let address = Address::with_last_byte(nonce);
            state.code.push(address);

            Ok(DeploymentRecord {
                address,
                transaction_hash: B256::with_last_byte(nonce),
                block_number: Some(nonce as u64),
                args: constructor_args,
            })
        }

        async fn has_code(&self, address: Address) -> Result<bool, ScriptError> {
            Ok(self.state.lock().unwrap().code.contains(&address))
        }
    }

    #[async_trait]
    impl VrfCoordinator for FakeCoordinator {
        fn address(&self) -> Address {
            self.address
        }

        async fn create_subscription(&self) -> Result<u64, ScriptError> {
            let mut state = self.state.lock().unwrap();
            let id = FIRST_SUBSCRIPTION_ID + state.subscriptions.len() as u64;
            state.subscriptions.push((self.address, id));
            Ok(id)
        }

        async fn fund_subscription(
            &self,
            subscription_id: u64,
            amount: U256,
        ) -> Result<(), ScriptError> {
            self.state
                .lock()
                .unwrap()
                .fundings
                .push((subscription_id, amount));
            Ok(())
        }

        async fn add_consumer(
            &self,
            subscription_id: u64,
            consumer: Address,
        ) -> Result<(), ScriptError> {
            self.state
                .lock()
                .unwrap()
                .consumers
                .push((subscription_id, consumer));
            Ok(())
        }
    }

    #[async_trait]
    impl ContractVerifier for FakeVerifier {
        async fn verify(
            &self,
            contract: &str,
            address: Address,
            constructor_args: &Bytes,
        ) -> Result<(), ScriptError> {
            self.calls.lock().unwrap().push((
                contract.to_string(),
                address,
                constructor_args.clone(),
            ));
            if self.fail {
                return Err(ScriptError::Verification("Invalid API Key".to_string()));
            }
            Ok(())
        }
    }

    fn sepolia() -> DeployContext {
        DeployContext {
            network: "sepolia".to_string(),
            chain_id: 11155111,
            network_config: NetworkConfigTable::load(None).unwrap(),
            confirmations: None,
        }
    }

    /// A local network whose config entry also carries a live coordinator
    /// and subscription, which must be ignored
    fn localhost() -> DeployContext {
        let mut network_config = NetworkConfigTable::load(None).unwrap();
        let mut local = network_config.get(11155111).unwrap().clone();
        local.name = "localhost".to_string();
        network_config.insert(31337, local);

        DeployContext {
            network: "localhost".to_string(),
            chain_id: 31337,
            network_config,
            confirmations: None,
        }
    }

    #[tokio::test]
    async fn test_development_uses_mock_subscription() -> Result<()> {
        let ctx = localhost();
        let mut store = DeploymentStore::in_memory();
        let deployer = FakeDeployer::default();

        let mock = deploy_mocks(&ctx, &mut store, &deployer).await?.unwrap();
        let record = deploy_raffle(&ctx, &mut store, &deployer, None::<&FakeVerifier>).await?;

        let args = DeploymentArgs::abi_decode(&record.args)?;
        assert_eq!(args.vrf_coordinator, mock);
        assert_eq!(args.subscription_id, FIRST_SUBSCRIPTION_ID);

        let state = deployer.state.lock().unwrap();
        assert_eq!(state.subscriptions, vec![(mock, FIRST_SUBSCRIPTION_ID)]);
        assert_eq!(
            state.consumers,
            vec![(FIRST_SUBSCRIPTION_ID, record.address)]
        );
        assert_eq!(store.get("localhost", 31337, "Raffle"), Some(&record));
        Ok(())
    }

    #[tokio::test]
    async fn test_live_args_match_config() -> Result<()> {
        let ctx = sepolia();
        let mut store = DeploymentStore::in_memory();
        let deployer = FakeDeployer::default();

        assert_eq!(deploy_mocks(&ctx, &mut store, &deployer).await?, None);
        let record = deploy_raffle(&ctx, &mut store, &deployer, None::<&FakeVerifier>).await?;

        let expected = DeploymentArgs {
            vrf_coordinator: address!("8103B0A8A00be2DDC778e6e7eaa21791Cd364625"),
            entrance_fee: U256::from(10_000_000_000_000_000_u128),
            gas_lane: b256!("474e34a077df58807dbe9c96d3c009b23b3c6d0cce433e59bbf5b34f823bc56c"),
            subscription_id: 588,
            callback_gas_limit: 500_000,
            interval: U256::from(30),
        };
        assert_eq!(DeploymentArgs::abi_decode(&record.args)?, expected);

        let state = deployer.state.lock().unwrap();
        assert_eq!(
            state.deployments,
            vec![("Raffle".to_string(), expected.abi_encode(), 6)]
        );
        assert!(state.subscriptions.is_empty());
        assert!(state.fundings.is_empty());
        assert!(state.consumers.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_chain_fails_before_deploying() {
        let mut ctx = sepolia();
        ctx.network = "mainnet".to_string();
        ctx.chain_id = 1;
        let mut store = DeploymentStore::in_memory();
        let deployer = FakeDeployer::default();
        let verifier = FakeVerifier::default();

        let res = deploy_raffle(&ctx, &mut store, &deployer, Some(&verifier)).await;

        assert!(matches!(res, Err(ScriptError::ConfigMissing(_))));
        assert!(deployer.state.lock().unwrap().deployments.is_empty());
        assert!(verifier.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_live_network_without_coordinator() {
        let mut ctx = sepolia();
        let mut config = ctx.network_config.get(11155111).unwrap().clone();
        config.vrf_coordinator_v2 = None;
        ctx.network_config.insert(11155111, config);
        let deployer = FakeDeployer::default();

        let res = deploy_raffle(
            &ctx,
            &mut DeploymentStore::in_memory(),
            &deployer,
            None::<&FakeVerifier>,
        )
        .await;

        assert!(matches!(res, Err(ScriptError::ConfigMissing(_))));
        assert!(deployer.state.lock().unwrap().deployments.is_empty());
    }

    #[tokio::test]
    async fn test_live_deployment_is_verified() -> Result<()> {
        let ctx = sepolia();
        let deployer = FakeDeployer::default();
        let verifier = FakeVerifier::default();

        let record = deploy_raffle(
            &ctx,
            &mut DeploymentStore::in_memory(),
            &deployer,
            Some(&verifier),
        )
        .await?;

        assert_eq!(
            *verifier.calls.lock().unwrap(),
            vec![("Raffle".to_string(), record.address, record.args.clone())]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_development_deployment_is_not_verified() -> Result<()> {
        let ctx = localhost();
        let mut store = DeploymentStore::in_memory();
        let deployer = FakeDeployer::default();
        let verifier = FakeVerifier::default();

        run_steps(
            &ctx,
            &mut store,
            &deployer,
            Some(&verifier),
            &[DeployTag::All],
        )
        .await?;

        assert!(verifier.calls.lock().unwrap().is_empty());
        assert!(store.get("localhost", 31337, "Raffle").is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_verification_is_not_fatal() -> Result<()> {
        let ctx = sepolia();
        let mut store = DeploymentStore::in_memory();
        let deployer = FakeDeployer::default();
        let verifier = FakeVerifier {
            fail: true,
            ..Default::default()
        };

        let record = deploy_raffle(&ctx, &mut store, &deployer, Some(&verifier)).await?;

        assert_eq!(verifier.calls.lock().unwrap().len(), 1);
        assert_eq!(store.get("sepolia", 11155111, "Raffle"), Some(&record));
        Ok(())
    }

    #[tokio::test]
    async fn test_fund_amount_is_one_ether() -> Result<()> {
        let mut ctx = localhost();
        let mut config = ctx.network_config.get(31337)?.clone();
        config.raffle_entrance_fee = U256::from(1);
        ctx.network_config.insert(31337, config);
        let mut store = DeploymentStore::in_memory();
        let deployer = FakeDeployer::default();

        run_steps(
            &ctx,
            &mut store,
            &deployer,
            None::<&FakeVerifier>,
            &[DeployTag::Raffle],
        )
        .await?;

        let one_ether = U256::from(10).pow(U256::from(18));
        assert_eq!(
            deployer.state.lock().unwrap().fundings,
            vec![(FIRST_SUBSCRIPTION_ID, one_ether)]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_rerun_reuses_mock() -> Result<()> {
        let ctx = localhost();
        let mut store = DeploymentStore::in_memory();
        let deployer = FakeDeployer::default();

        run_steps(&ctx, &mut store, &deployer, None::<&FakeVerifier>, &[DeployTag::All]).await?;
        let mock = store
            .get("localhost", 31337, "VRFCoordinatorV2Mock")
            .cloned();
        run_steps(&ctx, &mut store, &deployer, None::<&FakeVerifier>, &[DeployTag::All]).await?;

        assert_eq!(
            store
                .get("localhost", 31337, "VRFCoordinatorV2Mock")
                .cloned(),
            mock
        );

        let state = deployer.state.lock().unwrap();
        assert_eq!(state.deployments_of("VRFCoordinatorV2Mock"), 1);
        assert_eq!(state.deployments_of("Raffle"), 2);
        assert_eq!(
            state.subscriptions.iter().map(|(_, id)| *id).collect::<Vec<_>>(),
            vec![FIRST_SUBSCRIPTION_ID, FIRST_SUBSCRIPTION_ID + 1]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_mock() {
        let ctx = localhost();
        let deployer = FakeDeployer::default();

        let res = deploy_raffle(
            &ctx,
            &mut DeploymentStore::in_memory(),
            &deployer,
            None::<&FakeVerifier>,
        )
        .await;

        assert!(matches!(res, Err(ScriptError::MissingMock(_))));
        assert!(deployer.state.lock().unwrap().deployments.is_empty());
    }

    #[tokio::test]
    async fn test_stale_mock_record() -> Result<()> {
        let ctx = localhost();
        let mut store = DeploymentStore::in_memory();
        let stale = DeploymentRecord {
            address: Address::with_last_byte(0x99),
            transaction_hash: B256::ZERO,
            block_number: None,
            args: Bytes::new(),
        };
        store.insert("localhost", 31337, "VRFCoordinatorV2Mock", stale);
        let deployer = FakeDeployer::default();

        let res = deploy_raffle(&ctx, &mut store, &deployer, None::<&FakeVerifier>).await;
        assert!(matches!(res, Err(ScriptError::MissingMock(_))));

        // The mocks step replaces the stale record
        let mock = deploy_mocks(&ctx, &mut store, &deployer).await?.unwrap();
        assert_ne!(mock, Address::with_last_byte(0x99));
        deploy_raffle(&ctx, &mut store, &deployer, None::<&FakeVerifier>).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_mock_from_other_chain_redeployed() -> Result<()> {
        let ctx = localhost();
        let deployer = FakeDeployer::default();
        let mut store = DeploymentStore::in_memory();

        // A mock recorded while the local node ran under another chain ID,
        // at an address which happens to hold code on the current chain
        let old_mock = deploy_mocks(&ctx, &mut store, &deployer).await?.unwrap();
        let mut restarted = ctx.clone();
        restarted.chain_id = 1337;
        restarted.network_config.insert(1337, ctx.chain_config()?.clone());

        let mock = deploy_mocks(&restarted, &mut store, &deployer).await?.unwrap();
        assert_ne!(mock, old_mock);
        assert_eq!(
            deployer
                .state
                .lock()
                .unwrap()
                .deployments_of("VRFCoordinatorV2Mock"),
            2
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_confirmation_override() -> Result<()> {
        let mut ctx = sepolia();
        ctx.confirmations = Some(3);
        let deployer = FakeDeployer::default();

        deploy_raffle(
            &ctx,
            &mut DeploymentStore::in_memory(),
            &deployer,
            None::<&FakeVerifier>,
        )
        .await?;

        assert_eq!(deployer.state.lock().unwrap().deployments[0].2, 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_verify_recorded_deployment() -> Result<()> {
        let ctx = sepolia();
        let mut store = DeploymentStore::in_memory();
        let deployer = FakeDeployer::default();
        let record = deploy_raffle(&ctx, &mut store, &deployer, None::<&FakeVerifier>).await?;

        let verifier = FakeVerifier::default();
        verify_deployment(&ctx, &store, Some(&verifier), "Raffle").await?;
        assert_eq!(
            *verifier.calls.lock().unwrap(),
            vec![("Raffle".to_string(), record.address, record.args)]
        );

        assert!(matches!(
            verify_deployment(&ctx, &store, None::<&FakeVerifier>, "Raffle").await,
            Err(ScriptError::Verification(_))
        ));
        assert!(matches!(
            verify_deployment(&ctx, &store, Some(&verifier), "Lottery").await,
            Err(ScriptError::ReadDeployments(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_verify_refused_on_development_network() {
        let verifier = FakeVerifier::default();
        let res = verify_deployment(
            &localhost(),
            &DeploymentStore::in_memory(),
            Some(&verifier),
            "Raffle",
        )
        .await;

        assert!(matches!(res, Err(ScriptError::Verification(_))));
        assert!(verifier.calls.lock().unwrap().is_empty());
    }
}
