//! Definitions of Solidity functions and events used during deployment

use alloy::sol;

sol! {
    #[sol(rpc)]
    interface VRFCoordinatorV2Mock {
        event SubscriptionCreated(uint64 indexed subId, address owner);

        function createSubscription() external returns (uint64 subId);
        function fundSubscription(uint64 subId, uint96 amount) external;
        function addConsumer(uint64 subId, address consumer) external;
    }
}
