//! Property tests for wallet-side account events

use std::sync::Arc;

use proptest::prelude::*;
use proptest::test_runner::TestCaseError;

use kynda_wallet::connection::{ConnectionController, ConnectionStatus};
use kynda_wallet::network::{NetworkDescriptor, CAMP_TESTNET_CHAIN_ID};
use kynda_wallet::provider::simulated::{RecordingLauncher, SimulatedEvmWallet};
use kynda_wallet::provider::{AdapterFactory, InjectedProviders, ProviderId};

const ACCOUNTS: [&str; 3] = [
    "0x742d35Cc6634C0532925a3b844Bc454e4438f44e",
    "0x8ba1f109551bD432803012645Ac136ddd64DBA72",
    "0xdAC17F958D2ee523a2206206994597C13D831ec7",
];

fn account_lists() -> impl Strategy<Value = Vec<Vec<usize>>> {
    prop::collection::vec(prop::collection::vec(0usize..ACCOUNTS.len(), 0..3), 1..12)
}

fn run(events: Vec<Vec<usize>>, process_each: bool) -> Result<(), TestCaseError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| TestCaseError::fail(e.to_string()))?;

    runtime.block_on(async move {
        let wallet = Arc::new(SimulatedEvmWallet::new().on_chain(CAMP_TESTNET_CHAIN_ID));
        let controller = ConnectionController::new(
            Arc::new(NetworkDescriptor::camp_testnet()),
            AdapterFactory::new(InjectedProviders::new().with_ethereum(wallet.clone())),
            Arc::new(RecordingLauncher::new()),
        );
        controller
            .connect(ProviderId::MetaMask)
            .await
            .map_err(|e| TestCaseError::fail(e.to_string()))?;

        for event in &events {
            let accounts: Vec<&str> = event.iter().map(|i| ACCOUNTS[*i]).collect();
            wallet.emit_accounts_changed(&accounts);
            if process_each {
                controller.process_events().await;
            }
        }
        controller.process_events().await;

        // An empty list revokes access; the released session hears nothing afterwards
        let revoked = events.iter().position(|event| event.is_empty());
        let state = controller.state();
        match revoked {
            Some(_) => {
                prop_assert_eq!(state.status, ConnectionStatus::Disconnected);
                prop_assert!(state.account.is_none());
                prop_assert_eq!(wallet.listener_count("accountsChanged"), 0);
            }
            None => {
                let last = events.last().map(|event| ACCOUNTS[event[0]]);
                prop_assert_eq!(state.account.as_deref(), last);
                prop_assert_eq!(state.status, ConnectionStatus::Ready);
            }
        }
        prop_assert!(state.is_consistent());
        Ok::<(), TestCaseError>(())
    })
}

proptest! {
    #[test]
    fn last_account_event_wins_when_batched(events in account_lists()) {
        run(events, false)?;
    }

    #[test]
    fn last_account_event_wins_when_processed_one_by_one(events in account_lists()) {
        run(events, true)?;
    }
}
