//! Presentation-facing facade
//!
//! [`WalletService`] wires the connection controller and the transaction
//! submitter together from a [`WalletConfig`] and publishes a combined
//! [`WalletSnapshot`] after every operation and every applied provider event.

use std::sync::{Arc, PoisonError, RwLock};

use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

use crate::config::WalletConfig;
use crate::connection::{ConnectionController, ConnectionState};
use crate::error::{Error, Result};
use crate::provider::{AdapterFactory, InjectedProviders, InstallPageLauncher, ProviderId};
use crate::transaction::{CurrencyConverter, LedgerEntry, LedgerSummary, TransactionSubmitter};

/// Everything the presentation layer renders
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WalletSnapshot {
    pub connection: ConnectionState,
    pub selected_provider: Option<ProviderId>,
    /// Balance in display currency, when known for the linked account
    pub balance: Option<Decimal>,
    pub display_currency: String,
    /// Most recent first
    pub ledger: Vec<LedgerEntry>,
    pub summary: LedgerSummary,
}

pub struct WalletService {
    config: WalletConfig,
    controller: Arc<ConnectionController>,
    submitter: TransactionSubmitter,
    selected: RwLock<Option<ProviderId>>,
    snapshot: watch::Sender<WalletSnapshot>,
}

impl WalletService {
    pub fn new(
        config: WalletConfig,
        injected: InjectedProviders,
        launcher: Arc<dyn InstallPageLauncher>,
    ) -> Result<Self> {
        config.validate()?;

        let network = Arc::new(config.network.clone());
        let factory = AdapterFactory::new(injected).with_gas_limit(config.gas_limit);
        let controller = Arc::new(ConnectionController::new(network, factory, launcher));

        let converter = CurrencyConverter::new(config.exchange_rate, config.network.decimals())?;
        let submitter = TransactionSubmitter::new(controller.clone(), converter)
            .with_counterparty(config.counterparty.clone())
            .with_recipient_validation(config.validate_recipients);

        let (snapshot, _) = watch::channel(WalletSnapshot {
            connection: controller.state(),
            selected_provider: None,
            balance: None,
            display_currency: config.display_currency.clone(),
            ledger: Vec::new(),
            summary: LedgerSummary::default(),
        });

        Ok(Self {
            config,
            controller,
            submitter,
            selected: RwLock::new(None),
            snapshot,
        })
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    pub fn controller(&self) -> &Arc<ConnectionController> {
        &self.controller
    }

    pub fn available_providers(&self) -> Vec<ProviderId> {
        self.controller.available_providers()
    }

    /// Choose the wallet `connect` will link
    pub fn select_provider(&self, provider: ProviderId) {
        *self.selected.write().unwrap_or_else(PoisonError::into_inner) = Some(provider);
        self.publish();
    }

    pub fn selected_provider(&self) -> Option<ProviderId> {
        *self.selected.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Link the selected wallet
    pub async fn connect(&self) -> Result<ConnectionState> {
        let provider = self
            .selected_provider()
            .ok_or_else(|| Error::InvalidInput("select a wallet first".to_string()))?;
        let result = self.controller.connect(provider).await;
        self.publish();
        result
    }

    /// Silently re-link the selected wallet if it already authorized this application
    pub async fn resume(&self) -> Result<Option<ConnectionState>> {
        let Some(provider) = self.selected_provider() else {
            return Ok(None);
        };
        let result = self.controller.resume(provider).await;
        self.publish();
        result
    }

    pub async fn disconnect(&self) {
        self.controller.disconnect().await;
        self.publish();
    }

    pub async fn pay(&self, to: &str, amount: Decimal) -> Result<LedgerEntry> {
        let result = self.submitter.pay(to, amount).await;
        self.publish();
        result
    }

    pub async fn refresh_balance(&self) -> Result<Decimal> {
        let result = self.submitter.refresh_balance().await;
        self.publish();
        result
    }

    pub fn record_deposit(
        &self,
        amount: Decimal,
        counterparty: Option<String>,
        tx_hash: Option<String>,
    ) -> Result<LedgerEntry> {
        let result = self.submitter.record_deposit(amount, counterparty, tx_hash);
        self.publish();
        result
    }

    pub fn settle_deposit(&self, id: Uuid, succeeded: bool) -> Result<LedgerEntry> {
        let result = self.submitter.settle_deposit(id, succeeded);
        self.publish();
        result
    }

    /// Apply queued wallet events
    pub async fn process_events(&self) -> usize {
        let applied = self.controller.process_events().await;
        if applied > 0 {
            self.publish();
        }
        applied
    }

    /// Apply wallet events as they arrive; runs until the task is dropped
    pub async fn watch_events(&self) {
        let signal = self.controller.event_signal();
        loop {
            signal.notified().await;
            let applied = self.process_events().await;
            debug!(applied, "provider events processed");
        }
    }

    /// Block explorer link for a submitted transaction
    pub fn explorer_url(&self, tx_hash: &str) -> Option<String> {
        self.config.network.explorer_tx_url(tx_hash)
    }

    pub fn snapshot(&self) -> WalletSnapshot {
        WalletSnapshot {
            connection: self.controller.state(),
            selected_provider: self.selected_provider(),
            balance: self.submitter.balance(),
            display_currency: self.config.display_currency.clone(),
            ledger: self.submitter.ledger(),
            summary: self.submitter.ledger_summary(),
        }
    }

    /// Receive a fresh snapshot after every operation
    pub fn subscribe(&self) -> watch::Receiver<WalletSnapshot> {
        self.snapshot.subscribe()
    }

    fn publish(&self) {
        self.snapshot.send_replace(self.snapshot());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::simulated::{RecordingLauncher, SimulatedEvmWallet};

    #[tokio::test]
    async fn test_connect_requires_selection() {
        let service = WalletService::new(
            WalletConfig::default(),
            InjectedProviders::new().with_ethereum(Arc::new(SimulatedEvmWallet::new())),
            Arc::new(RecordingLauncher::new()),
        )
        .unwrap();

        assert!(matches!(service.connect().await, Err(Error::InvalidInput(_))));
        assert_eq!(service.available_providers(), vec![ProviderId::MetaMask]);
    }

    #[tokio::test]
    async fn test_snapshot_is_published() {
        let service = WalletService::new(
            WalletConfig::default(),
            InjectedProviders::new(),
            Arc::new(RecordingLauncher::new()),
        )
        .unwrap();
        let mut updates = service.subscribe();

        service.select_provider(ProviderId::Binance);
        assert!(updates.has_changed().unwrap());
        assert_eq!(updates.borrow_and_update().selected_provider, Some(ProviderId::Binance));
        assert_eq!(service.snapshot().display_currency, "NGN");
    }
}
