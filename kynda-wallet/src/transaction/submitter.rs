//! Payment submission
//!
//! [`TransactionSubmitter`] converts display-currency amounts to native units,
//! submits value transfers through the [`ConnectionController`], and keeps
//! the local ledger and tracked balance in step with successful submissions.

use std::sync::{Arc, PoisonError, RwLock};

use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use crate::account::require_address;
use crate::connection::ConnectionController;
use crate::error::{Error, Result};
use crate::network::ChainId;

use super::{CurrencyConverter, EntryKind, EntryStatus, Ledger, LedgerEntry, LedgerSummary};

/// Balance last read from the wallet, valid only for the account and chain it was read on
#[derive(Debug, Clone)]
struct TrackedBalance {
    account: String,
    chain_id: Option<ChainId>,
    amount: Decimal,
}

impl TrackedBalance {
    fn belongs_to(&self, account: Option<&str>, chain_id: Option<ChainId>) -> bool {
        account == Some(self.account.as_str()) && chain_id == self.chain_id
    }
}

pub struct TransactionSubmitter {
    controller: Arc<ConnectionController>,
    converter: CurrencyConverter,
    counterparty: Option<String>,
    validate_recipients: bool,
    ledger: RwLock<Ledger>,
    balance: RwLock<Option<TrackedBalance>>,
}

impl TransactionSubmitter {
    pub fn new(controller: Arc<ConnectionController>, converter: CurrencyConverter) -> Self {
        Self {
            controller,
            converter,
            counterparty: None,
            validate_recipients: false,
            ledger: RwLock::new(Ledger::new()),
            balance: RwLock::new(None),
        }
    }

    /// Label recorded on payment entries
    pub fn with_counterparty(mut self, counterparty: impl Into<String>) -> Self {
        self.counterparty = Some(counterparty.into());
        self
    }

    /// Check recipients against the active chain family's address format
    pub fn with_recipient_validation(mut self, enabled: bool) -> Self {
        self.validate_recipients = enabled;
        self
    }

    pub fn converter(&self) -> &CurrencyConverter {
        &self.converter
    }

    /// Send `amount` (display currency) to `to`, recording a Completed payment on success.
    ///
    /// The ledger and balance are untouched when any step fails.
    pub async fn pay(&self, to: &str, amount: Decimal) -> Result<LedgerEntry> {
        let state = self.controller.state();
        if !state.is_ready() {
            return Err(Error::NotReady(format!(
                "connect a wallet on {} before paying",
                self.controller.network().display_name()
            )));
        }

        let family = if self.validate_recipients {
            self.controller.active_family()
        } else {
            None
        };
        let recipient = require_address(to, family)?;

        if amount <= Decimal::ZERO {
            return Err(Error::InvalidInput(format!("amount must be positive, got {}", amount)));
        }
        if let Some(available) = self.balance() {
            if amount > available {
                return Err(Error::InsufficientFunds(format!(
                    "{} requested, {} available",
                    amount, available
                )));
            }
        }

        let native = self.converter.to_native(amount)?;
        if native.is_zero() {
            return Err(Error::InvalidInput(format!(
                "{} is below the smallest {} unit",
                amount,
                self.controller.network().native_currency().symbol
            )));
        }

        let tx_hash = self.controller.send_value_transfer(&recipient, native).await?;

        let entry = LedgerEntry::payment(amount, self.counterparty.clone(), tx_hash);
        self.write_ledger().prepend(entry.clone());
        self.debit(state.account.as_deref(), state.chain_id, amount);

        info!(id = %entry.id, %amount, to = %recipient, "payment recorded");
        Ok(entry)
    }

    /// Re-read the balance from the wallet. The previous balance is kept when this fails.
    pub async fn refresh_balance(&self) -> Result<Decimal> {
        let reading = self.controller.fetch_balance().await?;
        let amount = self.converter.to_display(reading.amount)?;

        *self.balance.write().unwrap_or_else(PoisonError::into_inner) = Some(TrackedBalance {
            account: reading.account,
            chain_id: reading.chain_id,
            amount,
        });
        Ok(amount)
    }

    /// Balance in display currency, if one was read for the current account and chain
    pub fn balance(&self) -> Option<Decimal> {
        let state = self.controller.state();
        let tracked = self.balance.read().unwrap_or_else(PoisonError::into_inner);
        tracked
            .as_ref()
            .filter(|b| b.belongs_to(state.account.as_deref(), state.chain_id))
            .map(|b| b.amount)
    }

    /// Record incoming funds as a Pending deposit
    pub fn record_deposit(
        &self,
        amount: Decimal,
        counterparty: Option<String>,
        tx_hash: Option<String>,
    ) -> Result<LedgerEntry> {
        if amount <= Decimal::ZERO {
            return Err(Error::InvalidInput(format!("deposit must be positive, got {}", amount)));
        }
        let entry = LedgerEntry::deposit(amount, counterparty, tx_hash);
        self.write_ledger().prepend(entry.clone());
        info!(id = %entry.id, %amount, "deposit recorded");
        Ok(entry)
    }

    /// Complete or fail a Pending deposit; a completed deposit credits the tracked balance.
    ///
    /// A credit the balance cannot hold is refused and the deposit stays Pending.
    pub fn settle_deposit(&self, id: Uuid, succeeded: bool) -> Result<LedgerEntry> {
        let next = if succeeded {
            EntryStatus::Completed
        } else {
            EntryStatus::Failed
        };
        let state = self.controller.state();

        let mut ledger = self.write_ledger();
        let amount = match ledger.get(id) {
            Some(entry) if entry.kind != EntryKind::Deposit => {
                return Err(Error::Ledger(format!("entry {} is not a deposit", id)));
            }
            Some(entry) => entry.amount,
            None => return Err(Error::Ledger(format!("no entry {}", id))),
        };

        let mut tracked = self.balance.write().unwrap_or_else(PoisonError::into_inner);
        let credited = match tracked.as_ref() {
            Some(balance) if succeeded && balance.belongs_to(state.account.as_deref(), state.chain_id) => {
                let total = balance.amount.checked_add(amount).ok_or_else(|| {
                    Error::Ledger(format!("crediting {} would overflow the tracked balance", amount))
                })?;
                Some(total)
            }
            _ => None,
        };

        let entry = ledger.transition(id, next)?.clone();
        if let (Some(balance), Some(total)) = (tracked.as_mut(), credited) {
            balance.amount = total;
        }
        if !succeeded {
            warn!(%id, "deposit failed");
        }
        Ok(entry)
    }

    /// Ledger entries, most recent first
    pub fn ledger(&self) -> Vec<LedgerEntry> {
        self.ledger
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries()
            .cloned()
            .collect()
    }

    pub fn ledger_summary(&self) -> LedgerSummary {
        self.ledger.read().unwrap_or_else(PoisonError::into_inner).summary()
    }

    fn write_ledger(&self) -> std::sync::RwLockWriteGuard<'_, Ledger> {
        self.ledger.write().unwrap_or_else(PoisonError::into_inner)
    }

    // Applies only while the tracked balance belongs to the given account and chain
    fn debit(&self, account: Option<&str>, chain_id: Option<ChainId>, amount: Decimal) {
        let mut tracked = self.balance.write().unwrap_or_else(PoisonError::into_inner);
        let remaining = tracked
            .as_ref()
            .filter(|balance| balance.belongs_to(account, chain_id))
            .map(|balance| balance.amount.checked_sub(amount));
        match remaining {
            Some(Some(left)) => {
                if let Some(balance) = tracked.as_mut() {
                    balance.amount = left;
                }
            }
            Some(None) => {
                warn!(%amount, "tracked balance out of range, awaiting a fresh read");
                *tracked = None;
            }
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{NetworkDescriptor, CAMP_TESTNET_CHAIN_ID};
    use crate::provider::simulated::{RecordingLauncher, SimulatedEvmWallet, DEFAULT_EVM_ACCOUNT};
    use crate::provider::{AdapterFactory, InjectedProviders, ProviderId};
    use ethers_core::types::U256;

    async fn ready_submitter(wallet: Arc<SimulatedEvmWallet>) -> TransactionSubmitter {
        let controller = Arc::new(ConnectionController::new(
            Arc::new(NetworkDescriptor::camp_testnet()),
            AdapterFactory::new(InjectedProviders::new().with_ethereum(wallet)),
            Arc::new(RecordingLauncher::new()),
        ));
        controller.connect(ProviderId::MetaMask).await.unwrap();
        TransactionSubmitter::new(controller, CurrencyConverter::new(Decimal::from(500), 18).unwrap())
    }

    fn funded_wallet() -> Arc<SimulatedEvmWallet> {
        Arc::new(
            SimulatedEvmWallet::new()
                .on_chain(CAMP_TESTNET_CHAIN_ID)
                .with_balance(DEFAULT_EVM_ACCOUNT, U256::exp10(18)),
        )
    }

    #[tokio::test]
    async fn test_pay_requires_ready() {
        let controller = Arc::new(ConnectionController::new(
            Arc::new(NetworkDescriptor::camp_testnet()),
            AdapterFactory::new(InjectedProviders::new()),
            Arc::new(RecordingLauncher::new()),
        ));
        let submitter = TransactionSubmitter::new(controller, CurrencyConverter::new(Decimal::from(500), 18).unwrap());

        assert!(matches!(submitter.pay("0xabc", Decimal::from(1)).await, Err(Error::NotReady(_))));
        assert!(submitter.ledger().is_empty());
    }

    #[tokio::test]
    async fn test_pay_rejects_bad_input() {
        let submitter = ready_submitter(funded_wallet()).await;

        assert!(matches!(submitter.pay("  ", Decimal::from(1)).await, Err(Error::InvalidInput(_))));
        assert!(matches!(submitter.pay("0xabc", Decimal::ZERO).await, Err(Error::InvalidInput(_))));
        assert!(matches!(submitter.pay("0xabc", Decimal::from(-5)).await, Err(Error::InvalidInput(_))));
        assert!(submitter.ledger().is_empty());
    }

    #[tokio::test]
    async fn test_soft_balance_check() {
        let submitter = ready_submitter(funded_wallet()).await;
        assert_eq!(submitter.refresh_balance().await.unwrap(), Decimal::from(500));

        let err = submitter.pay("0xabc", Decimal::from(501)).await.unwrap_err();
        assert!(matches!(err, Error::InsufficientFunds(_)));
        assert_eq!(submitter.balance(), Some(Decimal::from(500)));
    }

    #[tokio::test]
    async fn test_strict_recipient_validation() {
        let submitter = ready_submitter(funded_wallet()).await.with_recipient_validation(true);
        assert!(matches!(submitter.pay("0xabc", Decimal::from(1)).await, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_deposit_settlement_credits_balance() {
        let submitter = ready_submitter(funded_wallet()).await;
        submitter.refresh_balance().await.unwrap();

        let deposit = submitter.record_deposit(Decimal::from(50), Some("Refund".to_string()), None).unwrap();
        assert_eq!(deposit.status, EntryStatus::Pending);
        assert_eq!(submitter.balance(), Some(Decimal::from(500)));

        let settled = submitter.settle_deposit(deposit.id, true).unwrap();
        assert_eq!(settled.status, EntryStatus::Completed);
        assert_eq!(submitter.balance(), Some(Decimal::from(550)));
        assert!(submitter.settle_deposit(deposit.id, false).is_err());
    }

    #[tokio::test]
    async fn test_oversized_credit_keeps_deposit_pending() {
        let submitter = ready_submitter(funded_wallet()).await;
        submitter.refresh_balance().await.unwrap();

        let deposit = submitter.record_deposit(Decimal::MAX, None, None).unwrap();
        assert!(matches!(submitter.settle_deposit(deposit.id, true), Err(Error::Ledger(_))));
        assert_eq!(submitter.balance(), Some(Decimal::from(500)));
        assert_eq!(submitter.ledger()[0].status, EntryStatus::Pending);
        assert_eq!(submitter.settle_deposit(deposit.id, false).unwrap().status, EntryStatus::Failed);
    }

    #[tokio::test]
    async fn test_settle_rejects_payments() {
        let submitter = ready_submitter(funded_wallet()).await;
        let payment = submitter.pay("0xabc", Decimal::from(10)).await.unwrap();
        assert!(matches!(submitter.settle_deposit(payment.id, true), Err(Error::Ledger(_))));
    }
}
