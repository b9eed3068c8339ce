//! Solana wallet adapter

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use ethers_core::types::U256;
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::network::{ChainFamily, ChainId, NetworkDescriptor};

use super::{
    AccountsListener, ChainListener, ListenerId, ProviderAdapter, ProviderId, SolanaInjectedProvider,
};

const ACCOUNT_CHANGED: &str = "accountChanged";
const DISCONNECT: &str = "disconnect";

/// Adapter over a Phantom-like Solana provider
///
/// Chain switching does not apply: the chain id is always
/// [`ChainId::NotApplicable`] and switch/add requests are unsupported.
pub struct SolanaAdapter {
    injected: Option<Arc<dyn SolanaInjectedProvider>>,
    registrations: Mutex<Vec<(&'static str, ListenerId)>>,
}

impl SolanaAdapter {
    /// Create a new Solana adapter
    pub fn new(injected: Option<Arc<dyn SolanaInjectedProvider>>) -> Self {
        Self {
            injected,
            registrations: Mutex::new(Vec::new()),
        }
    }

    fn injected(&self) -> Result<&Arc<dyn SolanaInjectedProvider>> {
        match self.injected.as_ref() {
            Some(injected) if injected.is_phantom() => Ok(injected),
            _ => Err(Error::ProviderUnavailable(ProviderId::Phantom)),
        }
    }

    fn clear_registrations(&self, injected: &Arc<dyn SolanaInjectedProvider>) {
        let mut registrations = self.registrations.lock().unwrap_or_else(PoisonError::into_inner);
        for (event, id) in registrations.drain(..) {
            injected.remove_listener(event, id);
        }
    }
}

#[async_trait]
impl ProviderAdapter for SolanaAdapter {
    fn provider_id(&self) -> ProviderId {
        ProviderId::Phantom
    }

    fn family(&self) -> ChainFamily {
        ChainFamily::Solana
    }

    fn is_available(&self) -> bool {
        self.injected().is_ok()
    }

    async fn request_accounts(&self) -> Result<Vec<String>> {
        debug!(provider = %ProviderId::Phantom, "connect request");
        let public_key = self.injected()?.connect().await?;
        Ok(vec![public_key])
    }

    async fn get_accounts(&self) -> Result<Vec<String>> {
        Ok(self.injected()?.public_key().into_iter().collect())
    }

    async fn get_chain_id(&self) -> Result<ChainId> {
        Ok(ChainId::NotApplicable)
    }

    async fn switch_chain(&self, network: &NetworkDescriptor) -> Result<()> {
        Err(Error::Unsupported(format!(
            "{} cannot switch to {}",
            ProviderId::Phantom,
            network.display_name()
        )))
    }

    async fn add_chain(&self, network: &NetworkDescriptor) -> Result<()> {
        Err(Error::Unsupported(format!(
            "{} cannot add {}",
            ProviderId::Phantom,
            network.display_name()
        )))
    }

    async fn get_balance(&self, address: &str) -> Result<U256> {
        let lamports = self.injected()?.get_balance(address).await?;
        Ok(U256::from(lamports))
    }

    async fn send_value_transfer(&self, from: &str, to: &str, amount: U256) -> Result<String> {
        if amount > U256::from(u64::MAX) {
            return Err(Error::InvalidInput(format!("{} lamports exceeds the transfer limit", amount)));
        }
        debug!(provider = %ProviderId::Phantom, to, lamports = amount.low_u64(), "transfer request");
        let signature = self.injected()?.transfer(from, to, amount.low_u64()).await?;
        Ok(signature)
    }

    fn on_accounts_changed(&self, listener: AccountsListener) -> Result<()> {
        let injected = self.injected()?;
        self.clear_registrations(injected);

        let on_account = listener.clone();
        let account_id = injected.on(
            ACCOUNT_CHANGED,
            Arc::new(move |payload: Value| {
                // Phantom passes the new public key, or null when access was revoked
                let accounts = payload.as_str().map(|key| vec![key.to_string()]).unwrap_or_default();
                on_account(accounts)
            }),
        );
        let disconnect_id = injected.on(DISCONNECT, Arc::new(move |_: Value| listener(Vec::new())));

        let mut registrations = self.registrations.lock().unwrap_or_else(PoisonError::into_inner);
        registrations.push((ACCOUNT_CHANGED, account_id));
        registrations.push((DISCONNECT, disconnect_id));
        Ok(())
    }

    fn on_chain_changed(&self, _listener: ChainListener) -> Result<()> {
        // No chain notifications on Solana wallets
        Ok(())
    }

    fn remove_listeners(&self) {
        if let Some(injected) = self.injected.as_ref() {
            self.clear_registrations(injected);
        }
    }

    async fn release(&self) -> Result<()> {
        self.injected()?.disconnect().await?;
        Ok(())
    }
}
