//! EVM wallet adapter

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use ethers_core::types::U256;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::network::{ChainId, NetworkDescriptor};

use super::{
    AccountsListener, ChainListener, Eip1193Provider, ListenerId, ProviderAdapter, ProviderId,
};

/// Gas limit of a plain value transfer (0x5208)
pub const TRANSFER_GAS_LIMIT: u64 = 21_000;

const ACCOUNTS_CHANGED: &str = "accountsChanged";
const CHAIN_CHANGED: &str = "chainChanged";

/// Adapter over an EIP-1193 provider (MetaMask-like and Binance-like wallets)
pub struct EvmAdapter {
    /// Which wallet this adapter speaks for
    provider_id: ProviderId,
    /// Injected provider object, absent when the wallet is not installed
    injected: Option<Arc<dyn Eip1193Provider>>,
    /// Gas limit attached to value transfers
    gas_limit: u64,
    /// Active listener registration per event name
    registrations: Mutex<HashMap<&'static str, ListenerId>>,
}

impl EvmAdapter {
    /// Create a new EVM adapter
    pub fn new(provider_id: ProviderId, injected: Option<Arc<dyn Eip1193Provider>>) -> Self {
        Self {
            provider_id,
            injected,
            gas_limit: TRANSFER_GAS_LIMIT,
            registrations: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = gas_limit;
        self
    }

    fn injected(&self) -> Result<&Arc<dyn Eip1193Provider>> {
        self.injected
            .as_ref()
            .ok_or(Error::ProviderUnavailable(self.provider_id))
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        debug!(provider = %self.provider_id, method, "wallet request");
        let result = self.injected()?.request(method, params).await;
        result.map_err(|e| {
            debug!(provider = %self.provider_id, method, code = e.code, message = %e.message, "wallet request failed");
            Error::from(e)
        })
    }

    /// Register `listener` under `event`, dropping any earlier registration
    fn register(&self, event: &'static str, listener: super::EventListener) -> Result<()> {
        let injected = self.injected()?;
        let mut registrations = self.registrations.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = registrations.remove(event) {
            injected.remove_listener(event, previous);
        }
        let id = injected.on(event, listener);
        registrations.insert(event, id);
        Ok(())
    }
}

#[async_trait]
impl ProviderAdapter for EvmAdapter {
    fn provider_id(&self) -> ProviderId {
        self.provider_id
    }

    fn is_available(&self) -> bool {
        self.injected.is_some()
    }

    async fn request_accounts(&self) -> Result<Vec<String>> {
        let value = self.call("eth_requestAccounts", json!([])).await?;
        parse_accounts(&value)
    }

    async fn get_accounts(&self) -> Result<Vec<String>> {
        let value = self.call("eth_accounts", json!([])).await?;
        parse_accounts(&value)
    }

    async fn get_chain_id(&self) -> Result<ChainId> {
        let value = self.call("eth_chainId", json!([])).await?;
        let hex = value
            .as_str()
            .ok_or_else(|| Error::Provider(format!("unexpected eth_chainId response: {}", value)))?;
        ChainId::from_wallet_hex(hex).map_err(|e| Error::Provider(e.to_string()))
    }

    async fn switch_chain(&self, network: &NetworkDescriptor) -> Result<()> {
        debug!(provider = %self.provider_id, method = "wallet_switchEthereumChain", chain = %network.chain_id(), "wallet request");
        let result = self
            .injected()?
            .request("wallet_switchEthereumChain", network.switch_chain_params())
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if e.is_unrecognized_chain() => Err(Error::ChainNotRegistered(network.chain_id())),
            Err(e) => Err(Error::from(e)),
        }
    }

    async fn add_chain(&self, network: &NetworkDescriptor) -> Result<()> {
        self.call("wallet_addEthereumChain", network.add_chain_params()).await?;
        Ok(())
    }

    async fn get_balance(&self, address: &str) -> Result<U256> {
        let value = self.call("eth_getBalance", json!([address, "latest"])).await?;
        let hex = value
            .as_str()
            .ok_or_else(|| Error::Provider(format!("unexpected eth_getBalance response: {}", value)))?;
        parse_quantity(hex)
    }

    async fn send_value_transfer(&self, from: &str, to: &str, amount: U256) -> Result<String> {
        let params = json!([{
            "from": from,
            "to": to,
            "value": format!("0x{:x}", amount),
            "gas": format!("0x{:x}", self.gas_limit),
        }]);

        let value = self.call("eth_sendTransaction", params).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::Provider(format!("unexpected eth_sendTransaction response: {}", value)))
    }

    fn on_accounts_changed(&self, listener: AccountsListener) -> Result<()> {
        let provider_id = self.provider_id;
        self.register(
            ACCOUNTS_CHANGED,
            Arc::new(move |payload: Value| match parse_accounts(&payload) {
                Ok(accounts) => listener(accounts),
                Err(e) => warn!(provider = %provider_id, error = %e, "ignoring malformed accountsChanged payload"),
            }),
        )
    }

    fn on_chain_changed(&self, listener: ChainListener) -> Result<()> {
        let provider_id = self.provider_id;
        self.register(
            CHAIN_CHANGED,
            Arc::new(move |payload: Value| {
                match payload.as_str().map(ChainId::from_wallet_hex) {
                    Some(Ok(chain_id)) => listener(chain_id),
                    _ => warn!(provider = %provider_id, %payload, "ignoring malformed chainChanged payload"),
                }
            }),
        )
    }

    fn remove_listeners(&self) {
        let Some(injected) = self.injected.as_ref() else {
            return;
        };
        let mut registrations = self.registrations.lock().unwrap_or_else(PoisonError::into_inner);
        for (event, id) in registrations.drain() {
            injected.remove_listener(event, id);
        }
    }
}

/// Parse a JSON array of account addresses
fn parse_accounts(value: &Value) -> Result<Vec<String>> {
    let entries = value
        .as_array()
        .ok_or_else(|| Error::Provider(format!("expected an account list, got {}", value)))?;

    entries
        .iter()
        .map(|entry| {
            entry
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| Error::Provider(format!("invalid account entry: {}", entry)))
        })
        .collect()
}

/// Parse a hex quantity such as `0x1bc16d674ec80000`
fn parse_quantity(hex: &str) -> Result<U256> {
    let digits = hex
        .strip_prefix("0x")
        .ok_or_else(|| Error::Provider(format!("invalid quantity: {}", hex)))?;
    if digits.is_empty() {
        return Ok(U256::zero());
    }
    U256::from_str_radix(digits, 16).map_err(|e| Error::Provider(format!("invalid quantity {}: {:?}", hex, e)))
}
