//! Wallet provider functionality
//!
//! This module wraps the idiosyncratic APIs of the supported wallet families
//! behind one capability interface. Adapters never touch connection state;
//! they return results and classified errors for the controller to interpret.

mod injected;
mod ethereum;
mod solana;
mod factory;
pub mod simulated;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use ethers_core::types::U256;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::network::{ChainFamily, ChainId, NetworkDescriptor};

pub use injected::*;
pub use ethereum::*;
pub use solana::*;
pub use factory::*;

/// Supported wallet families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    /// MetaMask-like injected `window.ethereum`
    MetaMask,
    /// Binance-like injected `window.BinanceChain`
    Binance,
    /// Phantom-like injected `window.solana`
    Phantom,
}

impl ProviderId {
    pub const ALL: [ProviderId; 3] = [ProviderId::MetaMask, ProviderId::Binance, ProviderId::Phantom];

    pub fn family(&self) -> ChainFamily {
        match self {
            ProviderId::MetaMask | ProviderId::Binance => ChainFamily::Evm,
            ProviderId::Phantom => ChainFamily::Solana,
        }
    }

    /// Page the user is sent to when the wallet is not installed
    pub fn install_url(&self) -> &'static str {
        match self {
            ProviderId::MetaMask => "https://metamask.io/download/",
            ProviderId::Binance => "https://www.bnbchain.org/en/binance-wallet",
            ProviderId::Phantom => "https://phantom.app/",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderId::MetaMask => "MetaMask",
            ProviderId::Binance => "Binance Wallet",
            ProviderId::Phantom => "Phantom",
        };
        f.write_str(name)
    }
}

impl FromStr for ProviderId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "metamask" => Ok(ProviderId::MetaMask),
            "binance" => Ok(ProviderId::Binance),
            "phantom" => Ok(ProviderId::Phantom),
            other => Err(Error::InvalidInput(format!("unknown wallet provider: {}", other))),
        }
    }
}

/// Notification raised by a wallet outside of an explicit request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    AccountsChanged(Vec<String>),
    ChainChanged(ChainId),
}

/// Callback receiving the new account list
pub type AccountsListener = Arc<dyn Fn(Vec<String>) + Send + Sync>;

/// Callback receiving the new chain id
pub type ChainListener = Arc<dyn Fn(ChainId) + Send + Sync>;

/// Uniform capability interface over a wallet provider
///
/// Registering a listener for an event kind replaces any earlier registration
/// of the same kind on the same adapter.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn provider_id(&self) -> ProviderId;

    fn family(&self) -> ChainFamily {
        self.provider_id().family()
    }

    /// Whether the provider's injected object is present
    fn is_available(&self) -> bool;

    /// Prompt the user to expose accounts
    async fn request_accounts(&self) -> Result<Vec<String>>;

    /// Accounts already exposed, without prompting
    async fn get_accounts(&self) -> Result<Vec<String>>;

    async fn get_chain_id(&self) -> Result<ChainId>;

    async fn switch_chain(&self, network: &NetworkDescriptor) -> Result<()>;

    async fn add_chain(&self, network: &NetworkDescriptor) -> Result<()>;

    /// Native-unit balance of an address
    async fn get_balance(&self, address: &str) -> Result<U256>;

    /// Submit a native-currency transfer, returning the transaction hash
    async fn send_value_transfer(&self, from: &str, to: &str, amount: U256) -> Result<String>;

    fn on_accounts_changed(&self, listener: AccountsListener) -> Result<()>;

    fn on_chain_changed(&self, listener: ChainListener) -> Result<()>;

    fn remove_listeners(&self);

    /// Tell the wallet this session is over, where the wallet supports it
    async fn release(&self) -> Result<()> {
        Ok(())
    }
}
