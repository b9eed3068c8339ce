//! Kynda Wallet Core - wallet linking and payments
//!
//! This library links a browser-injected wallet provider (MetaMask, Binance
//! Wallet or Phantom) to an application account, keeps the linked wallet on
//! the required network, and submits native-currency payments while
//! maintaining a local ledger.

pub mod error;
pub mod config;
pub mod account;
pub mod network;
pub mod provider;
pub mod connection;
pub mod transaction;
pub mod service;

// Re-export commonly used types for convenience
pub use config::WalletConfig;
pub use connection::{ConnectionController, ConnectionState, ConnectionStatus};
pub use error::{Error, ErrorKind, Result};
pub use network::{ChainId, NetworkDescriptor};
pub use provider::{InjectedProviders, ProviderId};
pub use service::{WalletService, WalletSnapshot};
pub use transaction::{CurrencyConverter, LedgerEntry, TransactionSubmitter};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
