//! Injected wallet objects
//!
//! Wallet extensions expose one object each into the execution context. They
//! are handed to the adapters explicitly so tests can substitute fakes.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::Error;
use crate::network::ChainId;

use super::ProviderId;

/// EIP-1193 user rejected the request
pub const USER_REJECTED: i64 = 4001;
/// EIP-1193 the method is not supported by the wallet
pub const UNSUPPORTED_METHOD: i64 = 4200;
/// MetaMask: the requested chain has not been added
pub const UNRECOGNIZED_CHAIN: i64 = 4902;
/// EIP-1474 a request of this kind is already pending
pub const RESOURCE_UNAVAILABLE: i64 = -32002;
/// EIP-1474 generic server error, used for funding failures
pub const SERVER_ERROR: i64 = -32000;

/// Error object returned by an injected provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn user_rejected() -> Self {
        Self::new(USER_REJECTED, "User rejected the request.")
    }

    pub fn unrecognized_chain(chain_id: &str) -> Self {
        Self::new(
            UNRECOGNIZED_CHAIN,
            format!("Unrecognized chain ID \"{}\". Try adding the chain using wallet_addEthereumChain first.", chain_id),
        )
    }

    /// Mobile wallets wrap 4902 in an internal error under `data.originalError`
    pub fn is_unrecognized_chain(&self) -> bool {
        self.code == UNRECOGNIZED_CHAIN
            || self
                .data
                .as_ref()
                .and_then(|data| data.get("originalError"))
                .and_then(|original| original.get("code"))
                .and_then(Value::as_i64)
                == Some(UNRECOGNIZED_CHAIN)
    }

    fn is_insufficient_funds(&self) -> bool {
        self.code == SERVER_ERROR && self.message.to_ascii_lowercase().contains("insufficient funds")
    }
}

impl From<RpcError> for Error {
    fn from(error: RpcError) -> Self {
        if error.is_unrecognized_chain() {
            return Error::ChainNotRegistered(ChainId::NotApplicable);
        }
        if error.is_insufficient_funds() {
            return Error::InsufficientFunds(error.message);
        }
        match error.code {
            USER_REJECTED => Error::UserRejected,
            UNSUPPORTED_METHOD => Error::Unsupported(error.message),
            RESOURCE_UNAVAILABLE => Error::OperationInProgress,
            _ => Error::Provider(error.message),
        }
    }
}

/// Handle identifying one registered listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Raw event callback on an injected object
pub type EventListener = Arc<dyn Fn(Value) + Send + Sync>;

/// EIP-1193 provider object, as injected by MetaMask-like and Binance-like wallets
#[async_trait]
pub trait Eip1193Provider: Send + Sync {
    async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError>;

    fn on(&self, event: &str, listener: EventListener) -> ListenerId;

    fn remove_listener(&self, event: &str, id: ListenerId);
}

/// Phantom-like Solana provider object
#[async_trait]
pub trait SolanaInjectedProvider: Send + Sync {
    fn is_phantom(&self) -> bool;

    /// Base58 public key of the connected account, if any
    fn public_key(&self) -> Option<String>;

    async fn connect(&self) -> Result<String, RpcError>;

    async fn disconnect(&self) -> Result<(), RpcError>;

    async fn get_balance(&self, public_key: &str) -> Result<u64, RpcError>;

    /// Build, sign and submit a system transfer, returning its signature
    async fn transfer(&self, from: &str, to: &str, lamports: u64) -> Result<String, RpcError>;

    fn on(&self, event: &str, listener: EventListener) -> ListenerId;

    fn remove_listener(&self, event: &str, id: ListenerId);
}

/// The injected objects present in the execution context
#[derive(Clone, Default)]
pub struct InjectedProviders {
    /// `window.ethereum`
    pub ethereum: Option<Arc<dyn Eip1193Provider>>,
    /// `window.BinanceChain`
    pub binance_chain: Option<Arc<dyn Eip1193Provider>>,
    /// `window.solana`
    pub solana: Option<Arc<dyn SolanaInjectedProvider>>,
}

impl InjectedProviders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ethereum(mut self, provider: Arc<dyn Eip1193Provider>) -> Self {
        self.ethereum = Some(provider);
        self
    }

    pub fn with_binance_chain(mut self, provider: Arc<dyn Eip1193Provider>) -> Self {
        self.binance_chain = Some(provider);
        self
    }

    pub fn with_solana(mut self, provider: Arc<dyn SolanaInjectedProvider>) -> Self {
        self.solana = Some(provider);
        self
    }
}

/// Presentation-side hook that opens a wallet's install page
pub trait InstallPageLauncher: Send + Sync {
    fn open(&self, provider: ProviderId, url: &str) -> Result<(), String>;
}

/// Launcher that only records the request in the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogOnlyLauncher;

impl InstallPageLauncher for LogOnlyLauncher {
    fn open(&self, provider: ProviderId, url: &str) -> Result<(), String> {
        warn!(%provider, url, "wallet not installed, install page requested");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_user_rejected() {
        assert_eq!(Error::from(RpcError::user_rejected()), Error::UserRejected);
    }

    #[test]
    fn test_classify_unrecognized_chain() {
        let error = RpcError::unrecognized_chain("0x2c4e8");
        assert!(error.is_unrecognized_chain());
        assert!(matches!(Error::from(error), Error::ChainNotRegistered(_)));

        // Nested form reported by mobile wallets
        let mut nested = RpcError::new(-32603, "Internal JSON-RPC error.");
        nested.data = Some(json!({ "originalError": { "code": 4902 } }));
        assert!(nested.is_unrecognized_chain());
    }

    #[test]
    fn test_classify_insufficient_funds() {
        let error = RpcError::new(SERVER_ERROR, "insufficient funds for gas * price + value");
        assert!(matches!(Error::from(error), Error::InsufficientFunds(_)));
    }

    #[test]
    fn test_classify_other() {
        assert_eq!(Error::from(RpcError::new(RESOURCE_UNAVAILABLE, "pending")), Error::OperationInProgress);
        assert!(matches!(Error::from(RpcError::new(UNSUPPORTED_METHOD, "nope")), Error::Unsupported(_)));
        assert_eq!(
            Error::from(RpcError::new(-32603, "execution reverted")),
            Error::Provider("execution reverted".to_string())
        );
    }
}
