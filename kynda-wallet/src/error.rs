//! Error types for the wallet linking core

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::network::ChainId;
use crate::provider::ProviderId;

/// Custom error type for wallet linking operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The wallet extension or app is not present
    #[error("{0} is not installed")]
    ProviderUnavailable(ProviderId),

    /// The user declined a wallet prompt
    #[error("Request rejected by the user")]
    UserRejected,

    /// The wallet does not know the requested chain
    #[error("Chain {0} is not registered in the wallet")]
    ChainNotRegistered(ChainId),

    /// Adding or switching to the required network was exhausted
    #[error("Network setup failed: {0}")]
    NetworkSetupFailed(String),

    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    /// Any other provider failure, message kept verbatim
    #[error("Provider error: {0}")]
    Provider(String),

    /// A connect attempt is already in flight
    #[error("A connection attempt is already in progress")]
    AlreadyConnecting,

    /// Another wallet call is outstanding against the active adapter
    #[error("Another wallet request is already in progress")]
    OperationInProgress,

    #[error("Wallet is not ready: {0}")]
    NotReady(String),

    #[error("Not supported: {0}")]
    Unsupported(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid network descriptor: {0}")]
    InvalidNetwork(String),

    #[error("Conversion error: {0}")]
    Conversion(String),

    #[error("Ledger error: {0}")]
    Ledger(String),
}

/// Serializable discriminant of [`Error`], rendered by the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    ProviderUnavailable,
    UserRejected,
    ChainNotRegistered,
    NetworkSetupFailed,
    InsufficientFunds,
    ProviderError,
    AlreadyConnecting,
    OperationInProgress,
    NotReady,
    Unsupported,
    InvalidInput,
    InvalidNetwork,
    Conversion,
    Ledger,
}

impl Error {
    /// Classify this error into the presentation taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ProviderUnavailable(_) => ErrorKind::ProviderUnavailable,
            Error::UserRejected => ErrorKind::UserRejected,
            Error::ChainNotRegistered(_) => ErrorKind::ChainNotRegistered,
            Error::NetworkSetupFailed(_) => ErrorKind::NetworkSetupFailed,
            Error::InsufficientFunds(_) => ErrorKind::InsufficientFunds,
            Error::Provider(_) => ErrorKind::ProviderError,
            Error::AlreadyConnecting => ErrorKind::AlreadyConnecting,
            Error::OperationInProgress => ErrorKind::OperationInProgress,
            Error::NotReady(_) => ErrorKind::NotReady,
            Error::Unsupported(_) => ErrorKind::Unsupported,
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
            Error::InvalidNetwork(_) => ErrorKind::InvalidNetwork,
            Error::Conversion(_) => ErrorKind::Conversion,
            Error::Ledger(_) => ErrorKind::Ledger,
        }
    }

    /// Re-entrancy guards are de-duplicated by the UI, not shown as failures
    pub fn is_reentrancy(&self) -> bool {
        matches!(self, Error::AlreadyConnecting | Error::OperationInProgress)
    }
}

/// Result type for wallet linking operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind() {
        assert_eq!(Error::UserRejected.kind(), ErrorKind::UserRejected);
        assert_eq!(
            Error::ProviderUnavailable(ProviderId::MetaMask).kind(),
            ErrorKind::ProviderUnavailable
        );
        assert_eq!(Error::Provider("boom".to_string()).kind(), ErrorKind::ProviderError);
        assert!(Error::AlreadyConnecting.is_reentrancy());
        assert!(!Error::UserRejected.is_reentrancy());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            Error::ProviderUnavailable(ProviderId::Phantom).to_string(),
            "Phantom is not installed"
        );
        assert_eq!(
            Error::ChainNotRegistered(ChainId::Evm(181480)).to_string(),
            "Chain 0x2c4e8 is not registered in the wallet"
        );
    }
}
