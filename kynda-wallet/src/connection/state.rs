//! Observable connection state

use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorKind};
use crate::network::ChainId;
use crate::provider::ProviderId;

/// Connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionStatus {
    /// No wallet linked
    Disconnected,
    /// Waiting for the user to approve account access
    Connecting,
    /// Account linked, network not verified
    Connected,
    /// Account linked on a different network than required
    NetworkMismatch,
    /// Account linked on the required network
    Ready,
    /// A connect attempt failed; reverts to Disconnected
    Error,
}

impl ConnectionStatus {
    /// Statuses in which an account is linked
    pub fn has_account(&self) -> bool {
        matches!(
            self,
            ConnectionStatus::Connected | ConnectionStatus::NetworkMismatch | ConnectionStatus::Ready
        )
    }
}

/// Latest error, as rendered by the presentation layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&Error> for StateError {
    fn from(error: &Error) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// Snapshot of the wallet connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    pub provider: Option<ProviderId>,
    pub account: Option<String>,
    pub chain_id: Option<ChainId>,
    pub error: Option<StateError>,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            provider: None,
            account: None,
            chain_id: None,
            error: None,
        }
    }
}

impl ConnectionState {
    pub(crate) fn connecting(provider: ProviderId) -> Self {
        Self {
            status: ConnectionStatus::Connecting,
            provider: Some(provider),
            ..Self::default()
        }
    }

    pub(crate) fn connected(provider: ProviderId, account: String) -> Self {
        Self {
            status: ConnectionStatus::Connected,
            provider: Some(provider),
            account: Some(account),
            ..Self::default()
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status == ConnectionStatus::Ready
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    /// Whether the account/status pairing holds
    pub fn is_consistent(&self) -> bool {
        self.account.is_some() == self.status.has_account()
    }
}
