//! Network identity
//!
//! The required blockchain network is described once, validated at
//! construction time, and shared read-only by the connection controller and
//! the adapters that format chain-switch and chain-add requests.

mod descriptor;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

pub use descriptor::*;

/// Camp Network Testnet V2 chain id (0x2C4E8)
pub const CAMP_TESTNET_CHAIN_ID: u64 = 181_480;

/// Camp Network Testnet V2 display name
pub const CAMP_TESTNET_NAME: &str = "Camp Network Testnet V2";

/// Camp Network Testnet V2 RPC endpoint
pub const CAMP_TESTNET_RPC_URL: &str = "https://rpc-camp-network-4xje7wy105.t.conduit.xyz";

/// Camp Network Testnet V2 block explorer
pub const CAMP_TESTNET_EXPLORER_URL: &str = "https://explorerl2new-camp-network-4xje7wy105.t.conduit.xyz";

// Wallets reject chain ids outside the JavaScript safe integer range.
const MAX_EVM_CHAIN_ID: u64 = (1 << 53) - 1;

/// Family of chains a wallet provider speaks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChainFamily {
    /// Ethereum-compatible chains
    Evm,
    /// Solana clusters
    Solana,
}

/// Identifier of the chain a wallet is currently on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainId {
    /// EIP-155 chain id
    Evm(u64),
    /// Reported by wallets where chain switching does not apply
    NotApplicable,
}

impl ChainId {
    /// Parse an EIP-695 hex quantity such as `0x2C4E8`
    pub fn from_hex(value: &str) -> Result<Self> {
        parse_evm_chain_id(value, true).map(ChainId::Evm)
    }

    /// Parse a chain id reported by a wallet, tolerating leading zeros such as `0x01`
    pub fn from_wallet_hex(value: &str) -> Result<Self> {
        parse_evm_chain_id(value, false).map(ChainId::Evm)
    }

    /// Canonical lowercase hex form expected in wallet requests
    pub fn to_hex(&self) -> Option<String> {
        match self {
            ChainId::Evm(id) => Some(format!("0x{:x}", id)),
            ChainId::NotApplicable => None,
        }
    }

    pub fn family(&self) -> Option<ChainFamily> {
        match self {
            ChainId::Evm(_) => Some(ChainFamily::Evm),
            ChainId::NotApplicable => None,
        }
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainId::Evm(id) => write!(f, "0x{:x}", id),
            ChainId::NotApplicable => f.write_str("n/a"),
        }
    }
}

impl FromStr for ChainId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s == "n/a" {
            return Ok(ChainId::NotApplicable);
        }
        ChainId::from_hex(s)
    }
}

impl Serialize for ChainId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ChainId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Validate and parse an EVM chain id in hex quantity form; `strict` refuses leading zeros
fn parse_evm_chain_id(value: &str, strict: bool) -> Result<u64> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .ok_or_else(|| Error::InvalidNetwork(format!("chain id {} is missing the 0x prefix", value)))?;

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::InvalidNetwork(format!("chain id {} is not a hex quantity", value)));
    }
    if strict && digits.starts_with('0') {
        return Err(Error::InvalidNetwork(format!("chain id {} has leading zeros", value)));
    }

    let id = u64::from_str_radix(digits, 16)
        .map_err(|e| Error::InvalidNetwork(format!("chain id {}: {}", value, e)))?;

    if id == 0 || id > MAX_EVM_CHAIN_ID {
        return Err(Error::InvalidNetwork(format!("chain id {} is out of range", value)));
    }

    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chain_id() {
        assert_eq!(ChainId::from_hex("0x2C4E8").unwrap(), ChainId::Evm(CAMP_TESTNET_CHAIN_ID));
        assert_eq!(ChainId::from_hex("0x2c4e8").unwrap(), ChainId::Evm(CAMP_TESTNET_CHAIN_ID));
        assert_eq!(ChainId::from_hex("0x1").unwrap(), ChainId::Evm(1));
    }

    #[test]
    fn test_reject_malformed_chain_id() {
        assert!(ChainId::from_hex("2C4E8").is_err()); // Missing 0x
        assert!(ChainId::from_hex("0x").is_err()); // Empty
        assert!(ChainId::from_hex("0x0").is_err()); // Zero
        assert!(ChainId::from_hex("0x02c4e8").is_err()); // Leading zero
        assert!(ChainId::from_hex("0xZZ").is_err()); // Invalid hex
        assert!(ChainId::from_hex("0x20000000000000").is_err()); // Above 2^53 - 1
    }

    #[test]
    fn test_wallet_chain_id_tolerates_padding() {
        assert_eq!(ChainId::from_wallet_hex("0x01").unwrap(), ChainId::Evm(1));
        assert_eq!(ChainId::from_wallet_hex("0x0002C4E8").unwrap(), ChainId::Evm(CAMP_TESTNET_CHAIN_ID));
        assert!(ChainId::from_wallet_hex("0x00").is_err());
        assert!(ChainId::from_wallet_hex("1").is_err());
        assert!(ChainId::from_hex("0x01").is_err());
    }

    #[test]
    fn test_chain_id_formatting() {
        let chain_id = ChainId::Evm(CAMP_TESTNET_CHAIN_ID);
        assert_eq!(chain_id.to_string(), "0x2c4e8");
        assert_eq!(chain_id.to_hex().as_deref(), Some("0x2c4e8"));
        assert_eq!(ChainId::NotApplicable.to_hex(), None);
        assert_eq!("n/a".parse::<ChainId>().unwrap(), ChainId::NotApplicable);
    }

    #[test]
    fn test_chain_id_serde() {
        let json = serde_json::to_string(&ChainId::Evm(CAMP_TESTNET_CHAIN_ID)).unwrap();
        assert_eq!(json, "\"0x2c4e8\"");
        let back: ChainId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ChainId::Evm(CAMP_TESTNET_CHAIN_ID));
    }
}
