//! Wallet configuration

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::network::{NetworkDescriptor, NetworkDescriptorBuilder};
use crate::provider::TRANSFER_GAS_LIMIT;

/// Naira per ETH used by the tutoring app
pub const DEFAULT_EXCHANGE_RATE: i64 = 450_000;

pub const DEFAULT_DISPLAY_CURRENCY: &str = "NGN";

pub const DEFAULT_COUNTERPARTY: &str = "Tutor";

/// Configuration for the wallet core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    /// Network payments must happen on
    pub network: NetworkDescriptor,
    /// Display-currency units per whole native coin
    pub exchange_rate: Decimal,
    pub display_currency: String,
    /// Label recorded on payment entries
    pub counterparty: String,
    pub gas_limit: u64,
    /// Reject recipients that are not well-formed for the linked chain family
    pub validate_recipients: bool,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            network: NetworkDescriptor::camp_testnet(),
            exchange_rate: Decimal::from(DEFAULT_EXCHANGE_RATE),
            display_currency: DEFAULT_DISPLAY_CURRENCY.to_string(),
            counterparty: DEFAULT_COUNTERPARTY.to_string(),
            gas_limit: TRANSFER_GAS_LIMIT,
            validate_recipients: false,
        }
    }
}

impl WalletConfig {
    /// Create configuration from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Apply overrides read through `lookup` on top of the defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        let rpc_url = lookup("KYNDA_RPC_URL");
        let explorer_url = lookup("KYNDA_EXPLORER_URL");
        if rpc_url.is_some() || explorer_url.is_some() {
            let mut builder = NetworkDescriptorBuilder::from(config.network);
            if let Some(url) = rpc_url {
                builder.rpc_urls = vec![url];
            }
            if let Some(url) = explorer_url {
                builder.block_explorer_urls = vec![url];
            }
            config.network = builder.build()?;
        }

        if let Some(rate) = lookup("KYNDA_EXCHANGE_RATE") {
            config.exchange_rate = parse_var("KYNDA_EXCHANGE_RATE", &rate)?;
        }
        if let Some(currency) = lookup("KYNDA_DISPLAY_CURRENCY") {
            config.display_currency = currency;
        }
        if let Some(gas) = lookup("KYNDA_GAS_LIMIT") {
            config.gas_limit = parse_var("KYNDA_GAS_LIMIT", &gas)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.exchange_rate <= Decimal::ZERO {
            return Err(Error::InvalidInput(format!(
                "exchange rate must be positive, got {}",
                self.exchange_rate
            )));
        }
        if self.display_currency.trim().is_empty() {
            return Err(Error::InvalidInput("display currency is empty".to_string()));
        }
        if self.gas_limit == 0 {
            return Err(Error::InvalidInput("gas limit must be non-zero".to_string()));
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::InvalidInput(format!("{}={:?}: {}", name, value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = WalletConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, WalletConfig::default());
        assert_eq!(config.exchange_rate, Decimal::from(450_000));
        assert_eq!(config.gas_limit, 21_000);
        assert!(!config.validate_recipients);
    }

    #[test]
    fn test_overrides() {
        let config = WalletConfig::from_lookup(lookup(&[
            ("KYNDA_RPC_URL", "https://rpc.example.org"),
            ("KYNDA_EXCHANGE_RATE", "1500.5"),
            ("KYNDA_DISPLAY_CURRENCY", "USD"),
            ("KYNDA_GAS_LIMIT", "30000"),
        ]))
        .unwrap();

        assert_eq!(config.network.rpc_endpoints().to_vec(), vec!["https://rpc.example.org".to_string()]);
        assert_eq!(config.network.chain_id(), NetworkDescriptor::camp_testnet().chain_id());
        assert_eq!(config.exchange_rate, Decimal::new(15005, 1));
        assert_eq!(config.display_currency, "USD");
        assert_eq!(config.gas_limit, 30_000);
    }

    #[test]
    fn test_invalid_values() {
        assert!(WalletConfig::from_lookup(lookup(&[("KYNDA_GAS_LIMIT", "lots")])).is_err());
        assert!(WalletConfig::from_lookup(lookup(&[("KYNDA_EXCHANGE_RATE", "-1")])).is_err());
        assert!(matches!(
            WalletConfig::from_lookup(lookup(&[("KYNDA_RPC_URL", "ftp://rpc.example.org")])),
            Err(Error::InvalidNetwork(_))
        ));
    }

    #[test]
    fn test_serde_round_trip() {
        let json = serde_json::to_string(&WalletConfig::default()).unwrap();
        let config: WalletConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, WalletConfig::default());

        let partial: WalletConfig = serde_json::from_str(r#"{"gas_limit": 50000}"#).unwrap();
        assert_eq!(partial.gas_limit, 50_000);
        assert_eq!(partial.display_currency, "NGN");
    }
}
