//! Required network description

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{
    ChainFamily, ChainId, CAMP_TESTNET_CHAIN_ID, CAMP_TESTNET_EXPLORER_URL, CAMP_TESTNET_NAME,
    CAMP_TESTNET_RPC_URL,
};
use crate::error::{Error, Result};

/// Native currency metadata, formatted as wallets expect in chain-add requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// Immutable description of the network the wallet must be on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "NetworkDescriptorBuilder", into = "NetworkDescriptorBuilder")]
pub struct NetworkDescriptor {
    chain_id: ChainId,
    display_name: String,
    native_currency: NativeCurrency,
    rpc_endpoints: Vec<String>,
    explorer_endpoints: Vec<String>,
}

impl NetworkDescriptor {
    pub fn builder() -> NetworkDescriptorBuilder {
        NetworkDescriptorBuilder::default()
    }

    /// Camp Network Testnet V2
    pub fn camp_testnet() -> Self {
        Self {
            chain_id: ChainId::Evm(CAMP_TESTNET_CHAIN_ID),
            display_name: CAMP_TESTNET_NAME.to_string(),
            native_currency: NativeCurrency {
                name: "ETH".to_string(),
                symbol: "ETH".to_string(),
                decimals: 18,
            },
            rpc_endpoints: vec![CAMP_TESTNET_RPC_URL.to_string()],
            explorer_endpoints: vec![CAMP_TESTNET_EXPLORER_URL.to_string()],
        }
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    pub fn family(&self) -> ChainFamily {
        ChainFamily::Evm
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn native_currency(&self) -> &NativeCurrency {
        &self.native_currency
    }

    pub fn decimals(&self) -> u8 {
        self.native_currency.decimals
    }

    pub fn rpc_endpoints(&self) -> &[String] {
        &self.rpc_endpoints
    }

    pub fn explorer_endpoints(&self) -> &[String] {
        &self.explorer_endpoints
    }

    /// Explorer link for a submitted transaction
    pub fn explorer_tx_url(&self, tx_hash: &str) -> Option<String> {
        self.explorer_endpoints
            .first()
            .map(|base| format!("{}/tx/{}", base.trim_end_matches('/'), tx_hash))
    }

    /// Parameters for `wallet_switchEthereumChain`
    pub fn switch_chain_params(&self) -> Value {
        json!([{ "chainId": self.chain_id.to_string() }])
    }

    /// Parameters for `wallet_addEthereumChain` (EIP-3085)
    pub fn add_chain_params(&self) -> Value {
        json!([{
            "chainId": self.chain_id.to_string(),
            "chainName": self.display_name,
            "nativeCurrency": {
                "name": self.native_currency.name,
                "symbol": self.native_currency.symbol,
                "decimals": self.native_currency.decimals,
            },
            "rpcUrls": self.rpc_endpoints,
            "blockExplorerUrls": self.explorer_endpoints,
        }])
    }
}

impl Default for NetworkDescriptor {
    fn default() -> Self {
        Self::camp_testnet()
    }
}

/// Builder validating a [`NetworkDescriptor`]; also its serialized form
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkDescriptorBuilder {
    pub chain_id: String,
    pub chain_name: String,
    pub native_currency: Option<NativeCurrency>,
    #[serde(default)]
    pub rpc_urls: Vec<String>,
    #[serde(default)]
    pub block_explorer_urls: Vec<String>,
}

impl NetworkDescriptorBuilder {
    /// Chain id as a hex quantity, e.g. `0x2C4E8`
    pub fn chain_id(mut self, chain_id: impl Into<String>) -> Self {
        self.chain_id = chain_id.into();
        self
    }

    pub fn chain_name(mut self, name: impl Into<String>) -> Self {
        self.chain_name = name.into();
        self
    }

    pub fn native_currency(mut self, name: impl Into<String>, symbol: impl Into<String>, decimals: u8) -> Self {
        self.native_currency = Some(NativeCurrency {
            name: name.into(),
            symbol: symbol.into(),
            decimals,
        });
        self
    }

    pub fn rpc_url(mut self, url: impl Into<String>) -> Self {
        self.rpc_urls.push(url.into());
        self
    }

    pub fn explorer_url(mut self, url: impl Into<String>) -> Self {
        self.block_explorer_urls.push(url.into());
        self
    }

    pub fn build(self) -> Result<NetworkDescriptor> {
        let chain_id = ChainId::from_hex(&self.chain_id)?;

        if self.chain_name.trim().is_empty() {
            return Err(Error::InvalidNetwork("chain name is empty".to_string()));
        }

        let native_currency = self
            .native_currency
            .ok_or_else(|| Error::InvalidNetwork("native currency is missing".to_string()))?;
        if native_currency.name.trim().is_empty() {
            return Err(Error::InvalidNetwork("native currency name is empty".to_string()));
        }
        // Same bounds wallets apply to wallet_addEthereumChain
        let symbol_len = native_currency.symbol.chars().count();
        if !(2..=6).contains(&symbol_len) {
            return Err(Error::InvalidNetwork(format!(
                "native currency symbol {:?} must be 2-6 characters",
                native_currency.symbol
            )));
        }

        validate_endpoints("RPC", &self.rpc_urls)?;
        validate_endpoints("explorer", &self.block_explorer_urls)?;

        Ok(NetworkDescriptor {
            chain_id,
            display_name: self.chain_name,
            native_currency,
            rpc_endpoints: self.rpc_urls,
            explorer_endpoints: self.block_explorer_urls,
        })
    }
}

impl TryFrom<NetworkDescriptorBuilder> for NetworkDescriptor {
    type Error = Error;

    fn try_from(builder: NetworkDescriptorBuilder) -> Result<Self> {
        builder.build()
    }
}

impl From<NetworkDescriptor> for NetworkDescriptorBuilder {
    fn from(descriptor: NetworkDescriptor) -> Self {
        Self {
            chain_id: descriptor.chain_id.to_string(),
            chain_name: descriptor.display_name,
            native_currency: Some(descriptor.native_currency),
            rpc_urls: descriptor.rpc_endpoints,
            block_explorer_urls: descriptor.explorer_endpoints,
        }
    }
}

fn validate_endpoints(kind: &str, urls: &[String]) -> Result<()> {
    if urls.is_empty() {
        return Err(Error::InvalidNetwork(format!("at least one {} endpoint is required", kind)));
    }
    for url in urls {
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(Error::InvalidNetwork(format!("{} endpoint {} is not an http(s) URL", kind, url)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camp_builder() -> NetworkDescriptorBuilder {
        NetworkDescriptor::builder()
            .chain_id("0x2C4E8")
            .chain_name(CAMP_TESTNET_NAME)
            .native_currency("ETH", "ETH", 18)
            .rpc_url(CAMP_TESTNET_RPC_URL)
            .explorer_url(CAMP_TESTNET_EXPLORER_URL)
    }

    #[test]
    fn test_builder_matches_constant() {
        let descriptor = camp_builder().build().unwrap();
        assert_eq!(descriptor, NetworkDescriptor::camp_testnet());
        assert_eq!(descriptor.decimals(), 18);
    }

    #[test]
    fn test_builder_rejects_empty_endpoints() {
        let mut builder = camp_builder();
        builder.rpc_urls.clear();
        assert!(matches!(builder.build(), Err(Error::InvalidNetwork(_))));

        let mut builder = camp_builder();
        builder.block_explorer_urls.clear();
        assert!(matches!(builder.build(), Err(Error::InvalidNetwork(_))));
    }

    #[test]
    fn test_builder_rejects_bad_chain_id() {
        assert!(camp_builder().chain_id("181480").build().is_err());
        assert!(camp_builder().chain_id("0xnope").build().is_err());
    }

    #[test]
    fn test_add_chain_params() {
        let params = NetworkDescriptor::camp_testnet().add_chain_params();
        let entry = &params[0];
        assert_eq!(entry["chainId"], "0x2c4e8");
        assert_eq!(entry["chainName"], CAMP_TESTNET_NAME);
        assert_eq!(entry["nativeCurrency"]["symbol"], "ETH");
        assert_eq!(entry["nativeCurrency"]["decimals"], 18);
        assert_eq!(entry["rpcUrls"][0], CAMP_TESTNET_RPC_URL);
        assert_eq!(entry["blockExplorerUrls"][0], CAMP_TESTNET_EXPLORER_URL);

        let switch = NetworkDescriptor::camp_testnet().switch_chain_params();
        assert_eq!(switch[0]["chainId"], "0x2c4e8");
    }

    #[test]
    fn test_descriptor_serde_validates() {
        let json = serde_json::to_value(NetworkDescriptor::camp_testnet()).unwrap();
        assert_eq!(json["chainId"], "0x2c4e8");
        let back: NetworkDescriptor = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(back, NetworkDescriptor::camp_testnet());

        let mut broken = json;
        broken["rpcUrls"] = serde_json::json!([]);
        assert!(serde_json::from_value::<NetworkDescriptor>(broken).is_err());
    }

    #[test]
    fn test_explorer_tx_url() {
        let url = NetworkDescriptor::camp_testnet().explorer_tx_url("0xabc").unwrap();
        assert_eq!(url, format!("{}/tx/0xabc", CAMP_TESTNET_EXPLORER_URL));
    }
}
