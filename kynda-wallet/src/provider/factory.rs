//! Adapter factory

use std::sync::Arc;

use super::{EvmAdapter, InjectedProviders, ProviderAdapter, ProviderId, SolanaAdapter, TRANSFER_GAS_LIMIT};

/// Creates the adapter for a selected provider from the injected objects
#[derive(Clone)]
pub struct AdapterFactory {
    injected: InjectedProviders,
    gas_limit: u64,
}

impl AdapterFactory {
    pub fn new(injected: InjectedProviders) -> Self {
        Self {
            injected,
            gas_limit: TRANSFER_GAS_LIMIT,
        }
    }

    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = gas_limit;
        self
    }

    /// Create a new adapter
    pub fn create_adapter(&self, provider_id: ProviderId) -> Arc<dyn ProviderAdapter> {
        match provider_id {
            ProviderId::MetaMask => {
                let adapter = EvmAdapter::new(provider_id, self.injected.ethereum.clone())
                    .with_gas_limit(self.gas_limit);
                Arc::new(adapter)
            }
            ProviderId::Binance => {
                let adapter = EvmAdapter::new(provider_id, self.injected.binance_chain.clone())
                    .with_gas_limit(self.gas_limit);
                Arc::new(adapter)
            }
            ProviderId::Phantom => Arc::new(SolanaAdapter::new(self.injected.solana.clone())),
        }
    }

    /// Providers whose injected object is present, for the selection screen
    pub fn available_providers(&self) -> Vec<ProviderId> {
        ProviderId::ALL
            .into_iter()
            .filter(|id| self.create_adapter(*id).is_available())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::simulated::{SimulatedEvmWallet, SimulatedPhantom};

    #[test]
    fn test_available_providers() {
        let factory = AdapterFactory::new(InjectedProviders::new());
        assert!(factory.available_providers().is_empty());

        let injected = InjectedProviders::new()
            .with_ethereum(Arc::new(SimulatedEvmWallet::new()))
            .with_solana(Arc::new(SimulatedPhantom::new()));
        let factory = AdapterFactory::new(injected);
        assert_eq!(
            factory.available_providers(),
            vec![ProviderId::MetaMask, ProviderId::Phantom]
        );
    }

    #[test]
    fn test_adapter_matches_provider() {
        let factory = AdapterFactory::new(InjectedProviders::new());
        for id in ProviderId::ALL {
            let adapter = factory.create_adapter(id);
            assert_eq!(adapter.provider_id(), id);
            assert_eq!(adapter.family(), id.family());
        }
    }
}
