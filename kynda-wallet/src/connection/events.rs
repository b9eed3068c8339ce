//! Provider event bridge
//!
//! Subscribes to an adapter's account and chain notifications when the adapter
//! becomes active and queues them, in emission order, for the controller. The
//! subscriptions live exactly as long as the bridge: dropping it removes them.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{mpsc, Notify};
use tracing::debug;

use crate::error::Result;
use crate::provider::{ProviderAdapter, ProviderEvent, ProviderId};

pub struct EventBridge {
    adapter: Arc<dyn ProviderAdapter>,
    receiver: mpsc::UnboundedReceiver<ProviderEvent>,
    /// Received but not yet handed out
    queued: VecDeque<ProviderEvent>,
}

impl EventBridge {
    /// Register listeners on `adapter`; `signal` is notified whenever an event is queued
    pub fn attach(adapter: Arc<dyn ProviderAdapter>, signal: Arc<Notify>) -> Result<Self> {
        let (sender, receiver) = mpsc::unbounded_channel();

        let accounts_sender = sender.clone();
        let accounts_signal = signal.clone();
        let chain_sender = sender;
        let chain_signal = signal;

        // Build the bridge first so a failed registration below still unwinds through Drop
        let bridge = Self {
            adapter,
            receiver,
            queued: VecDeque::new(),
        };

        bridge.adapter.on_accounts_changed(Arc::new(move |accounts| {
            if accounts_sender.send(ProviderEvent::AccountsChanged(accounts)).is_ok() {
                accounts_signal.notify_one();
            }
        }))?;
        bridge.adapter.on_chain_changed(Arc::new(move |chain_id| {
            if chain_sender.send(ProviderEvent::ChainChanged(chain_id)).is_ok() {
                chain_signal.notify_one();
            }
        }))?;

        debug!(provider = %bridge.adapter.provider_id(), "provider listeners attached");
        Ok(bridge)
    }

    pub fn provider_id(&self) -> ProviderId {
        self.adapter.provider_id()
    }

    /// Take every queued event, oldest first
    pub fn drain(&mut self) -> Vec<ProviderEvent> {
        self.receive();
        self.queued.drain(..).collect()
    }

    pub fn has_pending(&mut self) -> bool {
        self.receive();
        !self.queued.is_empty()
    }

    /// Whether the wallet revoked account access in a queued event
    pub fn has_revocation(&mut self) -> bool {
        self.receive();
        self.queued
            .iter()
            .any(|event| matches!(event, ProviderEvent::AccountsChanged(accounts) if accounts.is_empty()))
    }

    fn receive(&mut self) {
        while let Ok(event) = self.receiver.try_recv() {
            self.queued.push_back(event);
        }
    }
}

impl Drop for EventBridge {
    fn drop(&mut self) {
        self.adapter.remove_listeners();
        debug!(provider = %self.adapter.provider_id(), "provider listeners removed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::ChainId;
    use crate::provider::simulated::SimulatedEvmWallet;
    use crate::provider::EvmAdapter;

    #[test]
    fn test_bridge_queues_in_order_and_releases() {
        let wallet = Arc::new(SimulatedEvmWallet::new());
        let adapter: Arc<dyn ProviderAdapter> = Arc::new(EvmAdapter::new(ProviderId::MetaMask, Some(wallet.clone())));
        let signal = Arc::new(Notify::new());

        let mut bridge = EventBridge::attach(adapter, signal).unwrap();
        assert_eq!(wallet.listener_count("accountsChanged"), 1);
        assert_eq!(wallet.listener_count("chainChanged"), 1);

        wallet.emit_chain_changed(181480);
        wallet.emit_accounts_changed(&[]);
        assert_eq!(
            bridge.drain(),
            vec![
                ProviderEvent::ChainChanged(ChainId::Evm(181480)),
                ProviderEvent::AccountsChanged(Vec::new()),
            ]
        );
        assert!(bridge.drain().is_empty());
        assert!(!bridge.has_pending());

        wallet.emit_chain_changed(1);
        assert!(bridge.has_pending());
        assert!(!bridge.has_revocation());
        wallet.emit_accounts_changed(&[]);
        assert!(bridge.has_revocation());
        // Looking ahead keeps the events queued
        assert_eq!(bridge.drain().len(), 2);

        drop(bridge);
        assert_eq!(wallet.listener_count("accountsChanged"), 0);
        assert_eq!(wallet.listener_count("chainChanged"), 0);
    }

    #[test]
    fn test_reattach_does_not_duplicate_listeners() {
        let wallet = Arc::new(SimulatedEvmWallet::new());
        let adapter: Arc<dyn ProviderAdapter> = Arc::new(EvmAdapter::new(ProviderId::MetaMask, Some(wallet.clone())));

        let first = EventBridge::attach(adapter.clone(), Arc::new(Notify::new())).unwrap();
        std::mem::forget(first);
        let _second = EventBridge::attach(adapter, Arc::new(Notify::new())).unwrap();
        assert_eq!(wallet.listener_count("accountsChanged"), 1);
    }
}
