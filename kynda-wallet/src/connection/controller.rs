//! Connection controller
//!
//! Owns the active adapter and the observable [`ConnectionState`]. Wallet
//! requests run one at a time behind a request gate; a second caller is
//! refused with [`Error::AlreadyConnecting`] or [`Error::OperationInProgress`]
//! instead of queueing behind the first.
//!
//! Disconnecting and wallet-side revocation never wait for the gate. They
//! release the session at once and bump its generation; a request still
//! outstanding against the released session then leaves the state alone.

use std::sync::{Arc, Mutex as StdMutex, MutexGuard as StdMutexGuard, PoisonError};

use ethers_core::types::U256;
use tokio::sync::{watch, Mutex, MutexGuard, Notify};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::network::{ChainFamily, ChainId, NetworkDescriptor};
use crate::provider::{AdapterFactory, InstallPageLauncher, ProviderAdapter, ProviderEvent, ProviderId};

use super::{ConnectionState, ConnectionStatus, EventBridge, StateError};

/// The adapter currently driving the connection, with its event subscription
struct ActiveSession {
    adapter: Arc<dyn ProviderAdapter>,
    bridge: EventBridge,
}

/// The active session and a counter bumped every time a session is let go
#[derive(Default)]
struct SessionSlot {
    active: Option<ActiveSession>,
    generation: u64,
}

/// Exclusive right to issue wallet requests, bound to one session generation
struct Operation<'a> {
    controller: &'a ConnectionController,
    gate: Option<MutexGuard<'a, ()>>,
    generation: u64,
}

impl Drop for Operation<'_> {
    fn drop(&mut self) {
        drop(self.gate.take());
        // Events queued after the last drain would otherwise wait for the next one
        if self.controller.has_queued_events() {
            self.controller.event_signal.notify_one();
        }
    }
}

/// Native balance read through the active adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceReading {
    pub account: String,
    pub chain_id: Option<ChainId>,
    pub amount: U256,
}

pub struct ConnectionController {
    network: Arc<NetworkDescriptor>,
    factory: AdapterFactory,
    launcher: Arc<dyn InstallPageLauncher>,
    gate: Mutex<()>,
    session: StdMutex<SessionSlot>,
    state: watch::Sender<ConnectionState>,
    event_signal: Arc<Notify>,
}

impl ConnectionController {
    pub fn new(
        network: Arc<NetworkDescriptor>,
        factory: AdapterFactory,
        launcher: Arc<dyn InstallPageLauncher>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::default());
        Self {
            network,
            factory,
            launcher,
            gate: Mutex::new(()),
            session: StdMutex::new(SessionSlot::default()),
            state,
            event_signal: Arc::new(Notify::new()),
        }
    }

    /// The network payments must happen on
    pub fn network(&self) -> &NetworkDescriptor {
        &self.network
    }

    /// Current state snapshot
    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    /// Receive every state transition
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Notified whenever a provider event is queued; call [`Self::process_events`] in response
    pub fn event_signal(&self) -> Arc<Notify> {
        self.event_signal.clone()
    }

    pub fn available_providers(&self) -> Vec<ProviderId> {
        self.factory.available_providers()
    }

    /// Chain family of the linked provider, if any
    pub fn active_family(&self) -> Option<ChainFamily> {
        self.state.borrow().provider.map(|provider| provider.family())
    }

    /// Link `provider` and bring it onto the required network.
    ///
    /// Any previously active adapter is released first. On success the
    /// returned state is `Ready`, or `NetworkMismatch`/`Connected` with the
    /// network error recorded when the switch could not be completed; in the
    /// latter case the network error is also returned.
    pub async fn connect(&self, provider: ProviderId) -> Result<ConnectionState> {
        let mut op = self.begin()?;

        let (previous, generation) = self.detach();
        op.generation = generation;
        if let Some(previous) = previous {
            self.release(previous).await;
        }

        let adapter = self.factory.create_adapter(provider);
        if !adapter.is_available() {
            let url = provider.install_url();
            info!(%provider, url, "wallet not installed, opening install page");
            if let Err(e) = self.launcher.open(provider, url) {
                warn!(%provider, error = %e, "failed to open install page");
            }
            return Err(self.fail_connect(&op, provider, Error::ProviderUnavailable(provider)));
        }

        self.write(&op, |state| *state = ConnectionState::connecting(provider));
        let bridge = match EventBridge::attach(adapter.clone(), self.event_signal.clone()) {
            Ok(bridge) => bridge,
            Err(e) => return Err(self.fail_connect(&op, provider, e)),
        };

        let accounts = match adapter.request_accounts().await {
            Ok(accounts) => accounts,
            Err(e) => return Err(self.fail_connect(&op, provider, e)),
        };
        let Some(account) = accounts.into_iter().next() else {
            return Err(self.fail_connect(&op, provider, Error::Provider("wallet returned no accounts".to_string())));
        };

        let linked = ConnectionState::connected(provider, account.clone());
        self.install(&op, ActiveSession { adapter: adapter.clone(), bridge }, linked)
            .await?;
        info!(%provider, %account, "wallet connected");

        let outcome = self.reconcile(&op, adapter.as_ref()).await;
        self.apply_pending_events(&op).await;
        outcome.map(|_| self.state())
    }

    /// Re-link `provider` if it already exposes an account, without prompting.
    ///
    /// Returns `None` and leaves the state untouched when the wallet is not
    /// installed or has not authorized this application yet. The network is
    /// only checked, never switched.
    pub async fn resume(&self, provider: ProviderId) -> Result<Option<ConnectionState>> {
        let op = self.begin()?;
        if self.slot().active.is_some() {
            return Ok(Some(self.state()));
        }

        let adapter = self.factory.create_adapter(provider);
        if !adapter.is_available() {
            return Ok(None);
        }
        let Some(account) = adapter.get_accounts().await?.into_iter().next() else {
            debug!(%provider, "wallet has no authorized accounts");
            return Ok(None);
        };

        let bridge = EventBridge::attach(adapter.clone(), self.event_signal.clone())?;
        let linked = ConnectionState::connected(provider, account.clone());
        if self
            .install(&op, ActiveSession { adapter: adapter.clone(), bridge }, linked)
            .await
            .is_err()
        {
            return Ok(None);
        }
        info!(%provider, %account, "wallet session resumed");

        let outcome = self.check_chain(&op, adapter.as_ref()).await;
        self.apply_pending_events(&op).await;
        outcome.map(|_| Some(self.state()))
    }

    /// Compare the wallet's chain with the required one without prompting the user
    pub async fn check_network(&self) -> Result<ConnectionStatus> {
        let op = self.begin()?;
        let adapter = self.linked_adapter()?;
        let outcome = self.check_chain(&op, adapter.as_ref()).await;
        self.apply_pending_events(&op).await;
        outcome
    }

    /// Check the network and, on mismatch, ask the wallet to switch (adding the network if needed)
    pub async fn ensure_network(&self) -> Result<ConnectionStatus> {
        let op = self.begin()?;
        let adapter = self.linked_adapter()?;
        let outcome = self.reconcile(&op, adapter.as_ref()).await;
        self.apply_pending_events(&op).await;
        outcome
    }

    /// Drop the active adapter and reset to `Disconnected`.
    ///
    /// Takes effect immediately, even while a wallet prompt is open; the
    /// outstanding request finishes against the released adapter without
    /// touching the state. Calling it while disconnected is a no-op.
    pub async fn disconnect(&self) {
        if let Some(previous) = self.reset() {
            info!(provider = %previous.adapter.provider_id(), "disconnecting wallet");
            self.release(previous).await;
        }
    }

    /// Apply queued provider events and return how many were applied.
    ///
    /// While a request is outstanding only a revocation is applied; other
    /// events wait for that request to end.
    pub async fn process_events(&self) -> usize {
        match self.begin() {
            Ok(op) => self.apply_pending_events(&op).await,
            Err(_) => {
                let revoked = {
                    let mut slot = self.slot();
                    slot.active.as_mut().map_or(false, |active| active.bridge.has_revocation())
                };
                if revoked {
                    info!("wallet revoked account access during a pending request");
                    self.revoke().await;
                    1
                } else {
                    debug!("operation in flight, deferring provider events");
                    0
                }
            }
        }
    }

    /// Ask the wallet to send `amount` (smallest unit) from the linked account to `to`
    pub async fn send_value_transfer(&self, to: &str, amount: U256) -> Result<String> {
        let op = self.begin()?;
        let (adapter, account) = self.ready_session()?;

        let result = adapter.send_value_transfer(&account, to, amount).await;
        match &result {
            Ok(hash) => {
                info!(%hash, to, %amount, "transfer submitted");
                self.write(&op, |state| state.error = None);
            }
            Err(e) => {
                warn!(error = %e, to, %amount, "transfer failed");
                self.record_error(&op, e);
            }
        }

        // The chain may have moved while the prompt was open
        if let Err(e) = self.check_chain(&op, adapter.as_ref()).await {
            debug!(error = %e, "chain re-check after transfer failed");
        }
        self.apply_pending_events(&op).await;
        result
    }

    /// Read the linked account's native balance on the required network
    pub async fn fetch_balance(&self) -> Result<BalanceReading> {
        let op = self.begin()?;
        let (adapter, account) = self.ready_session()?;

        let result = adapter.get_balance(&account).await;
        if let Err(e) = &result {
            warn!(error = %e, %account, "balance request failed");
            self.record_error(&op, e);
        }
        // A switch while the request was outstanding leaves the reading's chain unknown
        let status = self.check_chain(&op, adapter.as_ref()).await;
        self.apply_pending_events(&op).await;

        let amount = result?;
        if status? != ConnectionStatus::Ready {
            return Err(Error::NotReady(format!(
                "wallet left {} during the balance request",
                self.network.display_name()
            )));
        }
        Ok(BalanceReading {
            account,
            chain_id: Some(self.network.chain_id()),
            amount,
        })
    }

    fn begin(&self) -> Result<Operation<'_>> {
        let gate = self.gate.try_lock().map_err(|_| {
            if self.state.borrow().status == ConnectionStatus::Connecting {
                Error::AlreadyConnecting
            } else {
                Error::OperationInProgress
            }
        })?;
        let generation = self.slot().generation;
        Ok(Operation {
            controller: self,
            gate: Some(gate),
            generation,
        })
    }

    fn slot(&self) -> StdMutexGuard<'_, SessionSlot> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, op: &Operation<'_>) -> bool {
        self.slot().generation == op.generation
    }

    fn ensure_current(&self, op: &Operation<'_>) -> Result<()> {
        if self.is_current(op) {
            Ok(())
        } else {
            Err(superseded())
        }
    }

    /// Take the active session out, superseding outstanding requests
    fn detach(&self) -> (Option<ActiveSession>, u64) {
        let mut slot = self.slot();
        slot.generation += 1;
        (slot.active.take(), slot.generation)
    }

    /// Detach and publish `Disconnected` in one step
    fn reset(&self) -> Option<ActiveSession> {
        let mut slot = self.slot();
        slot.generation += 1;
        let previous = slot.active.take();
        self.publish(ConnectionState::default());
        previous
    }

    /// Make `session` active unless a disconnect superseded `op`, in which case it is released
    async fn install(&self, op: &Operation<'_>, session: ActiveSession, state: ConnectionState) -> Result<()> {
        let rejected = {
            let mut slot = self.slot();
            if slot.generation == op.generation {
                slot.active = Some(session);
                self.publish(state);
                None
            } else {
                Some(session)
            }
        };
        match rejected {
            None => Ok(()),
            Some(session) => {
                info!(provider = %session.adapter.provider_id(), "wallet disconnected before linking completed");
                self.release(session).await;
                Err(superseded())
            }
        }
    }

    fn has_queued_events(&self) -> bool {
        let mut slot = self.slot();
        slot.active.as_mut().map_or(false, |active| active.bridge.has_pending())
    }

    fn current_adapter(&self, op: &Operation<'_>) -> Option<Arc<dyn ProviderAdapter>> {
        let slot = self.slot();
        if slot.generation != op.generation {
            return None;
        }
        slot.active.as_ref().map(|active| active.adapter.clone())
    }

    fn linked_adapter(&self) -> Result<Arc<dyn ProviderAdapter>> {
        let slot = self.slot();
        match &slot.active {
            Some(active) if self.state.borrow().status.has_account() => Ok(active.adapter.clone()),
            _ => Err(Error::NotReady("no wallet connected".to_string())),
        }
    }

    fn ready_session(&self) -> Result<(Arc<dyn ProviderAdapter>, String)> {
        let slot = self.slot();
        let state = self.state();
        match (&slot.active, state.account) {
            (Some(active), Some(account)) if state.status == ConnectionStatus::Ready => {
                Ok((active.adapter.clone(), account))
            }
            _ => Err(Error::NotReady(format!(
                "connect a wallet on {} first (status {:?})",
                self.network.display_name(),
                state.status
            ))),
        }
    }

    /// Read the wallet's chain and classify it against the required network
    async fn check_chain(&self, op: &Operation<'_>, adapter: &dyn ProviderAdapter) -> Result<ConnectionStatus> {
        match adapter.get_chain_id().await {
            Ok(chain_id) => self.apply_chain(op, chain_id).ok_or_else(superseded),
            Err(e) => {
                warn!(error = %e, "failed to read wallet chain");
                self.record_error(op, &e);
                Err(e)
            }
        }
    }

    async fn reconcile(&self, op: &Operation<'_>, adapter: &dyn ProviderAdapter) -> Result<ConnectionStatus> {
        if self.check_chain(op, adapter).await? == ConnectionStatus::Ready {
            return Ok(ConnectionStatus::Ready);
        }

        let network = self.network.as_ref();
        info!(required = %network.chain_id(), "requesting network switch");
        let switched = adapter.switch_chain(network).await;
        self.ensure_current(op)?;
        match switched {
            Ok(()) => {}
            Err(Error::ChainNotRegistered(_)) => {
                info!(network = network.display_name(), "network unknown to wallet, adding it");
                let added = adapter.add_chain(network).await;
                self.ensure_current(op)?;
                if let Err(e) = added {
                    return Err(self.network_setup_failed(
                        op,
                        format!("could not add {}: {}", network.display_name(), e),
                    ));
                }
                let retried = adapter.switch_chain(network).await;
                self.ensure_current(op)?;
                if let Err(e) = retried {
                    return Err(self.network_setup_failed(
                        op,
                        format!("could not switch to {} after adding it: {}", network.display_name(), e),
                    ));
                }
            }
            Err(e @ (Error::UserRejected | Error::OperationInProgress)) => {
                info!(error = %e, "network switch not completed");
                self.record_error(op, &e);
                return Err(e);
            }
            Err(e) => {
                return Err(self.network_setup_failed(
                    op,
                    format!("could not switch to {}: {}", network.display_name(), e),
                ));
            }
        }

        match self.check_chain(op, adapter).await? {
            ConnectionStatus::Ready => Ok(ConnectionStatus::Ready),
            _ => Err(self.network_setup_failed(op, format!("wallet is still not on {}", network.display_name()))),
        }
    }

    async fn apply_pending_events(&self, op: &Operation<'_>) -> usize {
        let mut applied = 0;
        loop {
            let events = {
                let mut slot = self.slot();
                if slot.generation != op.generation {
                    break;
                }
                match slot.active.as_mut() {
                    Some(active) => active.bridge.drain(),
                    None => break,
                }
            };
            if events.is_empty() {
                break;
            }
            for event in events {
                // Events queued behind a revocation belong to the released adapter
                if !self.is_current(op) {
                    return applied;
                }
                self.apply_event(op, event).await;
                applied += 1;
            }
        }
        applied
    }

    async fn apply_event(&self, op: &Operation<'_>, event: ProviderEvent) {
        debug!(?event, "applying provider event");
        match event {
            ProviderEvent::AccountsChanged(accounts) => match accounts.into_iter().next() {
                None => {
                    info!("wallet revoked account access");
                    self.revoke().await;
                }
                Some(account) => {
                    let Some(adapter) = self.current_adapter(op) else {
                        return;
                    };
                    let provider = adapter.provider_id();
                    info!(%provider, %account, "wallet account changed");
                    self.write(op, |state| *state = ConnectionState::connected(provider, account));
                    if let Err(e) = self.check_chain(op, adapter.as_ref()).await {
                        debug!(error = %e, "chain check after account change failed");
                    }
                }
            },
            ProviderEvent::ChainChanged(chain_id) => {
                if !self.state.borrow().status.has_account() {
                    debug!(%chain_id, "chain changed while not connected");
                    return;
                }
                info!(%chain_id, "wallet chain changed");
                self.apply_chain(op, chain_id);
            }
        }
    }

    /// Record the wallet's chain; `None` when `op` was superseded
    fn apply_chain(&self, op: &Operation<'_>, chain_id: ChainId) -> Option<ConnectionStatus> {
        let ready = chain_id == self.network.chain_id();
        let mut status = None;
        self.write(op, |state| {
            if state.status.has_account() {
                state.chain_id = Some(chain_id);
                if ready {
                    // Reaching the required network resolves earlier network errors
                    if state.status != ConnectionStatus::Ready {
                        state.error = None;
                    }
                    state.status = ConnectionStatus::Ready;
                } else {
                    state.status = ConnectionStatus::NetworkMismatch;
                }
            }
            status = Some(state.status);
        });
        status
    }

    /// Connected with the account kept, error recorded
    fn network_setup_failed(&self, op: &Operation<'_>, message: String) -> Error {
        warn!(%message, "network setup failed");
        let error = Error::NetworkSetupFailed(message);
        let recorded = StateError::from(&error);
        self.write(op, |state| {
            if state.status.has_account() {
                state.status = ConnectionStatus::Connected;
            }
            state.error = Some(recorded);
        });
        error
    }

    /// Publish `Error`, then settle on `Disconnected` with the error kept
    fn fail_connect(&self, op: &Operation<'_>, provider: ProviderId, error: Error) -> Error {
        warn!(%provider, error = %error, "wallet connection failed");
        let recorded = StateError::from(&error);
        self.write(op, |state| {
            *state = ConnectionState {
                status: ConnectionStatus::Error,
                provider: Some(provider),
                error: Some(recorded.clone()),
                ..ConnectionState::default()
            }
        });
        self.write(op, |state| {
            *state = ConnectionState {
                error: Some(recorded),
                ..ConnectionState::default()
            }
        });
        error
    }

    fn record_error(&self, op: &Operation<'_>, error: &Error) {
        let recorded = StateError::from(error);
        self.write(op, |state| state.error = Some(recorded));
    }

    async fn revoke(&self) {
        if let Some(previous) = self.reset() {
            self.release(previous).await;
        }
    }

    async fn release(&self, previous: ActiveSession) {
        let ActiveSession { adapter, bridge } = previous;
        drop(bridge);
        if let Err(e) = adapter.release().await {
            debug!(provider = %adapter.provider_id(), error = %e, "adapter release failed");
        }
    }

    /// Apply `change` unless a disconnect or revocation superseded `op`
    fn write(&self, op: &Operation<'_>, change: impl FnOnce(&mut ConnectionState)) -> bool {
        let slot = self.slot();
        if slot.generation != op.generation {
            debug!("dropping state update from a superseded request");
            return false;
        }
        self.update(change);
        true
    }

    fn publish(&self, next: ConnectionState) {
        self.update(|state| *state = next);
    }

    fn update(&self, change: impl FnOnce(&mut ConnectionState)) {
        self.state.send_modify(|state| {
            let previous = state.status;
            change(state);
            debug_assert!(state.is_consistent(), "account presence must follow status: {:?}", state);
            if previous != state.status {
                info!(from = ?previous, to = ?state.status, "connection status changed");
            }
        });
    }
}

fn superseded() -> Error {
    Error::NotReady("wallet was disconnected during the request".to_string())
}

impl std::fmt::Debug for ConnectionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionController")
            .field("network", &self.network.display_name())
            .field("state", &*self.state.borrow())
            .finish()
    }
}
