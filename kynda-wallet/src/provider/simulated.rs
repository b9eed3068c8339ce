//! In-memory wallets
//!
//! Deterministic stand-ins for the injected provider objects, used by the
//! test suite and the demo binary. They keep enough state to behave like the
//! real wallets: authorization, current chain, registered chains, balances,
//! and event emission.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use ethers_core::types::U256;
use serde_json::{json, Value};
use tokio::sync::Notify;

use crate::network::ChainId;

use super::{
    Eip1193Provider, EventListener, InstallPageLauncher, ListenerId, ProviderId, RpcError,
    SolanaInjectedProvider, SERVER_ERROR,
};

/// Default account exposed by [`SimulatedEvmWallet`]
pub const DEFAULT_EVM_ACCOUNT: &str = "0x742d35Cc6634C0532925a3b844Bc454e4438f44e";

/// Default public key exposed by [`SimulatedPhantom`]
pub const DEFAULT_SOLANA_ACCOUNT: &str = "vines1vzrYbzLMRdu58ou5XTby4qAqVRLmqo36NKPTg";

const INVALID_PARAMS: i64 = -32602;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Listener bookkeeping shared by the simulated wallets
#[derive(Default)]
struct ListenerRegistry {
    next_id: u64,
    listeners: HashMap<String, Vec<(ListenerId, EventListener)>>,
}

impl ListenerRegistry {
    fn add(&mut self, event: &str, listener: EventListener) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.listeners.entry(event.to_string()).or_default().push((id, listener));
        id
    }

    fn remove(&mut self, event: &str, id: ListenerId) {
        if let Some(entries) = self.listeners.get_mut(event) {
            entries.retain(|(existing, _)| *existing != id);
        }
    }

    fn count(&self, event: &str) -> usize {
        self.listeners.get(event).map(Vec::len).unwrap_or(0)
    }

    fn snapshot(&self, event: &str) -> Vec<EventListener> {
        self.listeners
            .get(event)
            .map(|entries| entries.iter().map(|(_, listener)| listener.clone()).collect())
            .unwrap_or_default()
    }
}

/// Request failures and pauses queued by a test
#[derive(Default)]
struct Script {
    failures: HashMap<String, VecDeque<RpcError>>,
    pauses: HashMap<String, Arc<Notify>>,
}

impl Script {
    fn take_failure(&mut self, method: &str) -> Option<RpcError> {
        self.failures.get_mut(method).and_then(VecDeque::pop_front)
    }
}

/// A value transfer accepted by a simulated wallet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentTransfer {
    pub hash: String,
    pub from: String,
    pub to: String,
    pub value: U256,
}

struct EvmWalletState {
    accounts: Vec<String>,
    authorized: bool,
    chain_id: u64,
    known_chains: HashSet<u64>,
    balances: HashMap<String, U256>,
    added_chains: Vec<Value>,
    sent: Vec<SentTransfer>,
    calls: Vec<String>,
}

/// Simulated EIP-1193 wallet
pub struct SimulatedEvmWallet {
    state: Mutex<EvmWalletState>,
    script: Mutex<Script>,
    listeners: Mutex<ListenerRegistry>,
}

impl Default for SimulatedEvmWallet {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedEvmWallet {
    /// A wallet holding [`DEFAULT_EVM_ACCOUNT`] on Ethereum mainnet
    pub fn new() -> Self {
        Self {
            state: Mutex::new(EvmWalletState {
                accounts: vec![DEFAULT_EVM_ACCOUNT.to_string()],
                authorized: false,
                chain_id: 1,
                known_chains: HashSet::from([1]),
                balances: HashMap::new(),
                added_chains: Vec::new(),
                sent: Vec::new(),
                calls: Vec::new(),
            }),
            script: Mutex::new(Script::default()),
            listeners: Mutex::new(ListenerRegistry::default()),
        }
    }

    pub fn with_accounts(self, accounts: &[&str]) -> Self {
        lock(&self.state).accounts = accounts.iter().map(|a| a.to_string()).collect();
        self
    }

    /// Start on `chain_id`, which is then known to the wallet
    pub fn on_chain(self, chain_id: u64) -> Self {
        {
            let mut state = lock(&self.state);
            state.chain_id = chain_id;
            state.known_chains.insert(chain_id);
        }
        self
    }

    pub fn with_known_chain(self, chain_id: u64) -> Self {
        lock(&self.state).known_chains.insert(chain_id);
        self
    }

    pub fn with_balance(self, account: &str, wei: U256) -> Self {
        lock(&self.state).balances.insert(account.to_lowercase(), wei);
        self
    }

    /// Fail the next `method` request with `error`
    pub fn fail_next(&self, method: &str, error: RpcError) {
        lock(&self.script)
            .failures
            .entry(method.to_string())
            .or_default()
            .push_back(error);
    }

    /// Hold the next `method` request until the returned handle is notified
    pub fn pause_next(&self, method: &str) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        lock(&self.script).pauses.insert(method.to_string(), notify.clone());
        notify
    }

    /// The user picked other accounts (or revoked access with an empty list)
    pub fn emit_accounts_changed(&self, accounts: &[&str]) {
        let accounts: Vec<String> = accounts.iter().map(|a| a.to_string()).collect();
        {
            let mut state = lock(&self.state);
            state.authorized = !accounts.is_empty();
            state.accounts = accounts.clone();
        }
        self.emit("accountsChanged", json!(accounts));
    }

    /// The user switched chains from the wallet UI
    pub fn emit_chain_changed(&self, chain_id: u64) {
        {
            let mut state = lock(&self.state);
            state.chain_id = chain_id;
            state.known_chains.insert(chain_id);
        }
        self.emit("chainChanged", json!(format!("0x{:x}", chain_id)));
    }

    pub fn chain_id(&self) -> u64 {
        lock(&self.state).chain_id
    }

    pub fn knows_chain(&self, chain_id: u64) -> bool {
        lock(&self.state).known_chains.contains(&chain_id)
    }

    pub fn balance_of(&self, account: &str) -> U256 {
        lock(&self.state)
            .balances
            .get(&account.to_lowercase())
            .copied()
            .unwrap_or_default()
    }

    /// Parameters of every accepted `wallet_addEthereumChain` request
    pub fn added_chains(&self) -> Vec<Value> {
        lock(&self.state).added_chains.clone()
    }

    pub fn sent_transfers(&self) -> Vec<SentTransfer> {
        lock(&self.state).sent.clone()
    }

    /// Methods requested so far, in order
    pub fn calls(&self) -> Vec<String> {
        lock(&self.state).calls.clone()
    }

    pub fn call_count(&self, method: &str) -> usize {
        lock(&self.state).calls.iter().filter(|m| *m == method).count()
    }

    pub fn listener_count(&self, event: &str) -> usize {
        lock(&self.listeners).count(event)
    }

    fn emit(&self, event: &str, payload: Value) {
        // Listeners run without any wallet lock held
        let listeners = lock(&self.listeners).snapshot(event);
        for listener in listeners {
            listener(payload.clone());
        }
    }

    fn handle(&self, method: &str, params: &Value) -> Result<Value, RpcError> {
        match method {
            "eth_requestAccounts" => {
                let mut state = lock(&self.state);
                state.authorized = true;
                Ok(json!(state.accounts))
            }
            "eth_accounts" => {
                let state = lock(&self.state);
                if state.authorized {
                    Ok(json!(state.accounts))
                } else {
                    Ok(json!([]))
                }
            }
            "eth_chainId" => Ok(json!(format!("0x{:x}", self.chain_id()))),
            "wallet_switchEthereumChain" => {
                let requested = params[0]["chainId"].as_str().unwrap_or_default().to_string();
                let chain_id = match ChainId::from_hex(&requested) {
                    Ok(ChainId::Evm(id)) => id,
                    _ => return Err(RpcError::new(INVALID_PARAMS, format!("invalid chainId {:?}", requested))),
                };
                {
                    let mut state = lock(&self.state);
                    if !state.known_chains.contains(&chain_id) {
                        return Err(RpcError::unrecognized_chain(&requested));
                    }
                    if state.chain_id == chain_id {
                        return Ok(Value::Null);
                    }
                    state.chain_id = chain_id;
                }
                self.emit("chainChanged", json!(requested));
                Ok(Value::Null)
            }
            "wallet_addEthereumChain" => {
                let entry = &params[0];
                let chain_id = entry["chainId"].as_str().map(ChainId::from_hex);
                let well_formed = entry["chainName"].as_str().is_some()
                    && entry["nativeCurrency"]["symbol"].as_str().is_some()
                    && entry["nativeCurrency"]["decimals"].as_u64().is_some()
                    && entry["rpcUrls"].as_array().map_or(false, |urls| !urls.is_empty());
                match chain_id {
                    Some(Ok(ChainId::Evm(id))) if well_formed => {
                        let mut state = lock(&self.state);
                        state.known_chains.insert(id);
                        state.added_chains.push(entry.clone());
                        Ok(Value::Null)
                    }
                    _ => Err(RpcError::new(INVALID_PARAMS, "invalid wallet_addEthereumChain parameters")),
                }
            }
            "eth_getBalance" => {
                let account = params[0].as_str().unwrap_or_default();
                Ok(json!(format!("0x{:x}", self.balance_of(account))))
            }
            "eth_sendTransaction" => {
                let tx = &params[0];
                let from = tx["from"].as_str().unwrap_or_default().to_string();
                let to = tx["to"].as_str().unwrap_or_default().to_string();
                let value = tx["value"]
                    .as_str()
                    .and_then(|v| v.strip_prefix("0x"))
                    .and_then(|v| U256::from_str_radix(v, 16).ok())
                    .ok_or_else(|| RpcError::new(INVALID_PARAMS, "invalid value"))?;

                let mut state = lock(&self.state);
                if !state.authorized || !state.accounts.iter().any(|a| a.eq_ignore_ascii_case(&from)) {
                    return Err(RpcError::new(4100, "The requested account has not been authorized"));
                }
                let key = from.to_lowercase();
                let balance = state.balances.get(&key).copied().unwrap_or_default();
                if balance < value {
                    return Err(RpcError::new(SERVER_ERROR, "insufficient funds for gas * price + value"));
                }
                state.balances.insert(key, balance - value);

                let hash = format!("0x{:064x}", state.sent.len() + 1);
                state.sent.push(SentTransfer {
                    hash: hash.clone(),
                    from,
                    to,
                    value,
                });
                Ok(json!(hash))
            }
            other => Err(RpcError::new(
                super::UNSUPPORTED_METHOD,
                format!("The method \"{}\" does not exist / is not available.", other),
            )),
        }
    }
}

#[async_trait]
impl Eip1193Provider for SimulatedEvmWallet {
    async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        lock(&self.state).calls.push(method.to_string());

        let pause = lock(&self.script).pauses.remove(method);
        if let Some(pause) = pause {
            pause.notified().await;
        }

        let failure = lock(&self.script).take_failure(method);
        if let Some(error) = failure {
            return Err(error);
        }
        self.handle(method, &params)
    }

    fn on(&self, event: &str, listener: EventListener) -> ListenerId {
        lock(&self.listeners).add(event, listener)
    }

    fn remove_listener(&self, event: &str, id: ListenerId) {
        lock(&self.listeners).remove(event, id)
    }
}

struct PhantomState {
    is_phantom: bool,
    public_key: String,
    connected: bool,
    lamports: HashMap<String, u64>,
    sent: Vec<SentTransfer>,
}

/// Simulated Phantom-like Solana wallet
pub struct SimulatedPhantom {
    state: Mutex<PhantomState>,
    script: Mutex<Script>,
    listeners: Mutex<ListenerRegistry>,
}

impl Default for SimulatedPhantom {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedPhantom {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PhantomState {
                is_phantom: true,
                public_key: DEFAULT_SOLANA_ACCOUNT.to_string(),
                connected: false,
                lamports: HashMap::new(),
                sent: Vec::new(),
            }),
            script: Mutex::new(Script::default()),
            listeners: Mutex::new(ListenerRegistry::default()),
        }
    }

    /// Another wallet occupying `window.solana`
    pub fn impostor() -> Self {
        let wallet = Self::new();
        lock(&wallet.state).is_phantom = false;
        wallet
    }

    pub fn with_balance(self, public_key: &str, lamports: u64) -> Self {
        lock(&self.state).lamports.insert(public_key.to_string(), lamports);
        self
    }

    /// Fail the next call of `operation` (`connect`, `transfer`, ...)
    pub fn fail_next(&self, operation: &str, error: RpcError) {
        lock(&self.script)
            .failures
            .entry(operation.to_string())
            .or_default()
            .push_back(error);
    }

    pub fn emit_account_changed(&self, public_key: Option<&str>) {
        {
            let mut state = lock(&self.state);
            match public_key {
                Some(key) => state.public_key = key.to_string(),
                None => state.connected = false,
            }
        }
        let payload = public_key.map(|key| json!(key)).unwrap_or(Value::Null);
        self.emit("accountChanged", payload);
    }

    pub fn emit_disconnect(&self) {
        lock(&self.state).connected = false;
        self.emit("disconnect", Value::Null);
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }

    pub fn sent_transfers(&self) -> Vec<SentTransfer> {
        lock(&self.state).sent.clone()
    }

    pub fn listener_count(&self, event: &str) -> usize {
        lock(&self.listeners).count(event)
    }

    fn emit(&self, event: &str, payload: Value) {
        let listeners = lock(&self.listeners).snapshot(event);
        for listener in listeners {
            listener(payload.clone());
        }
    }

    fn scripted_failure(&self, operation: &str) -> Result<(), RpcError> {
        match lock(&self.script).take_failure(operation) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SolanaInjectedProvider for SimulatedPhantom {
    fn is_phantom(&self) -> bool {
        lock(&self.state).is_phantom
    }

    fn public_key(&self) -> Option<String> {
        let state = lock(&self.state);
        state.connected.then(|| state.public_key.clone())
    }

    async fn connect(&self) -> Result<String, RpcError> {
        self.scripted_failure("connect")?;
        let mut state = lock(&self.state);
        state.connected = true;
        Ok(state.public_key.clone())
    }

    async fn disconnect(&self) -> Result<(), RpcError> {
        self.scripted_failure("disconnect")?;
        lock(&self.state).connected = false;
        Ok(())
    }

    async fn get_balance(&self, public_key: &str) -> Result<u64, RpcError> {
        self.scripted_failure("get_balance")?;
        Ok(lock(&self.state).lamports.get(public_key).copied().unwrap_or(0))
    }

    async fn transfer(&self, from: &str, to: &str, lamports: u64) -> Result<String, RpcError> {
        self.scripted_failure("transfer")?;
        let mut state = lock(&self.state);
        if !state.connected || state.public_key != from {
            return Err(RpcError::new(4100, "The requested account has not been authorized"));
        }
        let balance = state.lamports.get(from).copied().unwrap_or(0);
        if balance < lamports {
            return Err(RpcError::new(SERVER_ERROR, "insufficient funds for transfer"));
        }
        state.lamports.insert(from.to_string(), balance - lamports);

        let mut signature_bytes = [0u8; 64];
        signature_bytes[..8].copy_from_slice(&((state.sent.len() + 1) as u64).to_be_bytes());
        let signature = bs58::encode(signature_bytes).into_string();
        state.sent.push(SentTransfer {
            hash: signature.clone(),
            from: from.to_string(),
            to: to.to_string(),
            value: U256::from(lamports),
        });
        Ok(signature)
    }

    fn on(&self, event: &str, listener: EventListener) -> ListenerId {
        lock(&self.listeners).add(event, listener)
    }

    fn remove_listener(&self, event: &str, id: ListenerId) {
        lock(&self.listeners).remove(event, id)
    }
}

/// Launcher remembering which install pages were requested
#[derive(Default)]
pub struct RecordingLauncher {
    opened: Mutex<Vec<(ProviderId, String)>>,
}

impl RecordingLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn opened(&self) -> Vec<(ProviderId, String)> {
        lock(&self.opened).clone()
    }
}

impl InstallPageLauncher for RecordingLauncher {
    fn open(&self, provider: ProviderId, url: &str) -> Result<(), String> {
        lock(&self.opened).push((provider, url.to_string()));
        Ok(())
    }
}
