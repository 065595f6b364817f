#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use alloy::json_abi::JsonAbi;
use alloy::primitives::{Address, ChainId};
use tokio::sync::Notify;

use wallet_session_core::{
    parse_chain_id, ChainDescriptor, ChainRegistry, PortError, ProviderEvent, ProviderEventKind,
    SessionConfig, SessionNegotiator, WalletProvider,
};

pub const ETH_CHAIN_ID: &str = "eth_chainId";
pub const ETH_ACCOUNTS: &str = "eth_accounts";
pub const ETH_REQUEST_ACCOUNTS: &str = "eth_requestAccounts";
pub const WALLET_SWITCH: &str = "wallet_switchEthereumChain";
pub const WALLET_ADD: &str = "wallet_addEthereumChain";
pub const WALLET_PERMISSIONS: &str = "wallet_getPermissions";

#[derive(Debug, Default)]
struct Script {
    chain_id: ChainId,
    chain_answers: VecDeque<ChainId>,
    known_chains: Vec<ChainId>,
    authorized: Vec<Address>,
    grant_on_request: Vec<Address>,
    failures: HashMap<&'static str, VecDeque<PortError>>,
    calls: Vec<&'static str>,
    events: Vec<ProviderEvent>,
    event_seq: u64,
    subscriptions: u32,
    account_prompts: u32,
}

/// Wallet double with scripted answers and a log of every wire method called.
#[derive(Debug, Clone)]
pub struct ScriptedWallet {
    script: Arc<Mutex<Script>>,
    connected: bool,
    accounts_gate: Option<Arc<Notify>>,
}

impl ScriptedWallet {
    pub fn on_chain(chain_id: ChainId) -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                chain_id,
                known_chains: vec![1, chain_id],
                ..Script::default()
            })),
            connected: true,
            accounts_gate: None,
        }
    }

    pub fn disconnected(mut self) -> Self {
        self.connected = false;
        self
    }

    /// `eth_requestAccounts` waits on `gate` before answering.
    pub fn gate_account_requests(mut self, gate: Arc<Notify>) -> Self {
        self.accounts_gate = Some(gate);
        self
    }

    pub fn authorized(self, accounts: Vec<Address>) -> Self {
        self.script().authorized = accounts;
        self
    }

    pub fn grants(self, accounts: Vec<Address>) -> Self {
        self.script().grant_on_request = accounts;
        self
    }

    pub fn knows_chain(self, chain_id: ChainId) -> Self {
        self.script().known_chains.push(chain_id);
        self
    }

    /// Answers for the next `eth_chainId` calls, before falling back to the
    /// wallet's actual chain.
    pub fn answer_chain_ids(self, answers: &[ChainId]) -> Self {
        self.script().chain_answers.extend(answers.iter().copied());
        self
    }

    pub fn fail_next(self, method: &'static str, err: PortError) -> Self {
        self.script()
            .failures
            .entry(method)
            .or_default()
            .push_back(err);
        self
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.script().calls.clone()
    }

    pub fn count(&self, method: &str) -> usize {
        self.script().calls.iter().filter(|m| **m == method).count()
    }

    pub fn subscriptions(&self) -> u32 {
        self.script().subscriptions
    }

    /// `eth_requestAccounts` calls that reached the wallet, answered or not.
    pub fn account_prompts(&self) -> u32 {
        self.script().account_prompts
    }

    pub fn push_accounts(&self, accounts: Vec<Address>) {
        self.push(ProviderEventKind::AccountsChanged(accounts));
    }

    pub fn push_chain(&self, chain_id: ChainId) {
        self.push(ProviderEventKind::ChainChanged(chain_id));
    }

    fn push(&self, kind: ProviderEventKind) {
        let mut g = self.script();
        g.event_seq += 1;
        let sequence = g.event_seq;
        g.events.push(ProviderEvent { sequence, kind });
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().expect("script lock")
    }

    fn record(&self, method: &'static str) -> Result<(), PortError> {
        let mut g = self.script();
        g.calls.push(method);
        match g.failures.get_mut(method).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl WalletProvider for ScriptedWallet {
    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn chain_id(&self) -> Result<ChainId, PortError> {
        self.record(ETH_CHAIN_ID)?;
        let mut g = self.script();
        let current = g.chain_id;
        Ok(g.chain_answers.pop_front().unwrap_or(current))
    }

    async fn permissions(&self) -> Result<Vec<String>, PortError> {
        self.record(WALLET_PERMISSIONS)?;
        if self.script().authorized.is_empty() {
            Ok(Vec::new())
        } else {
            Ok(vec!["eth_accounts".to_owned()])
        }
    }

    async fn accounts(&self) -> Result<Vec<Address>, PortError> {
        self.record(ETH_ACCOUNTS)?;
        Ok(self.script().authorized.clone())
    }

    async fn request_accounts(&self) -> Result<Vec<Address>, PortError> {
        self.script().account_prompts += 1;
        if let Some(gate) = &self.accounts_gate {
            gate.notified().await;
        }
        self.record(ETH_REQUEST_ACCOUNTS)?;
        let mut g = self.script();
        g.authorized = g.grant_on_request.clone();
        Ok(g.authorized.clone())
    }

    async fn switch_chain(&self, hex_chain_id: &str) -> Result<(), PortError> {
        self.record(WALLET_SWITCH)?;
        let chain_id = parse_chain_id(hex_chain_id)
            .ok_or_else(|| PortError::Validation(format!("bad chain id {hex_chain_id}")))?;
        let mut g = self.script();
        if !g.known_chains.contains(&chain_id) {
            return Err(PortError::UnrecognizedChain);
        }
        g.chain_id = chain_id;
        Ok(())
    }

    async fn add_chain(&self, chain: &ChainDescriptor) -> Result<(), PortError> {
        self.record(WALLET_ADD)?;
        self.script().known_chains.push(chain.decimal_id());
        Ok(())
    }

    fn subscribe(&self) -> Result<(), PortError> {
        self.script().subscriptions += 1;
        Ok(())
    }

    fn drain_events(&self) -> Result<Vec<ProviderEvent>, PortError> {
        Ok(std::mem::take(&mut self.script().events))
    }
}

pub fn rinkeby() -> ChainDescriptor {
    ChainRegistry::builtin()
        .lookup(4u64)
        .cloned()
        .expect("rinkeby registered")
}

pub fn contract_address() -> Address {
    "0x000000000000000000000000000000000000BEEF"
        .parse()
        .expect("valid contract address")
}

pub fn account(n: u8) -> Address {
    Address::repeat_byte(n)
}

pub fn mint_abi() -> JsonAbi {
    serde_json::from_str(
        r#"[
            {"type":"function","name":"mint","stateMutability":"payable",
             "inputs":[{"name":"count","type":"uint256"}],"outputs":[]},
            {"type":"function","name":"price","stateMutability":"view",
             "inputs":[],"outputs":[{"name":"","type":"uint256"}]}
        ]"#,
    )
    .expect("valid abi")
}

pub fn config() -> SessionConfig<ScriptedWallet> {
    SessionConfig::new(rinkeby(), contract_address(), mint_abi())
}

/// Negotiator with `wallet` injected. The returned wallet shares its script.
pub fn injected(wallet: ScriptedWallet) -> (SessionNegotiator<ScriptedWallet>, ScriptedWallet) {
    let handle = wallet.clone();
    (SessionNegotiator::new(config(), Some(wallet)), handle)
}
