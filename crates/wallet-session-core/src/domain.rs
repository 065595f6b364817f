use alloy::json_abi::JsonAbi;
use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

use crate::chains::ChainDescriptor;
use crate::error::SessionError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletState {
    pub accounts: Vec<Address>,
    pub chain: Option<ChainDescriptor>,
}

impl WalletState {
    pub fn has_accounts(&self) -> bool {
        !self.accounts.is_empty()
    }

    pub fn is_on(&self, target: &ChainDescriptor) -> bool {
        self.chain
            .as_ref()
            .is_some_and(|chain| chain.decimal_id() == target.decimal_id())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderSource {
    Injected,
    NetworkOverride,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallSurface {
    #[default]
    Contract,
    RawRpc,
}

#[derive(Debug, Clone)]
pub struct SessionConfig<P> {
    pub target_chain: ChainDescriptor,
    pub contract_address: Address,
    pub contract_abi: JsonAbi,
    pub override_provider: Option<P>,
    pub surface: CallSurface,
}

impl<P> SessionConfig<P> {
    pub fn new(
        target_chain: ChainDescriptor,
        contract_address: Address,
        contract_abi: JsonAbi,
    ) -> Self {
        Self {
            target_chain,
            contract_address,
            contract_abi,
            override_provider: None,
            surface: CallSurface::default(),
        }
    }

    pub fn with_override_provider(mut self, provider: P) -> Self {
        self.override_provider = Some(provider);
        self
    }

    pub fn with_surface(mut self, surface: CallSurface) -> Self {
        self.surface = surface;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    accounts: Vec<Address>,
    chain: ChainDescriptor,
}

impl Connection {
    pub fn new(accounts: Vec<Address>, chain: ChainDescriptor) -> Option<Self> {
        if accounts.is_empty() {
            return None;
        }
        Some(Self { accounts, chain })
    }

    pub fn accounts(&self) -> &[Address] {
        &self.accounts
    }

    pub fn chain(&self) -> &ChainDescriptor {
        &self.chain
    }

    pub fn acting_account(&self) -> Address {
        self.accounts[0]
    }
}

pub type NegotiationResult = Result<Connection, SessionError>;
