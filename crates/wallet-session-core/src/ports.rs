use alloy::primitives::{Address, ChainId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::binding::ContractBinding;
use crate::chains::ChainDescriptor;

pub const USER_REJECTED_CODE: i64 = 4001;
pub const REQUEST_PENDING_CODE: i64 = -32002;
pub const UNRECOGNIZED_CHAIN_CODE: i64 = 4902;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortError {
    #[error("port not implemented: {0}")]
    NotImplemented(&'static str),
    #[error("policy error: {0}")]
    Policy(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("user rejected the request")]
    UserRejected,
    #[error("a wallet request is already pending")]
    RequestPending,
    #[error("wallet does not recognize the chain")]
    UnrecognizedChain,
    #[error("wallet error {code}: {message}")]
    Rpc { code: i64, message: String },
}

impl PortError {
    pub fn from_rpc(code: i64, message: impl Into<String>) -> Self {
        match code {
            USER_REJECTED_CODE => PortError::UserRejected,
            REQUEST_PENDING_CODE => PortError::RequestPending,
            UNRECOGNIZED_CHAIN_CODE => PortError::UnrecognizedChain,
            _ => PortError::Rpc {
                code,
                message: message.into(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderEventKind {
    AccountsChanged(Vec<Address>),
    ChainChanged(ChainId),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEvent {
    pub sequence: u64,
    pub kind: ProviderEventKind,
}

/// Implementations classify vendor errors into [`PortError`] before returning.
#[allow(async_fn_in_trait)]
pub trait WalletProvider {
    fn is_connected(&self) -> bool;
    async fn chain_id(&self) -> Result<ChainId, PortError>;
    async fn permissions(&self) -> Result<Vec<String>, PortError>;
    async fn accounts(&self) -> Result<Vec<Address>, PortError>;
    async fn request_accounts(&self) -> Result<Vec<Address>, PortError>;
    async fn switch_chain(&self, hex_chain_id: &str) -> Result<(), PortError>;
    async fn add_chain(&self, chain: &ChainDescriptor) -> Result<(), PortError>;
    /// Repeated calls must not register listeners twice.
    fn subscribe(&self) -> Result<(), PortError>;
    fn drain_events(&self) -> Result<Vec<ProviderEvent>, PortError>;
}

pub trait TransactionSubmitter {
    fn accept(&self, binding: &ContractBinding, from: Address);
}
