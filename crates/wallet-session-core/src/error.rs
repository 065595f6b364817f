use thiserror::Error;

use crate::chains::ChainDescriptor;
use crate::ports::PortError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("no wallet provider available")]
    NoProviderAvailable,
    #[error("switch network to {target} before continuing")]
    ChainMismatch { target: String },
    #[error("request rejected in wallet")]
    UserRejected,
    #[error("a wallet request is already pending; check your wallet")]
    RequestAlreadyPending,
    #[error("no authorized accounts; unlock your wallet and select an account")]
    NoAuthorizedAccounts,
    /// Provider objects tied to the old chain may be stale.
    #[error("wallet switched to {chain}; reload required")]
    ReloadRequired { chain: ChainDescriptor },
    #[error("unknown wallet error: {0}")]
    UnknownWalletError(String),
}

impl SessionError {
    pub fn chain_mismatch(target: &ChainDescriptor) -> Self {
        SessionError::ChainMismatch {
            target: target.name().to_owned(),
        }
    }
}

impl From<PortError> for SessionError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::UserRejected => SessionError::UserRejected,
            PortError::RequestPending => SessionError::RequestAlreadyPending,
            other => SessionError::UnknownWalletError(other.to_string()),
        }
    }
}
