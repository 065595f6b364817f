pub mod binding;
pub mod chains;
pub mod domain;
pub mod error;
pub mod negotiator;
pub mod ports;
pub mod provider;
pub mod state_machine;

pub use binding::{BindingPhase, ContractBinding};
pub use chains::{parse_chain_id, ChainDescriptor, ChainRef, ChainRegistry};
pub use domain::{
    CallSurface, Connection, NegotiationResult, ProviderSource, SessionConfig, WalletState,
};
pub use error::SessionError;
pub use negotiator::SessionNegotiator;
pub use ports::{
    PortError, ProviderEvent, ProviderEventKind, TransactionSubmitter, WalletProvider,
    REQUEST_PENDING_CODE, UNRECOGNIZED_CHAIN_CODE, USER_REJECTED_CODE,
};
pub use provider::{ProviderAdapter, ProviderHandle};
pub use state_machine::{
    session_transition, SessionAction, SessionState, StateTransition, TransitionError,
};
