use std::sync::Arc;

use alloy::json_abi::{Function, JsonAbi};
use alloy::primitives::Address;

use crate::domain::{CallSurface, ProviderSource, SessionConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingPhase {
    ReadOnly,
    Authorized { account: Address },
}

#[derive(Debug, Clone)]
pub struct ContractBinding {
    address: Address,
    abi: Arc<JsonAbi>,
    source: ProviderSource,
    surface: CallSurface,
    phase: BindingPhase,
}

impl ContractBinding {
    pub fn bind_read_only<P>(config: &SessionConfig<P>, source: ProviderSource) -> Self {
        Self {
            address: config.contract_address,
            abi: Arc::new(config.contract_abi.clone()),
            source,
            surface: config.surface,
            phase: BindingPhase::ReadOnly,
        }
    }

    pub fn bind_authorized(existing: &ContractBinding, account: Address) -> Self {
        Self {
            phase: BindingPhase::Authorized { account },
            ..existing.clone()
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn abi(&self) -> &JsonAbi {
        &self.abi
    }

    pub fn source(&self) -> ProviderSource {
        self.source
    }

    pub fn surface(&self) -> CallSurface {
        self.surface
    }

    pub fn phase(&self) -> BindingPhase {
        self.phase
    }

    pub fn signer(&self) -> Option<Address> {
        match self.phase {
            BindingPhase::Authorized { account } => Some(account),
            BindingPhase::ReadOnly => None,
        }
    }

    pub fn is_authorized(&self) -> bool {
        self.signer().is_some()
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.abi.function(name).and_then(|overloads| overloads.first())
    }
}
