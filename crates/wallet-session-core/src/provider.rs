use std::sync::{Mutex, OnceLock, PoisonError};

use crate::domain::ProviderSource;
use crate::error::SessionError;
use crate::ports::WalletProvider;

#[derive(Debug)]
pub struct ProviderHandle<P> {
    pub source: ProviderSource,
    pub provider: P,
}

#[derive(Debug)]
struct Candidates<P> {
    injected: Option<P>,
    network_override: Option<P>,
}

#[derive(Debug)]
pub struct ProviderAdapter<P> {
    candidates: Mutex<Candidates<P>>,
    handle: OnceLock<ProviderHandle<P>>,
}

impl<P: WalletProvider> ProviderAdapter<P> {
    pub fn new(injected: Option<P>, network_override: Option<P>) -> Self {
        Self {
            candidates: Mutex::new(Candidates {
                injected,
                network_override,
            }),
            handle: OnceLock::new(),
        }
    }

    pub fn acquire(&self) -> Result<&ProviderHandle<P>, SessionError> {
        if let Some(handle) = self.handle.get() {
            return Ok(handle);
        }

        let picked = {
            let mut candidates = self
                .candidates
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let picked = match candidates.injected.take() {
                Some(provider) => Some((ProviderSource::Injected, provider)),
                None => candidates
                    .network_override
                    .take()
                    .map(|provider| (ProviderSource::NetworkOverride, provider)),
            };
            candidates.network_override = None;
            picked
        };

        let Some((source, provider)) = picked else {
            tracing::warn!("no injected wallet and no override provider");
            return Err(SessionError::NoProviderAvailable);
        };
        tracing::debug!(?source, "provider acquired");
        Ok(self.handle.get_or_init(|| ProviderHandle { source, provider }))
    }

    pub fn handle(&self) -> Option<&ProviderHandle<P>> {
        self.handle.get()
    }
}
