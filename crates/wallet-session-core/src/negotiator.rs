use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use alloy::primitives::{Address, ChainId};
use futures::future::{FutureExt, LocalBoxFuture, Shared};

use crate::binding::ContractBinding;
use crate::chains::{ChainDescriptor, ChainRegistry};
use crate::domain::{Connection, NegotiationResult, SessionConfig, WalletState};
use crate::error::SessionError;
use crate::ports::{PortError, ProviderEventKind, TransactionSubmitter, WalletProvider};
use crate::provider::ProviderAdapter;
use crate::state_machine::{session_transition, SessionAction, SessionState};

struct Inner {
    state: SessionState,
    wallet: WalletState,
    binding: Option<ContractBinding>,
    subscribed: bool,
    pending_prompt: Option<PendingPrompt>,
}

// Outlives the attempt that issued it. The next attempt awaits it first.
type PendingPrompt = Shared<LocalBoxFuture<'static, Result<PromptReply, PortError>>>;

enum Prompt {
    RequestAccounts,
    SwitchChain(String),
    AddChain(ChainDescriptor),
}

#[derive(Debug, Clone)]
enum PromptReply {
    Accounts(Vec<Address>),
    Done,
}

struct AttemptGuard<'a>(&'a AtomicBool);

impl<'a> AttemptGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Result<Self, SessionError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| Self(flag))
            .map_err(|_| SessionError::RequestAlreadyPending)
    }
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct SessionNegotiator<P> {
    config: SessionConfig<P>,
    registry: ChainRegistry,
    adapter: ProviderAdapter<P>,
    inner: Mutex<Inner>,
    in_flight: AtomicBool,
}

impl<P: WalletProvider + Clone + 'static> SessionNegotiator<P> {
    pub fn new(mut config: SessionConfig<P>, injected: Option<P>) -> Self {
        let registry = ChainRegistry::builtin()
            .clone()
            .with_chain(config.target_chain.clone());
        let adapter = ProviderAdapter::new(injected, config.override_provider.take());
        Self {
            config,
            registry,
            adapter,
            inner: Mutex::new(Inner {
                state: SessionState::Idle,
                wallet: WalletState::default(),
                binding: None,
                subscribed: false,
                pending_prompt: None,
            }),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn target_chain(&self) -> &ChainDescriptor {
        &self.config.target_chain
    }

    pub fn registry(&self) -> &ChainRegistry {
        &self.registry
    }

    pub fn state(&self) -> SessionState {
        self.inner().state.clone()
    }

    pub fn wallet_state(&self) -> WalletState {
        self.sync_events();
        self.inner().wallet.clone()
    }

    pub fn acting_account(&self) -> Option<Address> {
        self.sync_events();
        self.inner().wallet.accounts.first().copied()
    }

    pub fn is_connected(&self) -> bool {
        let Some(handle) = self.adapter.handle() else {
            return false;
        };
        if !handle.provider.is_connected() {
            return false;
        }
        self.sync_events();
        let inner = self.inner();
        inner.wallet.is_on(&self.config.target_chain) && inner.wallet.has_accounts()
    }

    /// Fails with [`SessionError::RequestAlreadyPending`] while another attempt is in flight.
    pub async fn connect(&self, deep: bool) -> NegotiationResult {
        let _guard = AttemptGuard::enter(&self.in_flight)?;
        self.await_pending_prompt().await;
        self.sync_events();
        if let Some(connection) = self.ready_connection() {
            return Ok(connection);
        }

        let result = self.negotiate(deep).await;
        match &result {
            Ok(connection) => tracing::info!(
                chain = %connection.chain(),
                account = %connection.acting_account(),
                "wallet session ready"
            ),
            Err(err) => {
                tracing::debug!(%err, deep, "negotiation failed");
                self.advance(SessionAction::Fail(err.clone()));
            }
        }
        result
    }

    pub async fn connect_chain(&self, deep: bool) -> Result<ChainDescriptor, SessionError> {
        let _guard = AttemptGuard::enter(&self.in_flight)?;
        self.await_pending_prompt().await;
        self.sync_events();
        let result = match self.acquire() {
            Ok(provider) => self.negotiate_chain(provider, deep).await,
            Err(err) => Err(err),
        };
        self.settle(&result);
        result
    }

    pub async fn connect_accounts(&self, deep: bool) -> Result<Vec<Address>, SessionError> {
        let _guard = AttemptGuard::enter(&self.in_flight)?;
        self.await_pending_prompt().await;
        self.sync_events();
        let result = match self.acquire() {
            Ok(provider) => self.negotiate_accounts(provider, deep).await,
            Err(err) => Err(err),
        };
        self.settle(&result);
        result
    }

    pub fn disconnect(&self) {
        let mut inner = self.inner();
        inner.wallet.accounts = Vec::new();
        if let Some(binding) = inner.binding.take() {
            inner.binding = Some(ContractBinding::bind_read_only(&self.config, binding.source()));
        }
        if inner.state == SessionState::Ready {
            Self::apply(&mut inner, SessionAction::SignOut);
        }
    }

    pub fn get_binding(&self) -> Option<ContractBinding> {
        self.sync_events();
        let mut inner = self.inner();
        let account = inner.wallet.accounts.first().copied()?;
        let binding = inner.binding.as_ref()?;
        let rebound = match binding.signer() {
            Some(signer) if signer != account => {
                ContractBinding::bind_authorized(binding, account)
            }
            _ => return Some(binding.clone()),
        };
        inner.binding = Some(rebound.clone());
        Some(rebound)
    }

    pub fn hand_off<S: TransactionSubmitter>(&self, submitter: &S) -> Result<(), SessionError> {
        let binding = self
            .get_binding()
            .ok_or(SessionError::NoAuthorizedAccounts)?;
        let from = binding.signer().ok_or(SessionError::NoAuthorizedAccounts)?;
        if !self.on_target() {
            return Err(SessionError::chain_mismatch(&self.config.target_chain));
        }
        submitter.accept(&binding, from);
        Ok(())
    }

    pub fn sync_events(&self) {
        let Some(handle) = self.adapter.handle() else {
            return;
        };
        let events = match handle.provider.drain_events() {
            Ok(events) => events,
            Err(err) => {
                tracing::warn!(%err, "failed to drain provider events");
                return;
            }
        };
        if events.is_empty() {
            return;
        }

        let mut inner = self.inner();
        for event in events {
            match event.kind {
                ProviderEventKind::AccountsChanged(accounts) => {
                    tracing::debug!(
                        seq = event.sequence,
                        count = accounts.len(),
                        "accounts changed"
                    );
                    inner.wallet.accounts = accounts;
                }
                ProviderEventKind::ChainChanged(chain_id) => match self.registry.lookup(chain_id) {
                    Some(chain) => {
                        tracing::debug!(seq = event.sequence, %chain, "chain changed");
                        inner.wallet.chain = Some(chain.clone());
                    }
                    None => tracing::warn!(
                        seq = event.sequence,
                        chain_id,
                        "unknown chain pushed by wallet; keeping previous chain"
                    ),
                },
            }
        }
    }

    async fn negotiate(&self, deep: bool) -> NegotiationResult {
        self.advance(SessionAction::Restart);
        let provider = self.acquire()?;
        if !provider.is_connected() {
            return Err(SessionError::NoProviderAvailable);
        }

        let start_chain = self.refresh_chain(provider).await;

        self.sync_events();
        let chain = self.negotiate_chain(provider, deep).await?;
        self.advance(SessionAction::ConnectChain);

        self.sync_events();
        let accounts = self.negotiate_accounts(provider, deep).await?;
        self.authorize(&accounts);
        self.advance(SessionAction::ConnectAccounts);

        let fresh_chain = self.probe_chain_id(provider).await;
        if fresh_chain != start_chain || fresh_chain != Some(chain.decimal_id()) {
            return Err(self.chain_moved(fresh_chain));
        }

        Connection::new(accounts, chain).ok_or(SessionError::NoAuthorizedAccounts)
    }

    // Only a wallet that moved onto the target asks for a reload.
    fn chain_moved(&self, fresh_chain: Option<ChainId>) -> SessionError {
        let target = &self.config.target_chain;
        {
            let mut inner = self.inner();
            if let Some(chain) = fresh_chain.and_then(|id| self.registry.lookup(id)) {
                inner.wallet.chain = Some(chain.clone());
            }
            if let Some(binding) = inner.binding.take() {
                inner.binding = Some(ContractBinding::bind_read_only(
                    &self.config,
                    binding.source(),
                ));
            }
        }
        if fresh_chain == Some(target.decimal_id()) {
            tracing::info!(%target, "wallet moved to target chain during sign-in");
            SessionError::ReloadRequired {
                chain: target.clone(),
            }
        } else {
            SessionError::chain_mismatch(target)
        }
    }

    async fn negotiate_chain(
        &self,
        provider: &P,
        deep: bool,
    ) -> Result<ChainDescriptor, SessionError> {
        let target = &self.config.target_chain;
        if self.on_target() {
            return Ok(target.clone());
        }

        self.refresh_chain(provider).await;
        if self.on_target() {
            return Ok(target.clone());
        }
        if !deep {
            return Err(SessionError::chain_mismatch(target));
        }

        match self.prompt(provider, Prompt::SwitchChain(target.hex_id().to_owned())).await {
            Ok(_) => {
                self.refresh_chain(provider).await;
                return self.target_or_mismatch();
            }
            Err(err) => {
                reject_early(&err)?;
                tracing::debug!(%err, %target, "switch failed; asking wallet to add chain");
            }
        }

        if let Err(err) = self.prompt(provider, Prompt::AddChain(target.clone())).await {
            reject_early(&err)?;
            tracing::warn!(%err, %target, "wallet refused to add chain");
            return Err(SessionError::chain_mismatch(target));
        }
        self.refresh_chain(provider).await;
        if self.on_target() {
            return Ok(target.clone());
        }

        if let Err(err) = self
            .prompt(provider, Prompt::SwitchChain(target.hex_id().to_owned()))
            .await
        {
            reject_early(&err)?;
            tracing::warn!(%err, %target, "switch after add failed");
            return Err(SessionError::chain_mismatch(target));
        }
        self.refresh_chain(provider).await;
        self.target_or_mismatch()
    }

    async fn negotiate_accounts(
        &self,
        provider: &P,
        deep: bool,
    ) -> Result<Vec<Address>, SessionError> {
        let known = self.inner().wallet.accounts.clone();
        if !known.is_empty() {
            return Ok(known);
        }

        let authorized = self.authorized_accounts(provider).await;
        if !authorized.is_empty() {
            self.inner().wallet.accounts = authorized.clone();
            return Ok(authorized);
        }
        if !deep {
            return Err(SessionError::NoAuthorizedAccounts);
        }

        let requested = match self.prompt(provider, Prompt::RequestAccounts).await {
            Ok(PromptReply::Accounts(accounts)) => accounts,
            Ok(PromptReply::Done) => Vec::new(),
            Err(err) => {
                let err = SessionError::from(err);
                if matches!(err, SessionError::UnknownWalletError(_)) {
                    tracing::warn!(%err, "eth_requestAccounts failed");
                }
                return Err(err);
            }
        };
        self.inner().wallet.accounts = requested.clone();
        if requested.is_empty() {
            return Err(SessionError::NoAuthorizedAccounts);
        }
        Ok(requested)
    }

    async fn authorized_accounts(&self, provider: &P) -> Vec<Address> {
        match provider.permissions().await {
            Ok(granted) if !granted.iter().any(|p| p == "eth_accounts") => return Vec::new(),
            Ok(_) => {}
            Err(err) => tracing::warn!(%err, "wallet_getPermissions failed"),
        }
        provider.accounts().await.unwrap_or_else(|err| {
            tracing::warn!(%err, "eth_accounts failed");
            Vec::new()
        })
    }

    async fn probe_chain_id(&self, provider: &P) -> Option<ChainId> {
        match provider.chain_id().await {
            Ok(chain_id) => Some(chain_id),
            Err(err) => {
                tracing::warn!(%err, "eth_chainId failed");
                None
            }
        }
    }

    async fn refresh_chain(&self, provider: &P) -> Option<ChainId> {
        let chain_id = self.probe_chain_id(provider).await?;
        let resolved = self.registry.lookup(chain_id).cloned();
        if resolved.is_none() {
            tracing::warn!(chain_id, "wallet is on an unknown chain");
        }
        self.inner().wallet.chain = resolved;
        Some(chain_id)
    }

    async fn prompt(&self, provider: &P, prompt: Prompt) -> Result<PromptReply, PortError> {
        let provider = provider.clone();
        let reply = async move {
            match prompt {
                Prompt::RequestAccounts => provider
                    .request_accounts()
                    .await
                    .map(PromptReply::Accounts),
                Prompt::SwitchChain(hex_chain_id) => provider
                    .switch_chain(&hex_chain_id)
                    .await
                    .map(|()| PromptReply::Done),
                Prompt::AddChain(chain) => {
                    provider.add_chain(&chain).await.map(|()| PromptReply::Done)
                }
            }
        }
        .boxed_local()
        .shared();

        self.inner().pending_prompt = Some(reply.clone());
        let outcome = reply.await;
        self.inner().pending_prompt = None;
        outcome
    }

    async fn await_pending_prompt(&self) {
        let Some(pending) = self.inner().pending_prompt.clone() else {
            return;
        };
        tracing::debug!("waiting for a wallet prompt from an abandoned attempt");
        let outcome = pending.await;
        let mut inner = self.inner();
        inner.pending_prompt = None;
        if let Ok(PromptReply::Accounts(accounts)) = outcome {
            inner.wallet.accounts = accounts;
        }
    }

    fn settle<T>(&self, result: &Result<T, SessionError>) {
        if let Err(err) = result {
            self.advance(SessionAction::Fail(err.clone()));
            return;
        }
        if self.state() == SessionState::ProviderAcquired && self.on_target() {
            self.advance(SessionAction::ConnectChain);
        }
        let accounts = self.inner().wallet.accounts.clone();
        if self.state() == SessionState::ChainConnected && !accounts.is_empty() {
            self.authorize(&accounts);
            self.advance(SessionAction::ConnectAccounts);
        }
    }

    fn acquire(&self) -> Result<&P, SessionError> {
        let handle = self.adapter.acquire()?;

        let mut inner = self.inner();
        if matches!(inner.state, SessionState::Failed(_)) {
            Self::apply(&mut inner, SessionAction::Restart);
        }
        if inner.state == SessionState::Idle {
            Self::apply(&mut inner, SessionAction::Acquire);
        }
        if inner.binding.is_none() {
            inner.binding = Some(ContractBinding::bind_read_only(&self.config, handle.source));
        }
        if !inner.subscribed {
            match handle.provider.subscribe() {
                Ok(()) => inner.subscribed = true,
                Err(err) => tracing::warn!(%err, "failed to subscribe to wallet events"),
            }
        }
        Ok(&handle.provider)
    }

    fn authorize(&self, accounts: &[Address]) {
        let Some(account) = accounts.first().copied() else {
            return;
        };
        let mut inner = self.inner();
        if let Some(binding) = inner.binding.as_ref() {
            inner.binding = Some(ContractBinding::bind_authorized(binding, account));
        }
    }

    fn ready_connection(&self) -> Option<Connection> {
        let inner = self.inner();
        if inner.state != SessionState::Ready || !inner.wallet.is_on(&self.config.target_chain) {
            return None;
        }
        Connection::new(inner.wallet.accounts.clone(), self.config.target_chain.clone())
    }

    fn on_target(&self) -> bool {
        self.inner().wallet.is_on(&self.config.target_chain)
    }

    fn target_or_mismatch(&self) -> Result<ChainDescriptor, SessionError> {
        if self.on_target() {
            Ok(self.config.target_chain.clone())
        } else {
            Err(SessionError::chain_mismatch(&self.config.target_chain))
        }
    }

    fn advance(&self, action: SessionAction) {
        Self::apply(&mut self.inner(), action);
    }

    fn apply(inner: &mut Inner, action: SessionAction) {
        match session_transition(&inner.state, action) {
            Ok((next, transition)) => {
                tracing::debug!(
                    from = transition.from,
                    to = transition.to,
                    reason = transition.reason,
                    "session transition"
                );
                inner.state = next;
            }
            Err(err) => tracing::warn!(%err, "ignored session transition"),
        }
    }

    // State updates replace whole fields, so a poisoned lock still holds a
    // consistent value.
    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn reject_early(err: &PortError) -> Result<(), SessionError> {
    match err {
        PortError::UserRejected => Err(SessionError::UserRejected),
        PortError::RequestPending => Err(SessionError::RequestAlreadyPending),
        _ => Ok(()),
    }
}
