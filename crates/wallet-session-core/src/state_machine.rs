use thiserror::Error;

use crate::error::SessionError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    ProviderAcquired,
    ChainConnected,
    Ready,
    Failed(SessionError),
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::ProviderAcquired => "ProviderAcquired",
            SessionState::ChainConnected => "ChainConnected",
            SessionState::Ready => "Ready",
            SessionState::Failed(_) => "Failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    Acquire,
    ConnectChain,
    ConnectAccounts,
    SignOut,
    Restart,
    Fail(SessionError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTransition {
    pub from: &'static str,
    pub to: &'static str,
    pub reason: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("illegal session transition: {from} --{action}-->")]
pub struct TransitionError {
    pub from: &'static str,
    pub action: &'static str,
}

fn action_name(action: &SessionAction) -> &'static str {
    match action {
        SessionAction::Acquire => "acquire",
        SessionAction::ConnectChain => "connect_chain",
        SessionAction::ConnectAccounts => "connect_accounts",
        SessionAction::SignOut => "sign_out",
        SessionAction::Restart => "restart",
        SessionAction::Fail(_) => "fail",
    }
}

pub fn session_transition(
    state: &SessionState,
    action: SessionAction,
) -> Result<(SessionState, StateTransition), TransitionError> {
    use SessionAction as A;
    use SessionState as S;

    let reason = action_name(&action);
    let next = match (state, action) {
        (_, A::Restart) => S::Idle,
        (_, A::Fail(err)) => S::Failed(err),
        (S::Idle, A::Acquire) => S::ProviderAcquired,
        (S::ProviderAcquired, A::ConnectChain) => S::ChainConnected,
        (S::ChainConnected, A::ConnectAccounts) => S::Ready,
        (S::Ready, A::SignOut) => S::ChainConnected,
        (from, _) => {
            return Err(TransitionError {
                from: from.name(),
                action: reason,
            })
        }
    };
    let transition = StateTransition {
        from: state.name(),
        to: next.name(),
        reason,
    };
    Ok((next, transition))
}
