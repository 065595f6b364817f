use std::env;
use std::str::FromStr;

pub const PROXY_URL_ENV: &str = "WALLET_SESSION_PROXY_URL";
pub const REQUEST_TIMEOUT_ENV: &str = "WALLET_SESSION_REQUEST_TIMEOUT_MS";
pub const CHAIN_ID_ENV: &str = "WALLET_SESSION_CHAIN_ID";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionAdapterConfig {
    pub provider_proxy_url: Option<String>,
    /// Proxy HTTP timeout. Wallet prompts are never timed out here.
    pub request_timeout_ms: u64,
    pub default_chain_id: u64,
}

impl Default for SessionAdapterConfig {
    fn default() -> Self {
        Self {
            provider_proxy_url: None,
            request_timeout_ms: 120_000,
            default_chain_id: 1,
        }
    }
}

impl SessionAdapterConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            provider_proxy_url: env::var(PROXY_URL_ENV)
                .ok()
                .map(|url| url.trim().to_owned())
                .filter(|url| !url.is_empty()),
            request_timeout_ms: parse_env(REQUEST_TIMEOUT_ENV, defaults.request_timeout_ms),
            default_chain_id: parse_env(CHAIN_ID_ENV, defaults.default_chain_id),
        }
    }
}

fn parse_env<T: FromStr + Copy>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "invalid value; using default");
            default
        }),
        Err(_) => default,
    }
}
