use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use alloy::primitives::{Address, ChainId};
use serde_json::{json, Value};

use wallet_session_core::{
    parse_chain_id, ChainDescriptor, PortError, ProviderEvent, ProviderEventKind, WalletProvider,
    UNRECOGNIZED_CHAIN_CODE,
};

use crate::SessionAdapterConfig;

pub const ETH_CHAIN_ID: &str = "eth_chainId";
pub const ETH_ACCOUNTS: &str = "eth_accounts";
pub const ETH_REQUEST_ACCOUNTS: &str = "eth_requestAccounts";
pub const WALLET_GET_PERMISSIONS: &str = "wallet_getPermissions";
pub const WALLET_SWITCH_CHAIN: &str = "wallet_switchEthereumChain";
pub const WALLET_ADD_CHAIN: &str = "wallet_addEthereumChain";

const UNSUPPORTED_METHOD_CODE: i64 = 4200;

#[derive(Debug, Clone)]
pub struct Eip1193Adapter {
    mode: ProviderMode,
    state: Arc<Mutex<ProviderState>>,
    #[cfg(target_arch = "wasm32")]
    hooks: Arc<Mutex<BrowserHooks>>,
}

#[derive(Debug, Clone)]
enum ProviderMode {
    Deterministic,
    #[cfg(not(target_arch = "wasm32"))]
    Proxy(ProxyRuntime),
    #[cfg(target_arch = "wasm32")]
    Browser,
}

#[derive(Debug, Clone)]
#[cfg(not(target_arch = "wasm32"))]
struct ProxyRuntime {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Default)]
struct ProviderState {
    chain_id: ChainId,
    known_chains: Vec<ChainId>,
    authorized: Vec<Address>,
    grantable: Vec<Address>,
    failures: HashMap<String, VecDeque<(i64, String)>>,
    requests: Vec<String>,
    subscriptions: u32,
    event_seq: u64,
    events: Vec<ProviderEvent>,
}

impl ProviderState {
    fn push_event(&mut self, kind: ProviderEventKind) {
        self.event_seq = self.event_seq.saturating_add(1);
        let sequence = self.event_seq;
        self.events.push(ProviderEvent { sequence, kind });
    }
}

#[cfg(target_arch = "wasm32")]
#[derive(Debug, Default)]
struct BrowserHooks {
    accounts_changed: Option<wasm_bindgen::closure::Closure<dyn FnMut(wasm_bindgen::JsValue)>>,
    chain_changed: Option<wasm_bindgen::closure::Closure<dyn FnMut(wasm_bindgen::JsValue)>>,
}

impl Eip1193Adapter {
    pub fn detect(config: &SessionAdapterConfig) -> Option<Self> {
        #[cfg(target_arch = "wasm32")]
        let detected = {
            let _ = config;
            if browser_provider_available() {
                Some(Self::with_mode(ProviderMode::Browser, ProviderState::default()))
            } else {
                tracing::debug!("window.ethereum not found");
                None
            }
        };

        #[cfg(not(target_arch = "wasm32"))]
        let detected = match config.provider_proxy_url {
            None => {
                tracing::debug!("no EIP-1193 proxy configured");
                None
            }
            Some(_) => Self::proxy(config)
                .map_err(|err| tracing::warn!(%err, "EIP-1193 proxy unavailable"))
                .ok(),
        };

        detected
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub fn proxy(config: &SessionAdapterConfig) -> Result<Self, PortError> {
        let base_url = config
            .provider_proxy_url
            .clone()
            .ok_or_else(|| PortError::Policy("EIP-1193 proxy URL not configured".to_owned()))?;
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| PortError::Transport(format!("failed to build proxy client: {e}")))?;
        Ok(Self::with_mode(
            ProviderMode::Proxy(ProxyRuntime { base_url, client }),
            ProviderState::default(),
        ))
    }

    /// In-memory wallet that knows mainnet and `config.default_chain_id`,
    /// starts with nothing authorized and grants `grantable` when asked.
    pub fn deterministic(config: &SessionAdapterConfig, grantable: Vec<Address>) -> Self {
        let mut known_chains = vec![1];
        if config.default_chain_id != 1 {
            known_chains.push(config.default_chain_id);
        }
        Self::with_mode(
            ProviderMode::Deterministic,
            ProviderState {
                chain_id: config.default_chain_id,
                known_chains,
                grantable,
                ..ProviderState::default()
            },
        )
    }

    fn with_mode(mode: ProviderMode, state: ProviderState) -> Self {
        Self {
            mode,
            state: Arc::new(Mutex::new(state)),
            #[cfg(target_arch = "wasm32")]
            hooks: Arc::new(Mutex::new(BrowserHooks::default())),
        }
    }

    fn state(&self) -> Result<MutexGuard<'_, ProviderState>, PortError> {
        self.state
            .lock()
            .map_err(|e| PortError::Transport(format!("provider lock poisoned: {e}")))
    }

    fn check_deterministic(&self) -> Result<(), PortError> {
        match &self.mode {
            ProviderMode::Deterministic => Ok(()),
            #[allow(unreachable_patterns)]
            _ => Err(PortError::Policy(
                "debug controls require the deterministic provider".to_owned(),
            )),
        }
    }

    pub fn debug_authorize(&self, accounts: Vec<Address>) -> Result<(), PortError> {
        self.check_deterministic()?;
        self.state()?.authorized = accounts;
        Ok(())
    }

    pub fn debug_know_chain(&self, chain_id: ChainId) -> Result<(), PortError> {
        self.check_deterministic()?;
        let mut g = self.state()?;
        if !g.known_chains.contains(&chain_id) {
            g.known_chains.push(chain_id);
        }
        Ok(())
    }

    pub fn debug_fail_next(
        &self,
        method: &str,
        code: i64,
        message: impl Into<String>,
    ) -> Result<(), PortError> {
        self.check_deterministic()?;
        self.state()?
            .failures
            .entry(method.to_owned())
            .or_default()
            .push_back((code, message.into()));
        Ok(())
    }

    pub fn debug_requests(&self) -> Result<Vec<String>, PortError> {
        Ok(self.state()?.requests.clone())
    }

    pub fn debug_subscriptions(&self) -> Result<u32, PortError> {
        Ok(self.state()?.subscriptions)
    }

    pub fn debug_inject_accounts_changed(&self, accounts: Vec<Address>) -> Result<(), PortError> {
        let mut g = self.state()?;
        g.authorized = accounts.clone();
        g.push_event(ProviderEventKind::AccountsChanged(accounts));
        Ok(())
    }

    pub fn debug_inject_chain_changed(&self, chain_id: ChainId) -> Result<(), PortError> {
        let mut g = self.state()?;
        g.chain_id = chain_id;
        g.push_event(ProviderEventKind::ChainChanged(chain_id));
        Ok(())
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, PortError> {
        self.state()?.requests.push(method.to_owned());
        match &self.mode {
            ProviderMode::Deterministic => self.deterministic_call(method, &params),
            #[cfg(not(target_arch = "wasm32"))]
            ProviderMode::Proxy(proxy) => proxy_call(proxy, method, params).await,
            #[cfg(target_arch = "wasm32")]
            ProviderMode::Browser => wasm_request(method, params).await,
        }
    }

    fn deterministic_call(&self, method: &str, params: &Value) -> Result<Value, PortError> {
        let mut g = self.state()?;
        if let Some((code, message)) = g.failures.get_mut(method).and_then(VecDeque::pop_front) {
            return Err(PortError::from_rpc(code, message));
        }

        match method {
            ETH_CHAIN_ID => Ok(json!(format!("{:#x}", g.chain_id))),
            ETH_ACCOUNTS => Ok(accounts_json(&g.authorized)),
            WALLET_GET_PERMISSIONS => {
                if g.authorized.is_empty() {
                    Ok(json!([]))
                } else {
                    Ok(json!([{ "parentCapability": ETH_ACCOUNTS }]))
                }
            }
            ETH_REQUEST_ACCOUNTS => {
                if g.authorized != g.grantable {
                    g.authorized = g.grantable.clone();
                    let accounts = g.authorized.clone();
                    g.push_event(ProviderEventKind::AccountsChanged(accounts));
                }
                Ok(accounts_json(&g.authorized))
            }
            WALLET_SWITCH_CHAIN => {
                let chain_id = requested_chain_id(params)?;
                if !g.known_chains.contains(&chain_id) {
                    return Err(PortError::from_rpc(
                        UNRECOGNIZED_CHAIN_CODE,
                        format!("Unrecognized chain ID \"{chain_id:#x}\""),
                    ));
                }
                if g.chain_id != chain_id {
                    g.chain_id = chain_id;
                    g.push_event(ProviderEventKind::ChainChanged(chain_id));
                }
                Ok(Value::Null)
            }
            WALLET_ADD_CHAIN => {
                let chain_id = requested_chain_id(params)?;
                if !g.known_chains.contains(&chain_id) {
                    g.known_chains.push(chain_id);
                }
                Ok(Value::Null)
            }
            other => Err(PortError::from_rpc(
                UNSUPPORTED_METHOD_CODE,
                format!("method {other} is not supported"),
            )),
        }
    }

    #[cfg(target_arch = "wasm32")]
    fn register_browser_hooks(&self) -> Result<(), PortError> {
        use wasm_bindgen::{closure::Closure, JsCast, JsValue};

        let provider = browser_provider()?;
        let on_fn = get_prop(&provider, "on")
            .ok()
            .and_then(|v| v.dyn_into::<js_sys::Function>().ok())
            .or_else(|| {
                get_prop(&provider, "addListener")
                    .ok()
                    .and_then(|v| v.dyn_into::<js_sys::Function>().ok())
            })
            .ok_or(PortError::NotImplemented(
                "provider does not expose on/addListener",
            ))?;

        let mut hooks = self
            .hooks
            .lock()
            .map_err(|e| PortError::Transport(format!("provider hooks lock poisoned: {e}")))?;
        if hooks.accounts_changed.is_some() && hooks.chain_changed.is_some() {
            return Ok(());
        }

        let state_for_accounts = Arc::clone(&self.state);
        let accounts_cb = Closure::<dyn FnMut(JsValue)>::new(move |value: JsValue| {
            let mut accounts = Vec::new();
            if js_sys::Array::is_array(&value) {
                for item in js_sys::Array::from(&value).iter() {
                    match item.as_string().map(|raw| raw.parse::<Address>()) {
                        Some(Ok(account)) => accounts.push(account),
                        _ => tracing::warn!(?item, "ignoring malformed account"),
                    }
                }
            }
            if let Ok(mut g) = state_for_accounts.lock() {
                g.push_event(ProviderEventKind::AccountsChanged(accounts));
            }
        });

        let state_for_chain = Arc::clone(&self.state);
        let chain_cb = Closure::<dyn FnMut(JsValue)>::new(move |value: JsValue| {
            match js_chain_id_to_u64(&value) {
                Ok(chain_id) => {
                    if let Ok(mut g) = state_for_chain.lock() {
                        g.push_event(ProviderEventKind::ChainChanged(chain_id));
                    }
                }
                Err(err) => tracing::warn!(%err, "ignoring malformed chainChanged payload"),
            }
        });

        on_fn
            .call2(
                &provider,
                &JsValue::from_str("accountsChanged"),
                accounts_cb.as_ref().unchecked_ref(),
            )
            .map_err(|e| PortError::Transport(format!("register accountsChanged failed: {e:?}")))?;
        on_fn
            .call2(
                &provider,
                &JsValue::from_str("chainChanged"),
                chain_cb.as_ref().unchecked_ref(),
            )
            .map_err(|e| PortError::Transport(format!("register chainChanged failed: {e:?}")))?;

        hooks.accounts_changed = Some(accounts_cb);
        hooks.chain_changed = Some(chain_cb);
        Ok(())
    }
}

impl WalletProvider for Eip1193Adapter {
    fn is_connected(&self) -> bool {
        match &self.mode {
            #[cfg(target_arch = "wasm32")]
            ProviderMode::Browser => browser_is_connected(),
            _ => true,
        }
    }

    async fn chain_id(&self) -> Result<ChainId, PortError> {
        let result = self.request(ETH_CHAIN_ID, json!([])).await?;
        json_chain_id_to_u64(&result)
    }

    async fn permissions(&self) -> Result<Vec<String>, PortError> {
        let result = self.request(WALLET_GET_PERMISSIONS, json!([])).await?;
        json_permissions(&result)
    }

    async fn accounts(&self) -> Result<Vec<Address>, PortError> {
        let result = self.request(ETH_ACCOUNTS, json!([])).await?;
        json_accounts(&result, ETH_ACCOUNTS)
    }

    async fn request_accounts(&self) -> Result<Vec<Address>, PortError> {
        let result = self.request(ETH_REQUEST_ACCOUNTS, json!([])).await?;
        json_accounts(&result, ETH_REQUEST_ACCOUNTS)
    }

    async fn switch_chain(&self, hex_chain_id: &str) -> Result<(), PortError> {
        self.request(WALLET_SWITCH_CHAIN, json!([{ "chainId": hex_chain_id }]))
            .await
            .map(|_| ())
    }

    async fn add_chain(&self, chain: &ChainDescriptor) -> Result<(), PortError> {
        self.request(WALLET_ADD_CHAIN, add_chain_params(chain))
            .await
            .map(|_| ())
    }

    fn subscribe(&self) -> Result<(), PortError> {
        self.state()?.subscriptions += 1;
        #[cfg(target_arch = "wasm32")]
        if matches!(self.mode, ProviderMode::Browser) {
            self.register_browser_hooks()?;
        }
        Ok(())
    }

    fn drain_events(&self) -> Result<Vec<ProviderEvent>, PortError> {
        Ok(std::mem::take(&mut self.state()?.events))
    }
}

fn accounts_json(accounts: &[Address]) -> Value {
    json!(accounts.iter().map(ToString::to_string).collect::<Vec<_>>())
}

fn add_chain_params(chain: &ChainDescriptor) -> Value {
    json!([{
        "chainId": chain.hex_id(),
        "chainName": chain.name(),
        "rpcUrls": chain.rpc_url().into_iter().collect::<Vec<_>>(),
    }])
}

fn requested_chain_id(params: &Value) -> Result<ChainId, PortError> {
    let raw = params
        .get(0)
        .and_then(|p| p.get("chainId"))
        .ok_or_else(|| PortError::Validation("request params missing chainId".to_owned()))?;
    json_chain_id_to_u64(raw)
}

#[cfg(not(target_arch = "wasm32"))]
async fn proxy_call(proxy: &ProxyRuntime, method: &str, params: Value) -> Result<Value, PortError> {
    let payload = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": method,
        "params": params,
    });
    let response = proxy
        .client
        .post(&proxy.base_url)
        .json(&payload)
        .send()
        .await
        .map_err(|e| PortError::Transport(format!("eip1193 proxy request failed: {e}")))?;
    let status = response.status();
    let body: Value = response
        .json()
        .await
        .map_err(|e| PortError::Transport(format!("eip1193 proxy json decode failed: {e}")))?;
    if let Some(err) = body.get("error") {
        return Err(rpc_error(err));
    }
    if !status.is_success() {
        return Err(PortError::Transport(format!(
            "eip1193 proxy status {status}: {body}"
        )));
    }
    body.get("result")
        .cloned()
        .ok_or_else(|| PortError::Transport("eip1193 proxy missing result".to_owned()))
}

fn rpc_error(err: &Value) -> PortError {
    let message = err
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .unwrap_or_else(|| err.to_string());
    // Some mobile wallets wrap 4902 inside an internal error.
    let code = err
        .pointer("/data/originalError/code")
        .and_then(Value::as_i64)
        .or_else(|| err.get("code").and_then(Value::as_i64));
    match code {
        Some(code) => PortError::from_rpc(code, message),
        None => PortError::Transport(format!("provider error without code: {err}")),
    }
}

fn json_accounts(value: &Value, method: &str) -> Result<Vec<Address>, PortError> {
    let arr = value
        .as_array()
        .ok_or_else(|| PortError::Validation(format!("{method} result must be array")))?;
    arr.iter()
        .map(|item| {
            item.as_str()
                .ok_or_else(|| PortError::Validation(format!("{method} item must be string")))?
                .parse()
                .map_err(|e| PortError::Validation(format!("invalid account: {e}")))
        })
        .collect()
}

fn json_permissions(value: &Value) -> Result<Vec<String>, PortError> {
    let arr = value.as_array().ok_or_else(|| {
        PortError::Validation(format!("{WALLET_GET_PERMISSIONS} result must be array"))
    })?;
    Ok(arr
        .iter()
        .filter_map(|p| p.get("parentCapability").and_then(Value::as_str))
        .map(str::to_owned)
        .collect())
}

fn json_chain_id_to_u64(value: &Value) -> Result<ChainId, PortError> {
    if let Some(n) = value.as_u64() {
        return Ok(n);
    }
    let s = value
        .as_str()
        .ok_or_else(|| PortError::Validation("chain id must be string or number".to_owned()))?;
    parse_chain_id(s).ok_or_else(|| PortError::Validation(format!("invalid chain id {s:?}")))
}

#[cfg(target_arch = "wasm32")]
async fn wasm_request(method: &str, params: Value) -> Result<Value, PortError> {
    use wasm_bindgen::JsCast;

    let provider = browser_provider()?;
    let request_fn = get_prop(&provider, "request")
        .ok()
        .and_then(|v| v.dyn_into::<js_sys::Function>().ok())
        .ok_or(PortError::NotImplemented(
            "window.ethereum.request is unavailable",
        ))?;

    let request = json!({
        "method": method,
        "params": params,
    });
    let request_js = serde_wasm_bindgen::to_value(&request)
        .map_err(|e| PortError::Transport(format!("failed to encode wasm request: {e}")))?;
    let promise_js = request_fn
        .call1(&provider, &request_js)
        .map_err(|e| PortError::Transport(format!("provider request dispatch failed: {e:?}")))?;
    let promise = promise_js.dyn_into::<js_sys::Promise>().map_err(|_| {
        PortError::Transport("provider request did not return Promise".to_owned())
    })?;
    let result_js = wasm_bindgen_futures::JsFuture::from(promise)
        .await
        .map_err(|e| js_rpc_error(&e))?;
    if result_js.is_null() || result_js.is_undefined() {
        return Ok(Value::Null);
    }
    serde_wasm_bindgen::from_value(result_js)
        .map_err(|e| PortError::Transport(format!("failed to decode wasm response: {e}")))
}

#[cfg(target_arch = "wasm32")]
fn js_rpc_error(err: &wasm_bindgen::JsValue) -> PortError {
    match serde_wasm_bindgen::from_value::<Value>(err.clone()) {
        Ok(value) if value.get("code").is_some() => rpc_error(&value),
        _ => {
            let code = get_prop(err, "code").ok().and_then(|c| c.as_f64());
            let message = get_prop(err, "message")
                .ok()
                .and_then(|m| m.as_string())
                .unwrap_or_else(|| format!("{err:?}"));
            match code {
                Some(code) => PortError::from_rpc(code as i64, message),
                None => PortError::Transport(format!("provider request rejected: {message}")),
            }
        }
    }
}

#[cfg(target_arch = "wasm32")]
fn browser_provider_available() -> bool {
    browser_provider().is_ok()
}

#[cfg(target_arch = "wasm32")]
fn browser_is_connected() -> bool {
    use wasm_bindgen::JsCast;

    let Ok(provider) = browser_provider() else {
        return false;
    };
    // Providers without isConnected() predate the method and are usable.
    get_prop(&provider, "isConnected")
        .ok()
        .and_then(|v| v.dyn_into::<js_sys::Function>().ok())
        .map_or(true, |f| {
            f.call0(&provider)
                .ok()
                .and_then(|v| v.as_bool())
                .unwrap_or(false)
        })
}

#[cfg(target_arch = "wasm32")]
fn browser_provider() -> Result<wasm_bindgen::JsValue, PortError> {
    let window =
        web_sys::window().ok_or_else(|| PortError::Transport("missing window".to_owned()))?;
    let provider = get_prop(&window.into(), "ethereum")?;
    if provider.is_null() || provider.is_undefined() {
        return Err(PortError::NotImplemented("window.ethereum missing"));
    }
    Ok(provider)
}

#[cfg(target_arch = "wasm32")]
fn get_prop(target: &wasm_bindgen::JsValue, key: &str) -> Result<wasm_bindgen::JsValue, PortError> {
    js_sys::Reflect::get(target, &wasm_bindgen::JsValue::from_str(key))
        .map_err(|e| PortError::Transport(format!("read provider property {key} failed: {e:?}")))
}

#[cfg(target_arch = "wasm32")]
fn js_chain_id_to_u64(value: &wasm_bindgen::JsValue) -> Result<ChainId, PortError> {
    if let Some(s) = value.as_string() {
        return parse_chain_id(&s)
            .ok_or_else(|| PortError::Validation(format!("invalid chain id {s:?}")));
    }
    if let Some(num) = value.as_f64() {
        return Ok(num as u64);
    }
    Err(PortError::Validation("invalid JS chain id".to_owned()))
}
