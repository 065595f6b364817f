#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Read;
use std::sync::{Arc, Mutex};
use std::thread;

use alloy::json_abi::JsonAbi;
use alloy::primitives::Address;
use serde_json::Value;
use tiny_http::{Response, Server, StatusCode};
use tracing_subscriber::EnvFilter;

use wallet_session_adapters::{Eip1193Adapter, SessionAdapterConfig};
use wallet_session_core::{ChainDescriptor, ChainRegistry, SessionConfig, SessionNegotiator};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn account(n: u8) -> Address {
    Address::repeat_byte(n)
}

pub fn rinkeby() -> ChainDescriptor {
    ChainRegistry::builtin()
        .lookup(4u64)
        .cloned()
        .expect("rinkeby registered")
}

pub fn contract_address() -> Address {
    "0x000000000000000000000000000000000000BEEF"
        .parse()
        .expect("valid contract address")
}

pub fn mint_abi() -> JsonAbi {
    serde_json::from_str(
        r#"[{"type":"function","name":"mint","stateMutability":"payable",
             "inputs":[{"name":"count","type":"uint256"}],"outputs":[]}]"#,
    )
    .expect("valid abi")
}

pub fn wallet_on(chain_id: u64, grantable: Vec<Address>) -> Eip1193Adapter {
    let config = SessionAdapterConfig {
        default_chain_id: chain_id,
        ..SessionAdapterConfig::default()
    };
    Eip1193Adapter::deterministic(&config, grantable)
}

/// Negotiator targeting Rinkeby with `adapter` injected. The adapter clone
/// shares state with the injected one.
pub fn session(adapter: &Eip1193Adapter) -> SessionNegotiator<Eip1193Adapter> {
    init_tracing();
    SessionNegotiator::new(
        SessionConfig::new(rinkeby(), contract_address(), mint_abi()),
        Some(adapter.clone()),
    )
}

pub type RpcCalls = Arc<Mutex<Vec<String>>>;

/// JSON-RPC server answering each method with a fixed `(status, body)`.
/// Unknown methods get a 4200 error.
pub fn spawn_rpc_server(answers: HashMap<&'static str, (u16, Value)>) -> (String, RpcCalls) {
    let server = Server::http("127.0.0.1:0").expect("start server");
    let addr = format!("http://{}", server.server_addr());
    let calls: RpcCalls = Arc::default();
    let recorded = Arc::clone(&calls);

    thread::spawn(move || {
        for _ in 0..32 {
            let mut req = match server.recv() {
                Ok(r) => r,
                Err(_) => break,
            };
            let mut body = String::new();
            if req.as_reader().read_to_string(&mut body).is_err() {
                continue;
            }
            let request: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
            let method = request
                .get("method")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned();
            if let Ok(mut g) = recorded.lock() {
                g.push(method.clone());
            }

            let (code, payload) = answers.get(method.as_str()).cloned().unwrap_or_else(|| {
                (
                    200,
                    serde_json::json!({
                        "jsonrpc": "2.0",
                        "id": 1,
                        "error": { "code": 4200, "message": "unsupported method" }
                    }),
                )
            });
            let response =
                Response::from_string(payload.to_string()).with_status_code(StatusCode(code));
            let _ = req.respond(response);
        }
    });

    (addr, calls)
}

pub fn rpc_result(result: Value) -> (u16, Value) {
    (200, serde_json::json!({ "jsonrpc": "2.0", "id": 1, "result": result }))
}

pub fn rpc_error(error: Value) -> (u16, Value) {
    (200, serde_json::json!({ "jsonrpc": "2.0", "id": 1, "error": error }))
}

pub fn proxy_session(url: String) -> SessionNegotiator<Eip1193Adapter> {
    init_tracing();
    let config = SessionAdapterConfig {
        provider_proxy_url: Some(url),
        request_timeout_ms: 5_000,
        ..SessionAdapterConfig::default()
    };
    let adapter = Eip1193Adapter::detect(&config).expect("proxy provider detected");
    SessionNegotiator::new(
        SessionConfig::new(rinkeby(), contract_address(), mint_abi()),
        Some(adapter),
    )
}
