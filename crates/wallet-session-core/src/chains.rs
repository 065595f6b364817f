use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use alloy::primitives::ChainId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawChainDescriptor", into = "RawChainDescriptor")]
pub struct ChainDescriptor {
    name: String,
    decimal_id: ChainId,
    hex_id: String,
    rpc_url: Option<String>,
}

impl ChainDescriptor {
    pub fn new(name: impl Into<String>, decimal_id: ChainId, rpc_url: Option<&str>) -> Self {
        Self {
            name: name.into(),
            decimal_id,
            hex_id: format!("{decimal_id:#x}"),
            rpc_url: rpc_url.map(str::to_owned),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn decimal_id(&self) -> ChainId {
        self.decimal_id
    }

    pub fn hex_id(&self) -> &str {
        &self.hex_id
    }

    pub fn rpc_url(&self) -> Option<&str> {
        self.rpc_url.as_deref()
    }
}

impl fmt::Display for ChainDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.decimal_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawChainDescriptor {
    name: String,
    decimal_id: ChainId,
    #[serde(default)]
    hex_id: Option<String>,
    #[serde(default)]
    rpc_url: Option<String>,
}

impl TryFrom<RawChainDescriptor> for ChainDescriptor {
    type Error = String;

    fn try_from(raw: RawChainDescriptor) -> Result<Self, Self::Error> {
        let chain = ChainDescriptor::new(raw.name, raw.decimal_id, raw.rpc_url.as_deref());
        match raw.hex_id {
            Some(hex) if !hex.eq_ignore_ascii_case(chain.hex_id()) => Err(format!(
                "hexId {hex} does not encode decimalId {}",
                chain.decimal_id()
            )),
            _ => Ok(chain),
        }
    }
}

impl From<ChainDescriptor> for RawChainDescriptor {
    fn from(chain: ChainDescriptor) -> Self {
        Self {
            name: chain.name,
            decimal_id: chain.decimal_id,
            hex_id: Some(chain.hex_id),
            rpc_url: chain.rpc_url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainRef {
    Decimal(ChainId),
    Text(String),
}

impl ChainRef {
    pub fn normalize(&self) -> Option<ChainId> {
        match self {
            ChainRef::Decimal(id) => Some(*id),
            ChainRef::Text(raw) => parse_chain_id(raw),
        }
    }
}

impl From<ChainId> for ChainRef {
    fn from(id: ChainId) -> Self {
        ChainRef::Decimal(id)
    }
}

impl From<&str> for ChainRef {
    fn from(raw: &str) -> Self {
        ChainRef::Text(raw.to_owned())
    }
}

impl From<String> for ChainRef {
    fn from(raw: String) -> Self {
        ChainRef::Text(raw)
    }
}

impl fmt::Display for ChainRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainRef::Decimal(id) => write!(f, "{id}"),
            ChainRef::Text(raw) => f.write_str(raw),
        }
    }
}

pub fn parse_chain_id(raw: &str) -> Option<ChainId> {
    let raw = raw.trim();
    if let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        ChainId::from_str_radix(hex, 16).ok()
    } else {
        raw.parse().ok()
    }
}

static BUILTIN: LazyLock<ChainRegistry> = LazyLock::new(|| {
    ChainRegistry::from_chains([
        ChainDescriptor::new("Ethereum Mainnet", 1, None),
        ChainDescriptor::new(
            "Ropsten Testnet",
            3,
            Some("https://ropsten.infura.io/v3/9aa3d95b3bc440fa88ea12eaa4456161"),
        ),
        ChainDescriptor::new(
            "Rinkeby Testnet",
            4,
            Some("https://rinkeby.infura.io/v3/9aa3d95b3bc440fa88ea12eaa4456161"),
        ),
        ChainDescriptor::new(
            "Goerli Testnet",
            5,
            Some("https://goerli.infura.io/v3/9aa3d95b3bc440fa88ea12eaa4456161"),
        ),
        ChainDescriptor::new(
            "Kovan Testnet",
            42,
            Some("https://kovan.infura.io/v3/9aa3d95b3bc440fa88ea12eaa4456161"),
        ),
        ChainDescriptor::new("Binance Mainnet", 56, Some("https://bsc-dataseed.binance.org/")),
        ChainDescriptor::new(
            "Binance Testnet",
            97,
            Some("https://data-seed-prebsc-1-s1.binance.org:8545/"),
        ),
        ChainDescriptor::new("Matic", 137, Some("https://rpc-mainnet.maticvigil.com/")),
    ])
});

#[derive(Debug, Clone, Default)]
pub struct ChainRegistry {
    chains: HashMap<ChainId, ChainDescriptor>,
}

impl ChainRegistry {
    pub fn builtin() -> &'static ChainRegistry {
        &BUILTIN
    }

    pub fn from_chains(chains: impl IntoIterator<Item = ChainDescriptor>) -> Self {
        Self {
            chains: chains
                .into_iter()
                .map(|chain| (chain.decimal_id(), chain))
                .collect(),
        }
    }

    pub fn with_chain(mut self, chain: ChainDescriptor) -> Self {
        self.chains.insert(chain.decimal_id(), chain);
        self
    }

    pub fn lookup(&self, chain: impl Into<ChainRef>) -> Option<&ChainDescriptor> {
        let chain = chain.into();
        chain.normalize().and_then(|id| self.chains.get(&id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChainDescriptor> {
        self.chains.values()
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}
