pub mod config;
pub mod eip1193;

pub use config::SessionAdapterConfig;
pub use eip1193::Eip1193Adapter;
