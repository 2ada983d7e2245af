use std::env;
use std::fmt;

use anyhow::{Context, Result};

use crate::kaspa::kas_to_sompi;
use crate::kaspa::pool::DEFAULT_POOL_SIZE;

/// Relayer configuration loaded from `RELAYER_*` environment variables.
#[derive(Clone)]
pub struct Config {
    /// EVM JSON-RPC endpoint that receives every proxied call
    pub eth_rpc_url: String,
    /// Kaspa node RPC endpoint (WebSocket)
    pub kas_rpc_url: String,
    /// HTTP listen port
    pub port: u16,
    /// Hex-encoded secp256k1 private key of the relayer wallet
    pub private_key: String,
    /// Kaspa address receiving every relayed transfer
    pub to_address: String,
    /// Kaspa RPC connection pool size
    pub pool_size: usize,
    /// Amount paid per relayed transaction, in sompi
    pub transfer_amount: u64,
    /// Kaspa address prefix, e.g. `kaspatest`
    pub network_prefix: String,
}

impl Config {
    /// Load configuration from the process environment.
    /// Call dotenvy before this to pick up an env file.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Resolve configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let eth_rpc_url = get_or("RELAYER_ETH_RPC", "http://127.0.0.1:8545");
        let kas_rpc_url = get_or("RELAYER_KAS_RPC", "ws://127.0.0.1:18210");

        let port: u16 = get_or("RELAYER_PORT", "8545")
            .parse()
            .context("RELAYER_PORT must be a valid u16")?;

        let private_key = lookup("RELAYER_PRIVATE_KEY")
            .context("RELAYER_PRIVATE_KEY must be set in environment or env file")?;

        let to_address = lookup("RELAYER_TO_ADDRESS")
            .context("RELAYER_TO_ADDRESS must be set in environment or env file")?;

        let pool_size: usize = get_or("RELAYER_POOL_SIZE", &DEFAULT_POOL_SIZE.to_string())
            .parse()
            .context("RELAYER_POOL_SIZE must be a valid usize")?;

        let transfer_amount = kas_to_sompi(&get_or("RELAYER_TRANSFER_AMOUNT", "30"))
            .context("RELAYER_TRANSFER_AMOUNT must be a KAS amount")?;

        let network_prefix = get_or("RELAYER_NETWORK_PREFIX", "kaspatest");

        Ok(Config {
            eth_rpc_url,
            kas_rpc_url,
            port,
            private_key,
            to_address,
            pool_size,
            transfer_amount,
            network_prefix,
        })
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("eth_rpc_url", &self.eth_rpc_url)
            .field("kas_rpc_url", &self.kas_rpc_url)
            .field("port", &self.port)
            .field("private_key", &"<redacted>")
            .field("to_address", &self.to_address)
            .field("pool_size", &self.pool_size)
            .field("transfer_amount", &self.transfer_amount)
            .field("network_prefix", &self.network_prefix)
            .finish()
    }
}
