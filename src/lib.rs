//! Kasplex Relayer
//!
//! This crate implements an HTTP JSON-RPC endpoint that looks like an
//! Ethereum node to EVM tooling. `eth_sendRawTransaction` payloads are
//! embedded into Kaspa transactions signed by the relayer wallet; every
//! other call is proxied to a real EVM node.
//!
//! # Architecture
//!
//! ```text
//! Developer (MetaMask/Hardhat/ethers.js)
//!     |
//!     | eth_* JSON-RPC calls
//!     v
//! Kasplex Relayer (this crate) ----- eth_* (not sendRawTransaction) ----> EVM node
//!     |
//!     | getUtxosByAddresses / submitTransaction
//!     v
//! Kaspa node
//! ```
//!
//! # Modules
//!
//! - `config` - Environment and configuration management
//! - `server` - HTTP service lifecycle and request dispatch
//! - `methods` - JSON-RPC envelopes, eth_sendRawTransaction, proxying
//! - `wallet` - Signing identity and the transaction builder
//! - `kaspa` - Kaspa addresses, transactions, sighash, RPC client and pool
//! - `payload` - On-ledger payload framing
//! - `codec` - Hex, Keccak-256 and zlib helpers

pub mod codec;
pub mod config;
pub mod kaspa;
pub mod methods;
pub mod payload;
pub mod server;
pub mod wallet;
