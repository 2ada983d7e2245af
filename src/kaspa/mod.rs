pub mod address;
pub mod amount;
pub mod client;
pub mod pool;
pub mod sighash;
pub mod tx;
pub mod types;

pub use address::{Address, AddressError, AddressVersion};
pub use amount::{kas_to_sompi, AmountError, SOMPI_PER_KAS};
pub use client::{ClientError, Connector, KaspaClient, LedgerConnection, WsConnector};
pub use pool::{PoolConfig, PoolError, PooledConnection, RpcClientPool};
pub use sighash::{calc_schnorr_signature_hash, SigHashReusedValues, SIG_HASH_ALL};
pub use tx::{Outpoint, ScriptPublicKey, Transaction, TransactionInput, TransactionOutput, UtxoEntry};
