//! Transaction builder and signer.
//!
//! `Wallet::transfer` turns an opaque payload into a signed Kaspa transaction:
//! greedy UTXO selection, payment and change outputs, payload framing,
//! per-input Schnorr signatures, submission over a pooled RPC session.

mod identity;

pub use identity::{IdentityError, SigningError, SigningIdentity};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

use crate::kaspa::types::RpcUtxosByAddressesEntry;
use crate::kaspa::{
    Address, AddressError, ClientError, Connector, LedgerConnection, Outpoint, PoolError,
    RpcClientPool, Transaction, TransactionInput, TransactionOutput, UtxoEntry,
};
use crate::payload;

/// Flat fee per relayed transaction, 0.0003 KAS.
pub const BASE_FEE_SOMPI: u64 = 30_000;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error("failed to fetch UTXOs: {0}")]
    FetchUtxos(#[source] ClientError),
    #[error("insufficient balance: {available} sompi available, {required} required")]
    InsufficientBalance { available: u64, required: u64 },
    #[error("invalid destination address: {0}")]
    Address(#[from] AddressError),
    #[error("transfer amount overflows")]
    AmountOverflow,
    #[error(transparent)]
    Signing(#[from] SigningError),
    #[error("transaction rejected: {0}")]
    Submit(#[source] ClientError),
}

/// Anything able to carry a payload onto the ledger.
#[async_trait]
pub trait TransactionRelay: Send + Sync {
    /// Pay `amount` sompi to `to_address` with `payload` attached and return
    /// the ledger transaction id.
    async fn transfer(
        &self,
        to_address: &str,
        amount: u64,
        payload: &[u8],
        is_json: bool,
    ) -> Result<String, TransferError>;
}

pub struct Wallet<C: Connector> {
    identity: SigningIdentity,
    pool: RpcClientPool<C>,
    fee: u64,
}

impl<C: Connector> Wallet<C> {
    pub fn new(identity: SigningIdentity, pool: RpcClientPool<C>) -> Self {
        Self {
            identity,
            pool,
            fee: BASE_FEE_SOMPI,
        }
    }

    pub fn address(&self) -> &Address {
        self.identity.address()
    }

    pub fn pool(&self) -> &RpcClientPool<C> {
        &self.pool
    }

    /// Shut down the session pool.
    pub async fn close(&self) {
        self.pool.shutdown().await;
    }

    async fn build_and_submit(
        &self,
        to_address: &str,
        amount: u64,
        data: &[u8],
        is_json: bool,
    ) -> Result<String, TransferError> {
        let required = amount
            .checked_add(self.fee)
            .ok_or(TransferError::AmountOverflow)?;

        // Released on every exit path when `conn` drops.
        let conn = self.pool.acquire().await?;

        let entries = conn
            .get_utxos_by_addresses(vec![self.identity.address().to_string()])
            .await
            .map_err(TransferError::FetchUtxos)?;
        let (inputs, selected) = select_utxos(&entries, required)?;

        let to = Address::decode(to_address, &self.identity.address().prefix)?;
        let mut outputs = vec![TransactionOutput {
            value: amount,
            script_public_key: to.pay_to_script(),
        }];
        let change = selected - required;
        if change > 0 {
            outputs.push(TransactionOutput {
                value: change,
                script_public_key: self.identity.address().pay_to_script(),
            });
        }

        let mut tx = Transaction::new(inputs, outputs, payload::frame(data, is_json));
        self.identity.sign_transaction(&mut tx)?;

        debug!(
            inputs = tx.inputs.len(),
            outputs = tx.outputs.len(),
            payload_len = tx.payload.len(),
            change,
            "Submitting Kaspa transaction"
        );
        let tx_id = conn
            .submit_transaction(tx.to_rpc(), false)
            .await
            .map_err(TransferError::Submit)?;

        info!("Transaction submitted: {}", tx_id);
        Ok(tx_id)
    }
}

#[async_trait]
impl<C: Connector> TransactionRelay for Wallet<C> {
    async fn transfer(
        &self,
        to_address: &str,
        amount: u64,
        payload: &[u8],
        is_json: bool,
    ) -> Result<String, TransferError> {
        self.build_and_submit(to_address, amount, payload, is_json)
            .await
    }
}

/// Take UTXOs in backend order until `required` is covered.
/// Entries that fail to convert are skipped.
fn select_utxos(
    entries: &[RpcUtxosByAddressesEntry],
    required: u64,
) -> Result<(Vec<TransactionInput>, u64), TransferError> {
    let mut inputs = Vec::new();
    let mut total = 0u64;

    for entry in entries {
        if total >= required {
            break;
        }
        let outpoint = match Outpoint::try_from(&entry.outpoint) {
            Ok(op) => op,
            Err(e) => {
                debug!("Skipping UTXO with bad outpoint: {}", e);
                continue;
            }
        };
        let utxo = match UtxoEntry::try_from(&entry.utxo_entry) {
            Ok(utxo) => utxo,
            Err(e) => {
                debug!("Skipping UTXO with bad entry: {}", e);
                continue;
            }
        };
        total = total.saturating_add(utxo.amount);
        inputs.push(TransactionInput::unsigned(outpoint, utxo));
    }

    if total < required {
        return Err(TransferError::InsufficientBalance {
            available: total,
            required,
        });
    }
    Ok((inputs, total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kaspa::types::{
        RpcOutpoint, RpcScriptPublicKey, RpcTransaction, RpcUtxoEntry,
    };
    use crate::kaspa::{AddressVersion, PoolConfig};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    const KEY: &str = "0202020202020202020202020202020202020202020202020202020202020202";

    #[derive(Default)]
    struct Ledger {
        utxos: Vec<RpcUtxosByAddressesEntry>,
        reject: Option<String>,
        submitted: Mutex<Vec<RpcTransaction>>,
        connects: AtomicUsize,
    }

    struct LedgerConn(Arc<Ledger>);

    #[async_trait]
    impl LedgerConnection for LedgerConn {
        async fn get_utxos_by_addresses(
            &self,
            _addresses: Vec<String>,
        ) -> Result<Vec<RpcUtxosByAddressesEntry>, ClientError> {
            Ok(self.0.utxos.clone())
        }

        async fn submit_transaction(
            &self,
            transaction: RpcTransaction,
            _allow_orphan: bool,
        ) -> Result<String, ClientError> {
            if let Some(reason) = &self.0.reject {
                return Err(ClientError::Rpc {
                    method: "submitTransaction",
                    message: reason.clone(),
                });
            }
            self.0.submitted.lock().unwrap().push(transaction);
            Ok("ab".repeat(32))
        }
    }

    struct LedgerConnector(Arc<Ledger>);

    #[async_trait]
    impl Connector for LedgerConnector {
        type Connection = LedgerConn;

        async fn connect(&self) -> Result<LedgerConn, ClientError> {
            self.0.connects.fetch_add(1, Ordering::SeqCst);
            Ok(LedgerConn(self.0.clone()))
        }
    }

    fn utxo(tx_byte: &str, amount: u64) -> RpcUtxosByAddressesEntry {
        RpcUtxosByAddressesEntry {
            address: None,
            outpoint: RpcOutpoint {
                transaction_id: tx_byte.repeat(32),
                index: 0,
            },
            utxo_entry: RpcUtxoEntry {
                amount,
                script_public_key: RpcScriptPublicKey {
                    version: 0,
                    script: "20".repeat(34),
                },
                block_daa_score: 1,
                is_coinbase: false,
            },
        }
    }

    fn wallet(ledger: Ledger) -> (Wallet<LedgerConnector>, Arc<Ledger>) {
        let ledger = Arc::new(ledger);
        let identity = SigningIdentity::from_hex(KEY, "kaspatest").unwrap();
        let pool = RpcClientPool::new(LedgerConnector(ledger.clone()), PoolConfig::default());
        (Wallet::new(identity, pool), ledger)
    }

    fn destination() -> String {
        Address::new("kaspatest", AddressVersion::PubKey, &[0x33; 32])
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn test_insufficient_balance_submits_nothing() {
        let (wallet, ledger) = wallet(Ledger {
            utxos: vec![utxo("01", 50_000), utxo("02", 60_000)],
            ..Ledger::default()
        });

        let err = wallet
            .transfer(&destination(), 100_000, b"data", false)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransferError::InsufficientBalance {
                available: 110_000,
                required: 130_000
            }
        ));
        assert!(ledger.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_change_output_carries_remainder() {
        let (wallet, ledger) = wallet(Ledger {
            utxos: vec![utxo("01", 100_000), utxo("02", 100_000), utxo("03", 100_000)],
            ..Ledger::default()
        });

        let tx_id = wallet
            .transfer(&destination(), 150_000, b"data", false)
            .await
            .unwrap();
        assert_eq!(tx_id, "ab".repeat(32));

        let submitted = ledger.submitted.lock().unwrap();
        let tx = &submitted[0];
        assert_eq!(tx.inputs.len(), 2);
        assert_eq!(tx.outputs.len(), 2);
        assert_eq!(tx.outputs[0].value, 150_000);
        assert_eq!(
            tx.outputs[0].script_public_key.script,
            format!("20{}ac", "33".repeat(32))
        );
        assert_eq!(tx.outputs[1].value, 200_000 - 150_000 - BASE_FEE_SOMPI);
        assert_eq!(
            tx.outputs[1].script_public_key.script,
            hex::encode(&wallet.address().pay_to_script().script)
        );
    }

    #[tokio::test]
    async fn test_exact_change_has_single_output() {
        let (wallet, ledger) = wallet(Ledger {
            utxos: vec![utxo("01", 150_000 + BASE_FEE_SOMPI)],
            ..Ledger::default()
        });

        wallet
            .transfer(&destination(), 150_000, b"data", true)
            .await
            .unwrap();
        let submitted = ledger.submitted.lock().unwrap();
        assert_eq!(submitted[0].outputs.len(), 1);
    }

    #[tokio::test]
    async fn test_unconvertible_utxos_are_skipped() {
        let (wallet, ledger) = wallet(Ledger {
            utxos: vec![utxo("zz", 500_000), utxo("07", 500_000)],
            ..Ledger::default()
        });

        wallet
            .transfer(&destination(), 100_000, b"data", false)
            .await
            .unwrap();
        let submitted = ledger.submitted.lock().unwrap();
        assert_eq!(submitted[0].inputs.len(), 1);
        assert_eq!(
            submitted[0].inputs[0].previous_outpoint.transaction_id,
            "07".repeat(32)
        );
    }

    #[tokio::test]
    async fn test_payload_and_signatures_are_attached() {
        let (wallet, ledger) = wallet(Ledger {
            utxos: vec![utxo("01", 40_000), utxo("02", 40_000), utxo("03", 40_000)],
            ..Ledger::default()
        });

        wallet
            .transfer(&destination(), 60_000, b"evm-tx", false)
            .await
            .unwrap();
        let submitted = ledger.submitted.lock().unwrap();
        let tx = &submitted[0];

        let mut expected = b"kasplex".to_vec();
        expected.push(0x01);
        expected.extend_from_slice(b"evm-tx");
        assert_eq!(tx.payload, hex::encode(expected));

        assert_eq!(tx.inputs.len(), 3);
        for input in &tx.inputs {
            let script = hex::decode(&input.signature_script).unwrap();
            assert_eq!(script.len(), 66);
            assert_eq!(script[65], 0x01);
        }
    }

    #[tokio::test]
    async fn test_bad_destination_is_rejected() {
        let (wallet, ledger) = wallet(Ledger {
            utxos: vec![utxo("01", 500_000)],
            ..Ledger::default()
        });

        let err = wallet
            .transfer("kaspa:qqqqqqqqqqqq", 1_000, b"", false)
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::Address(_)));
        assert!(ledger.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejection_still_releases_connection() {
        let (wallet, ledger) = wallet(Ledger {
            utxos: vec![utxo("01", 500_000)],
            reject: Some("already spent".to_string()),
            ..Ledger::default()
        });

        for _ in 0..3 {
            let err = wallet
                .transfer(&destination(), 1_000, b"x", false)
                .await
                .unwrap_err();
            assert!(matches!(err, TransferError::Submit(_)));
            assert!(err.to_string().contains("already spent"));
        }
        assert_eq!(ledger.connects.load(Ordering::SeqCst), 1);
        assert_eq!(wallet.pool().created(), 1);
    }
}
