//! Schnorr signature hash for Kaspa transaction inputs.
//!
//! Only `SigHashAll` is produced by the relayer. The per-transaction
//! sub-hashes (previous outputs, sequences, sig-op counts, outputs, payload)
//! are identical for every input, so they are computed once and cached in
//! [`SigHashReusedValues`]. The cache must be used with a single transaction
//! and inputs must be hashed in ascending index order.

use blake2b_simd::{Params, State};
use thiserror::Error;

use super::tx::{Outpoint, ScriptPublicKey, Transaction, TransactionOutput, SUBNETWORK_ID_NATIVE};

pub const SIG_HASH_ALL: u8 = 0x01;

const SIGNING_HASH_KEY: &[u8] = b"TransactionSigningHash";
const ZERO_HASH: [u8; 32] = [0u8; 32];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SigHashError {
    #[error("input index {index} out of range ({count} inputs)")]
    InputOutOfRange { index: usize, count: usize },
}

/// Blake2b-256 keyed with the transaction signing domain.
struct SigningHasher(State);

impl SigningHasher {
    fn new() -> Self {
        Self(Params::new().hash_length(32).key(SIGNING_HASH_KEY).to_state())
    }

    fn update(&mut self, data: &[u8]) -> &mut Self {
        self.0.update(data);
        self
    }

    fn write_u8(&mut self, v: u8) -> &mut Self {
        self.update(&[v])
    }

    fn write_u16(&mut self, v: u16) -> &mut Self {
        self.update(&v.to_le_bytes())
    }

    fn write_u32(&mut self, v: u32) -> &mut Self {
        self.update(&v.to_le_bytes())
    }

    fn write_u64(&mut self, v: u64) -> &mut Self {
        self.update(&v.to_le_bytes())
    }

    fn write_var_bytes(&mut self, data: &[u8]) -> &mut Self {
        self.write_u64(data.len() as u64).update(data)
    }

    fn write_outpoint(&mut self, outpoint: &Outpoint) -> &mut Self {
        self.update(&outpoint.transaction_id).write_u32(outpoint.index)
    }

    fn write_script_public_key(&mut self, spk: &ScriptPublicKey) -> &mut Self {
        self.write_u16(spk.version).write_var_bytes(&spk.script)
    }

    fn write_output(&mut self, output: &TransactionOutput) -> &mut Self {
        self.write_u64(output.value)
            .write_script_public_key(&output.script_public_key)
    }

    fn finalize(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out.copy_from_slice(self.0.finalize().as_bytes());
        out
    }
}

/// Sub-hashes shared by all inputs of one transaction.
#[derive(Debug, Default)]
pub struct SigHashReusedValues {
    previous_outputs_hash: Option<[u8; 32]>,
    sequences_hash: Option<[u8; 32]>,
    sig_op_counts_hash: Option<[u8; 32]>,
    outputs_hash: Option<[u8; 32]>,
    payload_hash: Option<[u8; 32]>,
}

impl SigHashReusedValues {
    pub fn new() -> Self {
        Self::default()
    }

    fn previous_outputs_hash(&mut self, tx: &Transaction) -> [u8; 32] {
        *self.previous_outputs_hash.get_or_insert_with(|| {
            let mut hasher = SigningHasher::new();
            for input in &tx.inputs {
                hasher.write_outpoint(&input.previous_outpoint);
            }
            hasher.finalize()
        })
    }

    fn sequences_hash(&mut self, tx: &Transaction) -> [u8; 32] {
        *self.sequences_hash.get_or_insert_with(|| {
            let mut hasher = SigningHasher::new();
            for input in &tx.inputs {
                hasher.write_u64(input.sequence);
            }
            hasher.finalize()
        })
    }

    fn sig_op_counts_hash(&mut self, tx: &Transaction) -> [u8; 32] {
        *self.sig_op_counts_hash.get_or_insert_with(|| {
            let mut hasher = SigningHasher::new();
            for input in &tx.inputs {
                hasher.write_u8(input.sig_op_count);
            }
            hasher.finalize()
        })
    }

    fn outputs_hash(&mut self, tx: &Transaction) -> [u8; 32] {
        *self.outputs_hash.get_or_insert_with(|| {
            let mut hasher = SigningHasher::new();
            for output in &tx.outputs {
                hasher.write_output(output);
            }
            hasher.finalize()
        })
    }

    fn payload_hash(&mut self, tx: &Transaction) -> [u8; 32] {
        if tx.subnetwork_id == SUBNETWORK_ID_NATIVE && tx.payload.is_empty() {
            return ZERO_HASH;
        }
        *self.payload_hash.get_or_insert_with(|| {
            let mut hasher = SigningHasher::new();
            hasher.write_var_bytes(&tx.payload);
            hasher.finalize()
        })
    }
}

/// `SigHashAll` Schnorr signature hash of input `index`.
pub fn calc_schnorr_signature_hash(
    tx: &Transaction,
    index: usize,
    reused: &mut SigHashReusedValues,
) -> Result<[u8; 32], SigHashError> {
    let input = tx.inputs.get(index).ok_or(SigHashError::InputOutOfRange {
        index,
        count: tx.inputs.len(),
    })?;

    let mut hasher = SigningHasher::new();
    hasher
        .write_u16(tx.version)
        .update(&reused.previous_outputs_hash(tx))
        .update(&reused.sequences_hash(tx))
        .update(&reused.sig_op_counts_hash(tx))
        .write_outpoint(&input.previous_outpoint)
        .write_script_public_key(&input.utxo.script_public_key)
        .write_u64(input.utxo.amount)
        .write_u64(input.sequence)
        .write_u8(input.sig_op_count)
        .update(&reused.outputs_hash(tx))
        .write_u64(tx.lock_time)
        .update(&tx.subnetwork_id)
        .write_u64(tx.gas)
        .update(&reused.payload_hash(tx))
        .write_u8(SIG_HASH_ALL);

    Ok(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kaspa::tx::{TransactionInput, UtxoEntry};

    fn sample_tx(inputs: usize, payload: &[u8]) -> Transaction {
        let spk = ScriptPublicKey::new(0, vec![0x20; 34]);
        let inputs = (0..inputs)
            .map(|i| {
                TransactionInput::unsigned(
                    Outpoint {
                        transaction_id: [i as u8; 32],
                        index: i as u32,
                    },
                    UtxoEntry {
                        amount: 1_000 + i as u64,
                        script_public_key: spk.clone(),
                        block_daa_score: 0,
                        is_coinbase: false,
                    },
                )
            })
            .collect();
        let outputs = vec![TransactionOutput {
            value: 500,
            script_public_key: spk,
        }];
        Transaction::new(inputs, outputs, payload.to_vec())
    }

    #[test]
    fn test_sighash_is_deterministic_and_per_input() {
        let tx = sample_tx(3, b"kasplex\x01data");

        let mut reused = SigHashReusedValues::new();
        let hashes: Vec<_> = (0..3)
            .map(|i| calc_schnorr_signature_hash(&tx, i, &mut reused).unwrap())
            .collect();
        assert_ne!(hashes[0], hashes[1]);
        assert_ne!(hashes[1], hashes[2]);

        // a fresh cache yields the same digests
        let mut fresh = SigHashReusedValues::new();
        assert_eq!(
            calc_schnorr_signature_hash(&tx, 2, &mut fresh).unwrap(),
            hashes[2]
        );
    }

    #[test]
    fn test_sighash_commits_to_payload_and_outputs() {
        let a = sample_tx(1, b"one");
        let b = sample_tx(1, b"two");
        let mut c = sample_tx(1, b"one");
        c.outputs[0].value += 1;

        let digest = |tx: &Transaction| {
            calc_schnorr_signature_hash(tx, 0, &mut SigHashReusedValues::new()).unwrap()
        };
        assert_ne!(digest(&a), digest(&b));
        assert_ne!(digest(&a), digest(&c));
    }

    #[test]
    fn test_sighash_ignores_signature_scripts() {
        let tx = sample_tx(2, b"p");
        let mut signed = tx.clone();
        signed.inputs[0].signature_script = vec![0x41; 66];

        let mut r1 = SigHashReusedValues::new();
        let mut r2 = SigHashReusedValues::new();
        assert_eq!(
            calc_schnorr_signature_hash(&tx, 1, &mut r1).unwrap(),
            calc_schnorr_signature_hash(&signed, 1, &mut r2).unwrap()
        );
    }

    fn pay_to(key_byte: u8) -> ScriptPublicKey {
        let mut script = vec![0x20];
        script.extend_from_slice(&[key_byte; 32]);
        script.push(0xac);
        ScriptPublicKey::new(0, script)
    }

    /// Two inputs of the same key paying one destination plus change.
    fn fixed_tx(payload: &[u8]) -> Transaction {
        let own = pay_to(0x22);
        let spend = |txid: u8, index: u32, amount: u64| {
            TransactionInput::unsigned(
                Outpoint {
                    transaction_id: [txid; 32],
                    index,
                },
                UtxoEntry {
                    amount,
                    script_public_key: own.clone(),
                    block_daa_score: 0,
                    is_coinbase: false,
                },
            )
        };
        Transaction::new(
            vec![spend(0x11, 0, 100_000_000), spend(0x33, 1, 50_000_000)],
            vec![
                TransactionOutput {
                    value: 120_000_000,
                    script_public_key: pay_to(0x44),
                },
                TransactionOutput {
                    value: 29_970_000,
                    script_public_key: own,
                },
            ],
            payload.to_vec(),
        )
    }

    #[test]
    fn test_sighash_fixed_vectors() {
        let tx = fixed_tx(b"kasplex\x01hello");
        let mut reused = SigHashReusedValues::new();
        assert_eq!(
            hex::encode(calc_schnorr_signature_hash(&tx, 0, &mut reused).unwrap()),
            "9fa366adea50bbf2d6a42460bf473cab59bbf376d9e2b4bbcf3f4b96eb8a25c3"
        );
        assert_eq!(
            hex::encode(calc_schnorr_signature_hash(&tx, 1, &mut reused).unwrap()),
            "3c78d533f18ab3e6a45b0e0d2218cc55a55922bc45ef368ed0f5c4ac72faaa95"
        );

        // native subnetwork with no payload hashes the payload as zero
        let bare = fixed_tx(b"");
        assert_eq!(
            hex::encode(calc_schnorr_signature_hash(&bare, 0, &mut SigHashReusedValues::new()).unwrap()),
            "6394c8c804e6404a8f1730bfe9cb81204708feb65fe0671e42a537af885bb3e9"
        );
    }

    #[test]
    fn test_sighash_out_of_range() {
        let tx = sample_tx(1, b"");
        assert_eq!(
            calc_schnorr_signature_hash(&tx, 1, &mut SigHashReusedValues::new()),
            Err(SigHashError::InputOutOfRange { index: 1, count: 1 })
        );
    }
}
