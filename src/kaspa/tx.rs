//! Kaspa transaction model used by the builder, and conversion to and from
//! the RPC wire representation.

use super::types::{
    RpcOutpoint, RpcScriptPublicKey, RpcTransaction, RpcTransactionInput,
    RpcTransactionOutput, RpcUtxoEntry,
};
use crate::codec::CodecError;

pub const TX_VERSION: u16 = 0;
pub const SUBNETWORK_ID_NATIVE: [u8; 20] = [0u8; 20];
pub const MAX_SEQUENCE: u64 = u64::MAX;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptPublicKey {
    pub version: u16,
    pub script: Vec<u8>,
}

impl ScriptPublicKey {
    pub fn new(version: u16, script: Vec<u8>) -> Self {
        Self { version, script }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outpoint {
    pub transaction_id: [u8; 32],
    pub index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtxoEntry {
    pub amount: u64,
    pub script_public_key: ScriptPublicKey,
    pub block_daa_score: u64,
    pub is_coinbase: bool,
}

#[derive(Debug, Clone)]
pub struct TransactionInput {
    pub previous_outpoint: Outpoint,
    pub signature_script: Vec<u8>,
    pub sequence: u64,
    pub sig_op_count: u8,
    /// The output being spent; needed for the signature hash.
    pub utxo: UtxoEntry,
}

impl TransactionInput {
    /// Unsigned input spending `utxo` at `outpoint`.
    pub fn unsigned(outpoint: Outpoint, utxo: UtxoEntry) -> Self {
        Self {
            previous_outpoint: outpoint,
            signature_script: Vec::new(),
            sequence: MAX_SEQUENCE,
            sig_op_count: 1,
            utxo,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionOutput {
    pub value: u64,
    pub script_public_key: ScriptPublicKey,
}

#[derive(Debug, Clone)]
pub struct Transaction {
    pub version: u16,
    pub inputs: Vec<TransactionInput>,
    pub outputs: Vec<TransactionOutput>,
    pub lock_time: u64,
    pub subnetwork_id: [u8; 20],
    pub gas: u64,
    pub payload: Vec<u8>,
}

impl Transaction {
    pub fn new(
        inputs: Vec<TransactionInput>,
        outputs: Vec<TransactionOutput>,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            version: TX_VERSION,
            inputs,
            outputs,
            lock_time: 0,
            subnetwork_id: SUBNETWORK_ID_NATIVE,
            gas: 0,
            payload,
        }
    }

    pub fn to_rpc(&self) -> RpcTransaction {
        RpcTransaction {
            version: self.version,
            inputs: self
                .inputs
                .iter()
                .map(|input| RpcTransactionInput {
                    previous_outpoint: RpcOutpoint {
                        transaction_id: hex::encode(input.previous_outpoint.transaction_id),
                        index: input.previous_outpoint.index,
                    },
                    signature_script: hex::encode(&input.signature_script),
                    sequence: input.sequence,
                    sig_op_count: input.sig_op_count,
                })
                .collect(),
            outputs: self
                .outputs
                .iter()
                .map(|output| RpcTransactionOutput {
                    value: output.value,
                    script_public_key: RpcScriptPublicKey::from(&output.script_public_key),
                })
                .collect(),
            lock_time: self.lock_time,
            subnetwork_id: hex::encode(self.subnetwork_id),
            gas: self.gas,
            payload: hex::encode(&self.payload),
            mass: 0,
        }
    }
}

impl From<&ScriptPublicKey> for RpcScriptPublicKey {
    fn from(spk: &ScriptPublicKey) -> Self {
        Self {
            version: spk.version,
            script: hex::encode(&spk.script),
        }
    }
}

impl TryFrom<&RpcOutpoint> for Outpoint {
    type Error = CodecError;

    fn try_from(rpc: &RpcOutpoint) -> Result<Self, Self::Error> {
        let mut transaction_id = [0u8; 32];
        hex::decode_to_slice(&rpc.transaction_id, &mut transaction_id)?;
        Ok(Self {
            transaction_id,
            index: rpc.index,
        })
    }
}

impl TryFrom<&RpcUtxoEntry> for UtxoEntry {
    type Error = CodecError;

    fn try_from(rpc: &RpcUtxoEntry) -> Result<Self, Self::Error> {
        Ok(Self {
            amount: rpc.amount,
            script_public_key: ScriptPublicKey::new(
                rpc.script_public_key.version,
                hex::decode(&rpc.script_public_key.script)?,
            ),
            block_daa_score: rpc.block_daa_score,
            is_coinbase: rpc.is_coinbase,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outpoint_conversion() {
        let rpc = RpcOutpoint {
            transaction_id: "11".repeat(32),
            index: 3,
        };
        let op = Outpoint::try_from(&rpc).unwrap();
        assert_eq!(op.transaction_id, [0x11; 32]);
        assert_eq!(op.index, 3);

        let short = RpcOutpoint {
            transaction_id: "11".repeat(31),
            index: 0,
        };
        assert!(Outpoint::try_from(&short).is_err());
    }

    #[test]
    fn test_to_rpc_hex_encodes_bytes() {
        let spk = ScriptPublicKey::new(0, vec![0x20, 0xac]);
        let utxo = UtxoEntry {
            amount: 10,
            script_public_key: spk.clone(),
            block_daa_score: 1,
            is_coinbase: false,
        };
        let outpoint = Outpoint {
            transaction_id: [0xab; 32],
            index: 1,
        };
        let mut input = TransactionInput::unsigned(outpoint, utxo);
        input.signature_script = vec![0x41, 0x01];
        let tx = Transaction::new(
            vec![input],
            vec![TransactionOutput {
                value: 5,
                script_public_key: spk,
            }],
            b"kasplex".to_vec(),
        );

        let rpc = tx.to_rpc();
        assert_eq!(rpc.inputs[0].previous_outpoint.transaction_id, "ab".repeat(32));
        assert_eq!(rpc.inputs[0].signature_script, "4101");
        assert_eq!(rpc.inputs[0].sequence, u64::MAX);
        assert_eq!(rpc.outputs[0].script_public_key.script, "20ac");
        assert_eq!(rpc.subnetwork_id, "00".repeat(20));
        assert_eq!(rpc.payload, hex::encode(b"kasplex"));
    }
}
