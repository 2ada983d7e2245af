//! Wire types of the Kaspa node's JSON wRPC interface.
//!
//! Byte fields travel as hex strings. A script public key is a single hex
//! string: the big-endian two-byte script version followed by the script.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Outpoint as returned by the Kaspa node
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RpcOutpoint {
    /// Hex-encoded transaction id
    pub transaction_id: String,
    pub index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcScriptPublicKey {
    pub version: u16,
    /// Hex-encoded script bytes
    pub script: String,
}

impl Serialize for RpcScriptPublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let version = hex::encode(self.version.to_be_bytes());
        serializer.serialize_str(&format!("{}{}", version, self.script))
    }
}

impl<'de> Deserialize<'de> for RpcScriptPublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw.len() < 4 || !raw.is_char_boundary(4) {
            return Err(D::Error::custom(
                "script public key is shorter than its version prefix",
            ));
        }
        let (version, script) = raw.split_at(4);
        let mut version_bytes = [0u8; 2];
        hex::decode_to_slice(version, &mut version_bytes).map_err(D::Error::custom)?;
        Ok(Self {
            version: u16::from_be_bytes(version_bytes),
            script: script.to_string(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RpcUtxoEntry {
    pub amount: u64,
    pub script_public_key: RpcScriptPublicKey,
    #[serde(default)]
    pub block_daa_score: u64,
    #[serde(default)]
    pub is_coinbase: bool,
}

/// One entry of a getUtxosByAddresses response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RpcUtxosByAddressesEntry {
    #[serde(default)]
    pub address: Option<String>,
    pub outpoint: RpcOutpoint,
    pub utxo_entry: RpcUtxoEntry,
}

#[derive(Debug, Clone, Serialize)]
pub struct GetUtxosByAddressesRequest {
    pub addresses: Vec<String>,
}

/// Response from getUtxosByAddresses
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetUtxosByAddressesResponse {
    #[serde(default)]
    pub entries: Vec<RpcUtxosByAddressesEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RpcTransactionInput {
    pub previous_outpoint: RpcOutpoint,
    /// Hex-encoded signature script
    pub signature_script: String,
    pub sequence: u64,
    pub sig_op_count: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RpcTransactionOutput {
    pub value: u64,
    pub script_public_key: RpcScriptPublicKey,
}

/// Transaction in the shape submitTransaction expects
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RpcTransaction {
    pub version: u16,
    pub inputs: Vec<RpcTransactionInput>,
    pub outputs: Vec<RpcTransactionOutput>,
    pub lock_time: u64,
    /// Hex-encoded 20-byte subnetwork id
    pub subnetwork_id: String,
    pub gas: u64,
    /// Hex-encoded payload
    pub payload: String,
    /// Left at zero; the node computes the mass itself.
    #[serde(default)]
    pub mass: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubmitTransactionRequest {
    pub transaction: RpcTransaction,
    pub allow_orphan: bool,
}

/// Response from submitTransaction
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitTransactionResponse {
    pub transaction_id: String,
}
