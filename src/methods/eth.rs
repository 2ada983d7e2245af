use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::codec::{decode_hex, keccak256, to_hex_prefixed, CodecError};
use crate::wallet::{TransactionRelay, TransferError};

/// JSON-RPC error codes returned by `eth_sendRawTransaction`.
pub const CODE_EMPTY_PARAMS: i64 = -1;
pub const CODE_INVALID_PARAMS: i64 = -2;
pub const CODE_RELAY_FAILED: i64 = -3;

#[derive(Debug, Error)]
pub enum SendRawTransactionError {
    #[error("data error: params is empty")]
    EmptyParams,
    #[error(transparent)]
    Decode(#[from] CodecError),
    #[error("unsupported params shape: expected hex string or transaction object, got {0}")]
    UnsupportedParamsShape(&'static str),
    #[error("transaction object has no string hash field")]
    MissingHash,
    #[error("failed to serialize transaction object: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error(transparent)]
    Transfer(#[from] TransferError),
}

impl SendRawTransactionError {
    pub fn code(&self) -> i64 {
        match self {
            Self::EmptyParams => CODE_EMPTY_PARAMS,
            Self::Decode(_) | Self::UnsupportedParamsShape(_) => CODE_INVALID_PARAMS,
            Self::MissingHash | Self::Serialize(_) | Self::Transfer(_) => CODE_RELAY_FAILED,
        }
    }
}

/// The two accepted shapes of `params[0]`.
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadSource {
    /// Hex-encoded signed EVM transaction
    RawHex(String),
    /// Transaction object as returned by `eth_getTransactionByHash`
    Structured(Map<String, Value>),
}

impl PayloadSource {
    pub fn from_param(param: &Value) -> Result<Self, SendRawTransactionError> {
        match param {
            Value::String(s) => Ok(Self::RawHex(s.clone())),
            Value::Object(obj) => Ok(Self::Structured(obj.clone())),
            other => Err(SendRawTransactionError::UnsupportedParamsShape(
                json_type_name(other),
            )),
        }
    }
}

/// Bytes to embed on the ledger plus the hash reported back to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedPayload {
    pub data: Vec<u8>,
    pub hash: String,
    pub is_json: bool,
}

impl TryFrom<PayloadSource> for PreparedPayload {
    type Error = SendRawTransactionError;

    fn try_from(source: PayloadSource) -> Result<Self, Self::Error> {
        match source {
            PayloadSource::RawHex(hex_tx) => {
                let data = decode_hex(&hex_tx)?;
                let hash = to_hex_prefixed(&keccak256(&data));
                Ok(Self {
                    data,
                    hash,
                    is_json: false,
                })
            }
            PayloadSource::Structured(obj) => {
                let hash = obj
                    .get("hash")
                    .and_then(Value::as_str)
                    .ok_or(SendRawTransactionError::MissingHash)?
                    .to_string();
                // serde_json maps are ordered by key, which keeps the encoding canonical
                let data = serde_json::to_vec(&obj)?;
                Ok(Self {
                    data,
                    hash,
                    is_json: true,
                })
            }
        }
    }
}

/// Handler for eth_sendRawTransaction
///
/// Relays the transaction payload to the ledger and returns the EVM-style
/// transaction hash, not the ledger transaction id.
pub async fn send_raw_transaction(
    relay: &dyn TransactionRelay,
    to_address: &str,
    amount: u64,
    params: &[Value],
) -> Result<Value, SendRawTransactionError> {
    let first = params.first().ok_or(SendRawTransactionError::EmptyParams)?;
    let source = PayloadSource::from_param(first).inspect_err(|e| warn!("{}", e))?;
    let prepared = PreparedPayload::try_from(source)?;

    debug!(
        "eth_sendRawTransaction: hash={}, is_json={}, {} bytes",
        prepared.hash,
        prepared.is_json,
        prepared.data.len()
    );

    let tx_id = relay
        .transfer(to_address, amount, &prepared.data, prepared.is_json)
        .await?;

    info!("Relayed {} as Kaspa transaction {}", prepared.hash, tx_id);
    Ok(Value::String(prepared.hash))
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
