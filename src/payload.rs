//! On-ledger payload framing.
//!
//! Every relayed transaction carries `PAYLOAD_TAG || flag || data`. The flag
//! byte carries two independent bits:
//!
//! - bit 0 set: raw EVM transaction bytes, clear: JSON transaction object
//! - bit 7 set: `data` is zlib-compressed
//!
//! Indexers reading the ledger branch on the flag to decide whether to inflate
//! and how to interpret the content.

use thiserror::Error;
use tracing::{debug, warn};

use crate::codec::{zlib_compress, zlib_decompress, CodecError};

/// Protocol tag prefixed to every payload.
pub const PAYLOAD_TAG: &[u8] = b"kasplex";

/// Payloads larger than this many bytes are compressed.
pub const COMPRESS_THRESHOLD: usize = 2048;

pub const FLAG_RAW: u8 = 0x01;
pub const FLAG_COMPRESSED: u8 = 0x80;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("payload does not start with the kasplex tag")]
    MissingTag,
    #[error("payload has no flag byte")]
    MissingFlag,
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Compute the flag byte for the given content type and compression state.
pub fn flag_byte(is_json: bool, compressed: bool) -> u8 {
    let mut flag = if is_json { 0 } else { FLAG_RAW };
    if compressed {
        flag |= FLAG_COMPRESSED;
    }
    flag
}

/// Build the full transaction payload for `data`.
///
/// Compression only kicks in above [`COMPRESS_THRESHOLD`]; if the compressor
/// fails the data goes out uncompressed with the compression bit clear.
pub fn frame(data: &[u8], is_json: bool) -> Vec<u8> {
    let mut compressed = None;
    if data.len() > COMPRESS_THRESHOLD {
        match zlib_compress(data) {
            Ok(bytes) => {
                debug!(from = data.len(), to = bytes.len(), "payload compressed");
                compressed = Some(bytes);
            }
            Err(e) => warn!("payload compression failed, sending uncompressed: {}", e),
        }
    }

    let flag = flag_byte(is_json, compressed.is_some());
    let body = compressed.as_deref().unwrap_or(data);

    let mut out = Vec::with_capacity(PAYLOAD_TAG.len() + 1 + body.len());
    out.extend_from_slice(PAYLOAD_TAG);
    out.push(flag);
    out.extend_from_slice(body);
    out
}

/// A payload read back from the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPayload {
    pub is_json: bool,
    pub was_compressed: bool,
    pub data: Vec<u8>,
}

/// Inverse of [`frame`].
pub fn unframe(payload: &[u8]) -> Result<DecodedPayload, FrameError> {
    let rest = payload
        .strip_prefix(PAYLOAD_TAG)
        .ok_or(FrameError::MissingTag)?;
    let (&flag, body) = rest.split_first().ok_or(FrameError::MissingFlag)?;

    let was_compressed = flag & FLAG_COMPRESSED != 0;
    let data = if was_compressed {
        zlib_decompress(body)?
    } else {
        body.to_vec()
    };

    Ok(DecodedPayload {
        is_json: flag & FLAG_RAW == 0,
        was_compressed,
        data,
    })
}
