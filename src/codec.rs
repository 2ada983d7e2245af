//! Hex, hash and compression helpers shared by the dispatcher and the
//! transaction builder.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use sha3::{Digest, Keccak256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("compression failed: {0}")]
    Compress(std::io::Error),
    #[error("decompression failed: {0}")]
    Decompress(std::io::Error),
}

/// Decode a hex string with an optional `0x` prefix.
/// Odd-length input is treated as if it had a leading zero nibble.
pub fn decode_hex(input: &str) -> Result<Vec<u8>, CodecError> {
    let digits = input.strip_prefix("0x").unwrap_or(input);
    if digits.len() % 2 != 0 {
        return Ok(hex::decode(format!("0{}", digits))?);
    }
    Ok(hex::decode(digits)?)
}

/// Keccak-256 digest of `data`.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Keccak256::digest(data));
    out
}

/// Render bytes as a `0x`-prefixed lowercase hex string.
pub fn to_hex_prefixed(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

pub fn zlib_compress(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).map_err(CodecError::Compress)?;
    encoder.finish().map_err(CodecError::Compress)
}

pub fn zlib_decompress(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    ZlibDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(CodecError::Decompress)?;
    Ok(out)
}
