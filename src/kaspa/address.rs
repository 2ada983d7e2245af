//! Kaspa addresses: `<prefix>:<base32(version || payload || checksum)>`.
//!
//! The checksum is the 40-bit cashaddr-style polymod, not BIP-173, so the
//! usual bech32 crates do not apply.

use std::fmt;

use thiserror::Error;

use super::tx::ScriptPublicKey;

const CHARSET: &[u8; 32] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";
const CHECKSUM_LEN: usize = 8;

const OP_DATA_32: u8 = 0x20;
const OP_DATA_33: u8 = 0x21;
const OP_EQUAL: u8 = 0x87;
const OP_BLAKE2B: u8 = 0xaa;
const OP_CHECKSIG_ECDSA: u8 = 0xab;
const OP_CHECKSIG: u8 = 0xac;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("address is missing the ':' prefix separator")]
    MissingPrefix,
    #[error("address prefix '{found}' does not match expected '{expected}'")]
    WrongPrefix { expected: String, found: String },
    #[error("invalid character '{0}' in address")]
    InvalidChar(char),
    #[error("address is too short")]
    TooShort,
    #[error("address checksum mismatch")]
    BadChecksum,
    #[error("unknown address version {0}")]
    UnknownVersion(u8),
    #[error("address payload has length {found}, expected {expected}")]
    BadLength { expected: usize, found: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressVersion {
    /// x-only Schnorr public key
    PubKey,
    /// compressed ECDSA public key
    PubKeyEcdsa,
    ScriptHash,
}

impl AddressVersion {
    fn byte(self) -> u8 {
        match self {
            AddressVersion::PubKey => 0,
            AddressVersion::PubKeyEcdsa => 1,
            AddressVersion::ScriptHash => 8,
        }
    }

    fn from_byte(b: u8) -> Result<Self, AddressError> {
        match b {
            0 => Ok(AddressVersion::PubKey),
            1 => Ok(AddressVersion::PubKeyEcdsa),
            8 => Ok(AddressVersion::ScriptHash),
            other => Err(AddressError::UnknownVersion(other)),
        }
    }

    fn payload_len(self) -> usize {
        match self {
            AddressVersion::PubKeyEcdsa => 33,
            _ => 32,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub prefix: String,
    pub version: AddressVersion,
    pub payload: Vec<u8>,
}

impl Address {
    pub fn new(
        prefix: &str,
        version: AddressVersion,
        payload: &[u8],
    ) -> Result<Self, AddressError> {
        if payload.len() != version.payload_len() {
            return Err(AddressError::BadLength {
                expected: version.payload_len(),
                found: payload.len(),
            });
        }
        Ok(Self {
            prefix: prefix.to_string(),
            version,
            payload: payload.to_vec(),
        })
    }

    /// Parse `s`, requiring its prefix to equal `expected_prefix`.
    pub fn decode(s: &str, expected_prefix: &str) -> Result<Self, AddressError> {
        let (prefix, data) = s.split_once(':').ok_or(AddressError::MissingPrefix)?;
        if prefix != expected_prefix {
            return Err(AddressError::WrongPrefix {
                expected: expected_prefix.to_string(),
                found: prefix.to_string(),
            });
        }

        let five_bit = data
            .chars()
            .map(|c| {
                CHARSET
                    .iter()
                    .position(|&x| x as char == c)
                    .map(|p| p as u8)
                    .ok_or(AddressError::InvalidChar(c))
            })
            .collect::<Result<Vec<u8>, _>>()?;
        if five_bit.len() <= CHECKSUM_LEN {
            return Err(AddressError::TooShort);
        }

        let (payload_u5, checksum_u5) = five_bit.split_at(five_bit.len() - CHECKSUM_LEN);
        let mut checksum_bytes = [0u8; 8];
        checksum_bytes[3..].copy_from_slice(&conv5to8(checksum_u5));
        if checksum(payload_u5, prefix) != u64::from_be_bytes(checksum_bytes) {
            return Err(AddressError::BadChecksum);
        }

        let bytes = conv5to8(payload_u5);
        let (&version, payload) = bytes.split_first().ok_or(AddressError::TooShort)?;
        Self::new(prefix, AddressVersion::from_byte(version)?, payload)
    }

    /// The locking script paying to this address.
    pub fn pay_to_script(&self) -> ScriptPublicKey {
        let mut script = Vec::with_capacity(self.payload.len() + 3);
        match self.version {
            AddressVersion::PubKey => {
                script.push(OP_DATA_32);
                script.extend_from_slice(&self.payload);
                script.push(OP_CHECKSIG);
            }
            AddressVersion::PubKeyEcdsa => {
                script.push(OP_DATA_33);
                script.extend_from_slice(&self.payload);
                script.push(OP_CHECKSIG_ECDSA);
            }
            AddressVersion::ScriptHash => {
                script.push(OP_BLAKE2B);
                script.push(OP_DATA_32);
                script.extend_from_slice(&self.payload);
                script.push(OP_EQUAL);
            }
        }
        ScriptPublicKey::new(0, script)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut raw = Vec::with_capacity(self.payload.len() + 1);
        raw.push(self.version.byte());
        raw.extend_from_slice(&self.payload);

        let payload_u5 = conv8to5(&raw);
        let checksum = checksum(&payload_u5, &self.prefix).to_be_bytes();
        let checksum_u5 = conv8to5(&checksum[3..]);

        let encoded: String = payload_u5
            .iter()
            .chain(checksum_u5.iter())
            .map(|&c| CHARSET[c as usize] as char)
            .collect();
        write!(f, "{}:{}", self.prefix, encoded)
    }
}

fn polymod(values: impl Iterator<Item = u8>) -> u64 {
    let mut c = 1u64;
    for d in values {
        let c0 = c >> 35;
        c = ((c & 0x07_ffff_ffff) << 5) ^ d as u64;
        if c0 & 0x01 != 0 {
            c ^= 0x98_f2bc_8e61;
        }
        if c0 & 0x02 != 0 {
            c ^= 0x79_b76d_99e2;
        }
        if c0 & 0x04 != 0 {
            c ^= 0xf3_3e5f_b3c4;
        }
        if c0 & 0x08 != 0 {
            c ^= 0xae_2eab_e2a8;
        }
        if c0 & 0x10 != 0 {
            c ^= 0x1e_4f43_e470;
        }
    }
    c ^ 1
}

fn checksum(payload_u5: &[u8], prefix: &str) -> u64 {
    polymod(
        prefix
            .bytes()
            .map(|c| c & 0x1f)
            .chain(std::iter::once(0))
            .chain(payload_u5.iter().copied())
            .chain([0u8; CHECKSUM_LEN]),
    )
}

fn conv8to5(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * 8 / 5 + 1);
    let mut buff = 0u16;
    let mut bits = 0;
    for &b in data {
        buff = (buff << 8) | b as u16;
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push((buff >> bits) as u8);
            buff &= (1 << bits) - 1;
        }
    }
    if bits > 0 {
        out.push((buff << (5 - bits)) as u8);
    }
    out
}

fn conv5to8(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * 5 / 8);
    let mut buff = 0u16;
    let mut bits = 0;
    for &b in data {
        buff = (buff << 5) | b as u16;
        bits += 5;
        while bits >= 8 {
            bits -= 8;
            out.push((buff >> bits) as u8);
            buff &= (1 << bits) - 1;
        }
    }
    out
}
