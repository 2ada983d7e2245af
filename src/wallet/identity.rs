use std::fmt;

use secp256k1::{schnorr, All, Keypair, Message, Secp256k1, XOnlyPublicKey};
use thiserror::Error;

use crate::kaspa::sighash::SigHashError;
use crate::kaspa::{
    calc_schnorr_signature_hash, Address, AddressError, AddressVersion, SigHashReusedValues,
    Transaction, SIG_HASH_ALL,
};

const OP_PUSHDATA1: u8 = 0x4c;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("private key is not valid hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("invalid secp256k1 private key: {0}")]
    Key(#[from] secp256k1::Error),
    #[error(transparent)]
    Address(#[from] AddressError),
}

#[derive(Debug, Error)]
#[error("failed to sign input {index}: {source}")]
pub struct SigningError {
    pub index: usize,
    #[source]
    pub source: SigHashError,
}

/// The relayer's signing key and the Kaspa address it controls.
pub struct SigningIdentity {
    secp: Secp256k1<All>,
    keypair: Keypair,
    public_key: XOnlyPublicKey,
    address: Address,
}

impl SigningIdentity {
    /// Build the identity from a hex private key for the given network prefix.
    pub fn from_hex(private_key: &str, network_prefix: &str) -> Result<Self, IdentityError> {
        let secret = hex::decode(private_key.trim().trim_start_matches("0x"))?;
        let secp = Secp256k1::new();
        let keypair = Keypair::from_seckey_slice(&secp, &secret)?;
        let (public_key, _parity) = keypair.x_only_public_key();
        let address = Address::new(network_prefix, AddressVersion::PubKey, &public_key.serialize())?;

        Ok(Self {
            secp,
            keypair,
            public_key,
            address,
        })
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn public_key(&self) -> &XOnlyPublicKey {
        &self.public_key
    }

    /// BIP-340 Schnorr signature over a 32-byte digest.
    pub fn sign(&self, digest: [u8; 32]) -> schnorr::Signature {
        self.secp
            .sign_schnorr(&Message::from_digest(digest), &self.keypair)
    }

    /// Sign every input in index order with `SigHashAll`.
    pub fn sign_transaction(&self, tx: &mut Transaction) -> Result<(), SigningError> {
        let mut reused = SigHashReusedValues::new();
        for index in 0..tx.inputs.len() {
            let digest = calc_schnorr_signature_hash(tx, index, &mut reused)
                .map_err(|source| SigningError { index, source })?;

            let mut signature = self.sign(digest).serialize().to_vec();
            signature.push(SIG_HASH_ALL);
            tx.inputs[index].signature_script = push_data_script(&signature);
        }
        Ok(())
    }
}

impl fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningIdentity")
            .field("address", &self.address.to_string())
            .finish_non_exhaustive()
    }
}

/// Script consisting of a single data push.
fn push_data_script(data: &[u8]) -> Vec<u8> {
    let mut script = Vec::with_capacity(data.len() + 2);
    if data.len() < OP_PUSHDATA1 as usize {
        script.push(data.len() as u8);
    } else {
        script.push(OP_PUSHDATA1);
        script.push(data.len() as u8);
    }
    script.extend_from_slice(data);
    script
}
