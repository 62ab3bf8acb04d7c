//! ECDSA key management
//!
//! Key pairs on the secp256k1 curve (same as Bitcoin), digest signing in DER
//! form, and Base58Check address rendering for key-hash and script-hash outputs.

use secp256k1::{ecdsa::Signature, Message, PublicKey, Secp256k1, SecretKey};
use thiserror::Error;

use super::hash::{double_sha256, hash160, Hash256};

/// Mainnet version byte for pay-to-public-key-hash addresses
pub const P2PKH_ADDRESS_VERSION: u8 = 0x00;

/// Mainnet version byte for pay-to-script-hash addresses
pub const P2SH_ADDRESS_VERSION: u8 = 0x05;

/// Errors that can occur during key operations
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Invalid private key")]
    InvalidPrivateKey,
}

/// A key pair consisting of a private key and its corresponding public key
#[derive(Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Create a key pair from an existing secret key
    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let secp = Secp256k1::signing_only();
        let public_key = PublicKey::from_secret_key(&secp, &secret_key);
        Self {
            secret_key,
            public_key,
        }
    }

    /// Create a key pair from raw 32-byte secret material
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        let secret_key = SecretKey::from_slice(bytes).map_err(|_| KeyError::InvalidPrivateKey)?;
        Ok(Self::from_secret_key(secret_key))
    }

    /// Compressed SEC1 encoding of the public key (33 bytes)
    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.public_key.serialize().to_vec()
    }

    /// Uncompressed SEC1 encoding of the public key (65 bytes)
    pub fn public_key_uncompressed(&self) -> Vec<u8> {
        self.public_key.serialize_uncompressed().to_vec()
    }

    /// HASH160 of the compressed public key
    pub fn public_key_hash(&self) -> [u8; 20] {
        hash160(&self.public_key.serialize())
    }

    /// Sign a 32-byte digest, returning the DER-encoded signature (low-S)
    pub fn sign_digest(&self, digest: &Hash256) -> Vec<u8> {
        let secp = Secp256k1::signing_only();
        let message = Message::from_digest(*digest);
        let signature: Signature = secp.sign_ecdsa(&message, &self.secret_key);
        signature.serialize_der().to_vec()
    }
}

/// Base58Check encoding: version byte, payload, first four bytes of double SHA-256
pub fn base58check(version: u8, payload: &[u8]) -> String {
    let mut address_bytes = Vec::with_capacity(1 + payload.len() + 4);
    address_bytes.push(version);
    address_bytes.extend_from_slice(payload);

    let checksum = double_sha256(&address_bytes);
    address_bytes.extend_from_slice(&checksum[..4]);

    bs58::encode(address_bytes).into_string()
}
