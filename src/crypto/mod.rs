//! Cryptographic utilities
//!
//! This module provides:
//! - SHA-256, double SHA-256 and HASH160 digests
//! - ECDSA key management (secp256k1)
//! - Base58Check address rendering

pub mod hash;
pub mod keys;

pub use hash::{double_sha256, hash160, reversed_hex, ripemd160, sha256, Hash256};
pub use keys::{
    base58check, KeyError, KeyPair, P2PKH_ADDRESS_VERSION,
    P2SH_ADDRESS_VERSION,
};
