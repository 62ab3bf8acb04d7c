//! Core transaction components
//!
//! This module contains the validation building blocks:
//! - Transactions (consensus serialization, txid, weight)
//! - Mempool records (JSON boundary format)
//! - Signature hashing and verification (legacy and BIP143)
//! - The validator and its rejection taxonomy

pub mod encoding;
pub mod record;
pub mod sighash;
pub mod transaction;
pub mod validation;

pub use record::{InputRecord, OutputRecord, TransactionRecord};
pub use sighash::{SigHashType, SignatureError, SignatureVerifier, TransactionSignatureChecker};
pub use transaction::{
    OutPoint, Transaction, TxInput, TxOutput, ValidationStatus, MAX_LOCKTIME, SEQUENCE_FINAL,
    SUPPORTED_VERSIONS, WITNESS_SCALE_FACTOR,
};
pub use validation::{RejectReason, StructuralError, Validator, Verdict};
