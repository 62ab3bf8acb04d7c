//! Transaction model for mempool candidates
//!
//! A candidate transaction carries, per input, a copy of the output it spends.
//! Validation trusts that embedded copy instead of resolving it against a
//! ledger. Production-grade features:
//! - Consensus (legacy and witness) serialization
//! - txid / wtxid identities
//! - Size, weight and virtual size accounting (BIP141)

use std::fmt;

use serde::{Deserialize, Serialize};

use super::encoding::ByteWriter;
use super::validation::RejectReason;
use crate::crypto::{double_sha256, reversed_hex, Hash256};
use crate::script::{ScriptType, Template};

// =============================================================================
// Constants
// =============================================================================

/// Transaction versions the validator understands
pub const SUPPORTED_VERSIONS: [i32; 2] = [1, 2];

/// Sequence number that disables locktime and replacement
pub const SEQUENCE_FINAL: u32 = 0xFFFF_FFFF;

/// Largest locktime accepted by the validator (signed 32-bit range)
pub const MAX_LOCKTIME: u32 = i32::MAX as u32;

/// Weight units per byte of non-witness data (BIP141)
pub const WITNESS_SCALE_FACTOR: usize = 4;

// =============================================================================
// Outpoint
// =============================================================================

/// Reference to an output of a previous transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    /// Previous txid in internal (serialization) byte order
    pub txid: Hash256,
    /// Index of the output in the previous transaction
    pub vout: u32,
}

impl OutPoint {
    pub fn new(txid: Hash256, vout: u32) -> Self {
        Self { txid, vout }
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", reversed_hex(&self.txid), self.vout)
    }
}

// =============================================================================
// Transaction Output
// =============================================================================

/// Transaction output, also used for the embedded previous output of an input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutput {
    /// Value in the smallest monetary unit; negative values never validate
    pub value: i64,
    /// Locking script
    pub script_pubkey: Vec<u8>,
    /// Classified family of the locking script
    pub script_type: ScriptType,
    /// Display address, never used in verification
    pub address: Option<String>,
}

impl TxOutput {
    /// Create an output, classifying the script and deriving its address
    pub fn new(value: i64, script_pubkey: Vec<u8>) -> Self {
        let template = Template::match_script(&script_pubkey);
        let script_type = template.script_type();
        let address = template.address();
        Self {
            value,
            script_pubkey,
            script_type,
            address,
        }
    }
}

// =============================================================================
// Transaction Input
// =============================================================================

/// Transaction input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxInput {
    /// The output being spent
    pub previous_output: OutPoint,
    /// Embedded copy of the spent output (script and value)
    pub prevout: TxOutput,
    /// Unlocking script
    pub script_sig: Vec<u8>,
    /// Witness stack, empty for legacy inputs
    pub witness: Vec<Vec<u8>>,
    pub sequence: u32,
    pub is_coinbase: bool,
    /// Set by the validator once this input's script has passed
    pub verified: bool,
}

impl TxInput {
    pub fn new(previous_output: OutPoint, prevout: TxOutput, script_sig: Vec<u8>) -> Self {
        Self {
            previous_output,
            prevout,
            script_sig,
            witness: Vec::new(),
            sequence: SEQUENCE_FINAL,
            is_coinbase: false,
            verified: false,
        }
    }

    /// Attach a witness stack
    pub fn with_witness(mut self, witness: Vec<Vec<u8>>) -> Self {
        self.witness = witness;
        self
    }

    pub fn with_sequence(mut self, sequence: u32) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn has_witness(&self) -> bool {
        !self.witness.is_empty()
    }
}

// =============================================================================
// Validation Status
// =============================================================================

/// Tri-state validity of a transaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ValidationStatus {
    #[default]
    Unvalidated,
    Valid {
        fee: i64,
        priority: i64,
    },
    Rejected(RejectReason),
}

// =============================================================================
// Transaction
// =============================================================================

/// A candidate transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub version: i32,
    pub locktime: u32,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    /// Identity assigned at construction
    txid: Hash256,
    status: ValidationStatus,
}

impl Transaction {
    /// Create a transaction and assign its txid
    pub fn new(version: i32, locktime: u32, inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Self {
        let mut tx = Self {
            version,
            locktime,
            inputs,
            outputs,
            txid: [0u8; 32],
            status: ValidationStatus::Unvalidated,
        };
        tx.txid = double_sha256(&tx.serialize_legacy());
        tx
    }

    /// Transaction ID in internal byte order
    pub fn txid(&self) -> &Hash256 {
        &self.txid
    }

    /// Transaction ID as displayed (byte-reversed hex)
    pub fn txid_hex(&self) -> String {
        reversed_hex(&self.txid)
    }

    /// Witness transaction ID; equals the txid when no input has a witness
    pub fn wtxid(&self) -> Hash256 {
        if self.has_witness() {
            double_sha256(&self.serialize_witness())
        } else {
            self.txid
        }
    }

    pub fn has_witness(&self) -> bool {
        self.inputs.iter().any(TxInput::has_witness)
    }

    pub fn status(&self) -> &ValidationStatus {
        &self.status
    }

    pub(crate) fn set_status(&mut self, status: ValidationStatus) {
        self.status = status;
    }

    /// Check if the transaction passed validation
    pub fn is_valid(&self) -> bool {
        matches!(self.status, ValidationStatus::Valid { .. })
    }

    /// Fee, available only after successful validation
    pub fn fee(&self) -> Option<i64> {
        match self.status {
            ValidationStatus::Valid { fee, .. } => Some(fee),
            _ => None,
        }
    }

    /// Priority, available only after successful validation
    pub fn priority(&self) -> Option<i64> {
        match self.status {
            ValidationStatus::Valid { priority, .. } => Some(priority),
            _ => None,
        }
    }

    /// The rejection reason, if validation failed
    pub fn rejection(&self) -> Option<&RejectReason> {
        match &self.status {
            ValidationStatus::Rejected(reason) => Some(reason),
            _ => None,
        }
    }

    /// Outputs spent by this transaction, in input order
    pub fn outpoints(&self) -> impl Iterator<Item = &OutPoint> {
        self.inputs.iter().map(|input| &input.previous_output)
    }

    /// Sum of the embedded previous output values, `None` on overflow
    pub fn total_input_value(&self) -> Option<i64> {
        self.inputs
            .iter()
            .try_fold(0i64, |sum, input| sum.checked_add(input.prevout.value))
    }

    /// Sum of the output values, `None` on overflow
    pub fn total_output_value(&self) -> Option<i64> {
        self.outputs
            .iter()
            .try_fold(0i64, |sum, output| sum.checked_add(output.value))
    }

    // -------------------------------------------------------------------------
    // Serialization
    // -------------------------------------------------------------------------

    /// Serialization without witness data (the txid preimage)
    pub fn serialize_legacy(&self) -> Vec<u8> {
        let mut writer = ByteWriter::with_capacity(self.estimated_size());
        writer.write_i32(self.version);
        self.write_body(&mut writer);
        writer.write_u32(self.locktime);
        writer.into_bytes()
    }

    /// BIP144 serialization with marker, flag and witness stacks
    ///
    /// Falls back to the legacy form when no input carries a witness.
    pub fn serialize_witness(&self) -> Vec<u8> {
        if !self.has_witness() {
            return self.serialize_legacy();
        }

        let mut writer = ByteWriter::with_capacity(self.estimated_size());
        writer.write_i32(self.version);
        writer.write_u8(0x00);
        writer.write_u8(0x01);
        self.write_body(&mut writer);
        for input in &self.inputs {
            writer.write_compact_size(input.witness.len() as u64);
            for item in &input.witness {
                writer.write_var_bytes(item);
            }
        }
        writer.write_u32(self.locktime);
        writer.into_bytes()
    }

    fn write_body(&self, writer: &mut ByteWriter) {
        writer.write_compact_size(self.inputs.len() as u64);
        for input in &self.inputs {
            writer.write_bytes(&input.previous_output.txid);
            writer.write_u32(input.previous_output.vout);
            writer.write_var_bytes(&input.script_sig);
            writer.write_u32(input.sequence);
        }
        writer.write_compact_size(self.outputs.len() as u64);
        for output in &self.outputs {
            writer.write_i64(output.value);
            writer.write_var_bytes(&output.script_pubkey);
        }
    }

    fn estimated_size(&self) -> usize {
        10 + self.inputs.len() * 150 + self.outputs.len() * 40
    }

    // -------------------------------------------------------------------------
    // Size accounting
    // -------------------------------------------------------------------------

    /// Size in bytes without witness data
    pub fn base_size(&self) -> usize {
        self.serialize_legacy().len()
    }

    /// Size in bytes including witness data
    pub fn total_size(&self) -> usize {
        self.serialize_witness().len()
    }

    /// Block weight: `3 * base_size + total_size`
    pub fn weight(&self) -> usize {
        self.base_size() * (WITNESS_SCALE_FACTOR - 1) + self.total_size()
    }

    /// Virtual size in bytes, rounded up
    pub fn vsize(&self) -> usize {
        self.weight().div_ceil(WITNESS_SCALE_FACTOR)
    }
}
