//! Transaction validation
//!
//! Runs every candidate through a fixed sequence of checks and records the
//! verdict on the transaction:
//! 1. Structure and version
//! 2. Duplicate inputs
//! 3. Values (negative outputs, inputs covering outputs)
//! 4. Per-input public key presence and script execution
//! 5. Locktime range
//!
//! The first failing check rejects the transaction. A rejection never aborts
//! the batch it belongs to.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use thiserror::Error;

use super::sighash::{SignatureVerifier, TransactionSignatureChecker};
use super::transaction::{
    OutPoint, Transaction, TxInput, ValidationStatus, MAX_LOCKTIME, SUPPORTED_VERSIONS,
};
use crate::script::{ScriptEngine, ScriptError, ScriptFlags, ScriptType};

// =============================================================================
// Error Types
// =============================================================================

/// Malformed transaction data
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StructuralError {
    #[error("Malformed record: {0}")]
    MalformedRecord(String),
    #[error("Invalid hex in {field}: {reason}")]
    InvalidHex { field: String, reason: String },
    #[error("Input {index}: txid must be 32 bytes, got {len}")]
    InvalidTxidLength { index: usize, len: usize },
    #[error("Input {0} has no previous output")]
    MissingPrevout(usize),
    #[error("Input {0} spends a negative value")]
    NegativePrevoutValue(usize),
    #[error("Input {0} is a coinbase input")]
    CoinbaseInput(usize),
    #[error("Transaction has no inputs")]
    NoInputs,
    #[error("Transaction has no outputs")]
    NoOutputs,
    #[error("Unsupported version: {0}")]
    UnsupportedVersion(i64),
    #[error("Locktime {0} is not a 32-bit value")]
    InvalidLocktime(i64),
}

/// Why a transaction was excluded from the valid set
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    #[error("{0}")]
    Structural(#[from] StructuralError),
    #[error("Input {index} duplicates outpoint {outpoint}")]
    DuplicateInput { index: usize, outpoint: OutPoint },
    #[error("Insufficient input value: {inputs} < {outputs}")]
    InsufficientInputValue { inputs: i64, outputs: i64 },
    #[error("Output {0} has a negative value")]
    NegativeOutputValue(usize),
    #[error("Value total out of range")]
    ValueOutOfRange,
    #[error("Input {index}: script execution failed: {error}")]
    ScriptExecutionFailed { index: usize, error: ScriptError },
    #[error("Input {0}: invalid signature")]
    SignatureInvalid(usize),
    #[error("Input {0}: missing public key")]
    MissingPublicKey(usize),
    #[error("Locktime {0} out of range")]
    LocktimeOutOfRange(i64),
    #[error("Input {index} spends {outpoint}, already spent in this batch")]
    ConflictsWithBatch { index: usize, outpoint: OutPoint },
}

impl RejectReason {
    /// Short tag naming the failure class
    pub fn tag(&self) -> &'static str {
        match self {
            RejectReason::Structural(_) => "StructuralError",
            RejectReason::DuplicateInput { .. } => "DuplicateInput",
            RejectReason::InsufficientInputValue { .. } => "InsufficientInputValue",
            RejectReason::NegativeOutputValue(_) => "NegativeOutputValue",
            RejectReason::ValueOutOfRange => "ValueOutOfRange",
            RejectReason::ScriptExecutionFailed { .. } => "ScriptExecutionFailed",
            RejectReason::SignatureInvalid(_) => "SignatureInvalid",
            RejectReason::MissingPublicKey(_) => "MissingPublicKey",
            RejectReason::LocktimeOutOfRange(_) => "LocktimeOutOfRange",
            RejectReason::ConflictsWithBatch { .. } => "ConflictsWithBatch",
        }
    }
}

// =============================================================================
// Verdict
// =============================================================================

/// Outcome of validating one transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Valid { fee: i64, priority: i64 },
    Rejected(RejectReason),
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verdict::Valid { .. })
    }
}

impl From<Verdict> for ValidationStatus {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Valid { fee, priority } => ValidationStatus::Valid { fee, priority },
            Verdict::Rejected(reason) => ValidationStatus::Rejected(reason),
        }
    }
}

// =============================================================================
// Validator
// =============================================================================

/// Validates candidate transactions
///
/// Holds no per-transaction state, so one validator can be shared across
/// worker threads.
pub struct Validator {
    verifier: SignatureVerifier,
    flags: ScriptFlags,
    script_deadline: Option<Duration>,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(ScriptFlags::STANDARD)
    }
}

impl Validator {
    /// Create a validator applying the given script rules
    pub fn new(flags: ScriptFlags) -> Self {
        Self {
            verifier: SignatureVerifier::new(flags.contains(ScriptFlags::LOW_S)),
            flags,
            script_deadline: None,
        }
    }

    /// Bound the script execution time of each transaction
    pub fn with_script_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.script_deadline = deadline;
        self
    }

    pub fn flags(&self) -> ScriptFlags {
        self.flags
    }

    /// Validate a transaction and record the verdict on it
    pub fn validate(&self, tx: &mut Transaction) -> Verdict {
        let deadline = self.script_deadline.map(|budget| Instant::now() + budget);
        self.validate_with_deadline(tx, deadline)
    }

    /// Validate with an explicit script deadline
    pub fn validate_with_deadline(&self, tx: &mut Transaction, deadline: Option<Instant>) -> Verdict {
        for input in &mut tx.inputs {
            input.verified = false;
        }

        let verdict = match self.run_checks(tx, deadline) {
            Ok((fee, priority)) => Verdict::Valid { fee, priority },
            Err(reason) => Verdict::Rejected(reason),
        };

        tx.set_status(verdict.clone().into());
        verdict
    }

    fn run_checks(
        &self,
        tx: &mut Transaction,
        deadline: Option<Instant>,
    ) -> Result<(i64, i64), RejectReason> {
        check_structure(tx)?;
        check_duplicate_inputs(tx)?;
        let fee = check_values(tx)?;

        for index in 0..tx.inputs.len() {
            self.check_input(tx, index, deadline)?;
            tx.inputs[index].verified = true;
        }

        if tx.locktime > MAX_LOCKTIME {
            return Err(RejectReason::LocktimeOutOfRange(i64::from(tx.locktime)));
        }

        // Integer division truncates toward zero; fee is non-negative here
        let priority = fee / tx.inputs.len() as i64;
        Ok((fee, priority))
    }

    /// Public key presence, then script execution for one input
    fn check_input(
        &self,
        tx: &Transaction,
        index: usize,
        deadline: Option<Instant>,
    ) -> Result<(), RejectReason> {
        let input = &tx.inputs[index];

        if presents_public_key(input) {
            self.verifier
                .extract_public_key(tx, index)
                .map_err(|_| RejectReason::MissingPublicKey(index))?;
        }

        let checker = TransactionSignatureChecker::new(&self.verifier, tx, index);
        ScriptEngine::new(&checker, self.flags)
            .with_deadline(deadline)
            .execute(
                &input.script_sig,
                &input.prevout.script_pubkey,
                &input.witness,
            )
            .map_err(|error| match error {
                ScriptError::SignatureRejected => RejectReason::SignatureInvalid(index),
                error => RejectReason::ScriptExecutionFailed { index, error },
            })
    }
}

/// Inputs whose spend must carry the public key in the scriptSig or witness
fn presents_public_key(input: &TxInput) -> bool {
    match input.prevout.script_type {
        ScriptType::P2PKH | ScriptType::P2WPKH => true,
        ScriptType::P2SH => input.has_witness(),
        ScriptType::P2PK | ScriptType::Other => false,
    }
}

fn check_structure(tx: &Transaction) -> Result<(), StructuralError> {
    if !SUPPORTED_VERSIONS.contains(&tx.version) {
        return Err(StructuralError::UnsupportedVersion(i64::from(tx.version)));
    }
    if tx.inputs.is_empty() {
        return Err(StructuralError::NoInputs);
    }
    if tx.outputs.is_empty() {
        return Err(StructuralError::NoOutputs);
    }
    for (index, input) in tx.inputs.iter().enumerate() {
        if input.is_coinbase {
            return Err(StructuralError::CoinbaseInput(index));
        }
        if input.prevout.value < 0 {
            return Err(StructuralError::NegativePrevoutValue(index));
        }
    }
    Ok(())
}

fn check_duplicate_inputs(tx: &Transaction) -> Result<(), RejectReason> {
    let mut seen = HashSet::with_capacity(tx.inputs.len());
    for (index, outpoint) in tx.outpoints().enumerate() {
        if !seen.insert(*outpoint) {
            return Err(RejectReason::DuplicateInput {
                index,
                outpoint: *outpoint,
            });
        }
    }
    Ok(())
}

/// Returns the fee
fn check_values(tx: &Transaction) -> Result<i64, RejectReason> {
    if let Some(index) = tx.outputs.iter().position(|output| output.value < 0) {
        return Err(RejectReason::NegativeOutputValue(index));
    }

    let inputs = tx.total_input_value().ok_or(RejectReason::ValueOutOfRange)?;
    let outputs = tx.total_output_value().ok_or(RejectReason::ValueOutOfRange)?;
    if inputs < outputs {
        return Err(RejectReason::InsufficientInputValue { inputs, outputs });
    }
    Ok(inputs - outputs)
}
