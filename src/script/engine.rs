//! Script execution engine
//!
//! A bounded stack machine that runs an unlocking script followed by the
//! locking script it claims to satisfy.
//! Security properties:
//! - Operation count and stack depth limits
//! - Push-only unlocking scripts
//! - Default-deny for unrecognised locking scripts and opcodes
//! - Optional wall-clock deadline checked between instructions

use std::time::Instant;

use bitflags::bitflags;
use thiserror::Error;

use super::opcodes::Opcode;
use super::program::{Instruction, ScriptProgram};
use super::types::{p2pkh_script, Template};
use crate::crypto::{double_sha256, hash160, ripemd160, sha256};

// =============================================================================
// Engine Constants (Bitcoin consensus values)
// =============================================================================

/// Maximum script size in bytes
pub const MAX_SCRIPT_SIZE: usize = 10_000;

/// Maximum size of a single stack element
pub const MAX_SCRIPT_ELEMENT_SIZE: usize = 520;

/// Maximum non-push operations per script
pub const MAX_OPS_PER_SCRIPT: usize = 201;

/// Maximum number of stack elements
pub const MAX_STACK_SIZE: usize = 1_000;

/// Maximum public keys in one OP_CHECKMULTISIG
pub const MAX_PUBKEYS_PER_MULTISIG: usize = 20;

// =============================================================================
// Flags, Errors and the signature seam
// =============================================================================

bitflags! {
    /// Verification rules applied on top of the base script semantics
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ScriptFlags: u32 {
        /// Evaluate the redeem script of pay-to-script-hash outputs (BIP16)
        const P2SH = 1 << 0;
        /// Accept witness v0 key-hash programs, native and P2SH-wrapped
        const WITNESS = 1 << 1;
        /// Reject signatures whose S value is in the upper half of the curve order
        const LOW_S = 1 << 2;
        /// The rules a standard mempool applies
        const STANDARD = Self::P2SH.bits() | Self::WITNESS.bits() | Self::LOW_S.bits();
    }
}

impl Default for ScriptFlags {
    fn default() -> Self {
        ScriptFlags::STANDARD
    }
}

/// Which signing digest a signature check commits to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigVersion {
    /// Legacy digest over the whole transaction
    Base,
    /// BIP143 digest used by witness v0 programs
    WitnessV0,
}

/// Script execution errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    #[error("Script too large: {0} bytes")]
    ScriptTooLarge(usize),
    #[error("Push of {0} bytes exceeds the element size limit")]
    PushSizeExceeded(usize),
    #[error("Push runs past the end of the script")]
    MalformedPush,
    #[error("Locking script does not match a supported template")]
    UnsupportedScript,
    #[error("Unsupported opcode: {0:#04x}")]
    UnsupportedOpcode(u8),
    #[error("Unlocking script must only push data")]
    PushOnlyRequired,
    #[error("Stack underflow")]
    StackUnderflow,
    #[error("Stack overflow")]
    StackOverflow,
    #[error("Operation limit exceeded")]
    OpCountExceeded,
    #[error("OP_EQUALVERIFY failed")]
    EqualVerifyFailed,
    #[error("OP_VERIFY failed")]
    VerifyFailed,
    #[error("OP_RETURN encountered")]
    OpReturn,
    #[error("Signature check failed")]
    SignatureRejected,
    #[error("Invalid multisig key or signature count")]
    InvalidMultisigCount,
    #[error("Multisig dummy element must be empty")]
    NonNullDummy,
    #[error("Script number overflow")]
    NumberOverflow,
    #[error("Script finished with an empty stack")]
    EmptyStack,
    #[error("Script finished with a false value")]
    EvalFalse,
    #[error("Script finished with {0} stack elements, expected exactly one")]
    CleanStack(usize),
    #[error("Witness program expects 2 witness items, got {0}")]
    WitnessMismatch(usize),
    #[error("Witness program spends must have an empty or single-push unlocking script")]
    WitnessMalleated,
    #[error("Witness supplied for a non-witness script")]
    UnexpectedWitness,
    #[error("Witness programs are disabled")]
    WitnessDisabled,
    #[error("Script execution deadline exceeded")]
    DeadlineExceeded,
}

/// Signature verification as seen from inside the engine
///
/// The engine knows nothing about transactions; the checker binds a signature
/// check to one input of one transaction.
pub trait SignatureChecker {
    /// Verify `signature` (DER plus sighash byte) by `public_key` over the
    /// digest built with `script_code`
    fn check_signature(
        &self,
        signature: &[u8],
        public_key: &[u8],
        script_code: &[u8],
        sig_version: SigVersion,
    ) -> bool;
}

// =============================================================================
// Execution Stack
// =============================================================================

/// Last-in-first-out stack of byte strings for one script execution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionStack {
    items: Vec<Vec<u8>>,
}

impl ExecutionStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a value, enforcing the depth and element size limits
    pub fn push(&mut self, value: Vec<u8>) -> Result<(), ScriptError> {
        if self.items.len() >= MAX_STACK_SIZE {
            return Err(ScriptError::StackOverflow);
        }
        if value.len() > MAX_SCRIPT_ELEMENT_SIZE {
            return Err(ScriptError::PushSizeExceeded(value.len()));
        }
        self.items.push(value);
        Ok(())
    }

    /// Pop the top value
    pub fn pop(&mut self) -> Result<Vec<u8>, ScriptError> {
        self.items.pop().ok_or(ScriptError::StackUnderflow)
    }

    /// Borrow the top value
    pub fn top(&self) -> Result<&[u8], ScriptError> {
        self.items
            .last()
            .map(Vec::as_slice)
            .ok_or(ScriptError::StackUnderflow)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Non-empty and not all zero bytes
pub fn is_truthy(value: &[u8]) -> bool {
    value.iter().any(|byte| *byte != 0)
}

fn encode_bool(value: bool) -> Vec<u8> {
    if value {
        vec![1]
    } else {
        Vec::new()
    }
}

/// Decode a little-endian sign-magnitude script number of at most 4 bytes
pub fn decode_number(bytes: &[u8]) -> Result<i64, ScriptError> {
    if bytes.len() > 4 {
        return Err(ScriptError::NumberOverflow);
    }
    let Some(&last) = bytes.last() else {
        return Ok(0);
    };

    let mut value = bytes
        .iter()
        .enumerate()
        .fold(0i64, |acc, (i, byte)| acc | (i64::from(*byte) << (8 * i)));

    if last & 0x80 != 0 {
        value &= !(0x80i64 << (8 * (bytes.len() - 1)));
        value = -value;
    }
    Ok(value)
}

// =============================================================================
// Script Engine
// =============================================================================

/// Executes unlocking scripts against locking scripts
pub struct ScriptEngine<'a, C: SignatureChecker> {
    checker: &'a C,
    flags: ScriptFlags,
    deadline: Option<Instant>,
}

impl<'a, C: SignatureChecker> ScriptEngine<'a, C> {
    /// Create an engine that delegates signature checks to `checker`
    pub fn new(checker: &'a C, flags: ScriptFlags) -> Self {
        Self {
            checker,
            flags,
            deadline: None,
        }
    }

    /// Fail any execution still running at `deadline`
    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Run `script_sig` (and `witness`) against `script_pubkey`
    pub fn execute(
        &self,
        script_sig: &[u8],
        script_pubkey: &[u8],
        witness: &[Vec<u8>],
    ) -> Result<(), ScriptError> {
        match Template::match_script(script_pubkey) {
            Template::P2PK { .. } | Template::P2PKH { .. } => {
                reject_witness(witness)?;
                self.verify_legacy(script_sig, script_pubkey)
            }
            Template::P2SH { .. } => self.verify_script_hash(script_sig, script_pubkey, witness),
            Template::P2WPKH { key_hash } => {
                if !script_sig.is_empty() {
                    return Err(ScriptError::WitnessMalleated);
                }
                self.verify_witness_key_hash(key_hash, witness)
            }
            Template::Other => Err(ScriptError::UnsupportedScript),
        }
    }

    /// Pay-to-public-key and pay-to-public-key-hash
    fn verify_legacy(&self, script_sig: &[u8], script_pubkey: &[u8]) -> Result<(), ScriptError> {
        let unlocking = unlocking_program(script_sig)?;
        let locking = ScriptProgram::parse(script_pubkey)?;

        let mut interpreter = Interpreter::new(self);
        interpreter.push_operands(&unlocking)?;
        interpreter.run(&locking, script_pubkey, SigVersion::Base)?;
        interpreter.finish()
    }

    /// Pay-to-script-hash, with BIP16 redeem evaluation when enabled
    fn verify_script_hash(
        &self,
        script_sig: &[u8],
        script_pubkey: &[u8],
        witness: &[Vec<u8>],
    ) -> Result<(), ScriptError> {
        let unlocking = unlocking_program(script_sig)?;
        let locking = ScriptProgram::parse(script_pubkey)?;

        let mut outer = Interpreter::new(self);
        outer.push_operands(&unlocking)?;

        if !self.flags.contains(ScriptFlags::P2SH) {
            reject_witness(witness)?;
            outer.run(&locking, script_pubkey, SigVersion::Base)?;
            return outer.finish();
        }

        let mut redeem_stack = outer.stack.clone();
        outer.run(&locking, script_pubkey, SigVersion::Base)?;
        if !is_truthy(outer.stack.top()?) {
            return Err(ScriptError::EvalFalse);
        }

        let redeem_script = redeem_stack.pop()?;
        match Template::match_script(&redeem_script) {
            Template::P2WPKH { key_hash } if self.flags.contains(ScriptFlags::WITNESS) => {
                if !redeem_stack.is_empty() {
                    return Err(ScriptError::WitnessMalleated);
                }
                self.verify_witness_key_hash(key_hash, witness)
            }
            _ => {
                reject_witness(witness)?;
                let redeem = ScriptProgram::parse(&redeem_script)?;
                let mut inner = Interpreter::with_stack(self, redeem_stack);
                inner.run(&redeem, &redeem_script, SigVersion::Base)?;
                inner.finish()
            }
        }
    }

    /// Witness v0 key hash: the witness is `[signature, public key]`
    fn verify_witness_key_hash(
        &self,
        key_hash: &[u8],
        witness: &[Vec<u8>],
    ) -> Result<(), ScriptError> {
        if !self.flags.contains(ScriptFlags::WITNESS) {
            return Err(ScriptError::WitnessDisabled);
        }
        if witness.len() != 2 {
            return Err(ScriptError::WitnessMismatch(witness.len()));
        }

        let script_code = p2pkh_script(key_hash);
        let program = ScriptProgram::parse(&script_code)?;

        let mut interpreter = Interpreter::new(self);
        for item in witness {
            interpreter.stack.push(item.clone())?;
        }
        interpreter.run(&program, &script_code, SigVersion::WitnessV0)?;
        interpreter.finish()
    }

    fn check_deadline(&self) -> Result<(), ScriptError> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(ScriptError::DeadlineExceeded),
            _ => Ok(()),
        }
    }
}

fn unlocking_program(script_sig: &[u8]) -> Result<ScriptProgram, ScriptError> {
    let program = ScriptProgram::parse(script_sig)?;
    if !program.is_push_only() {
        return Err(ScriptError::PushOnlyRequired);
    }
    Ok(program)
}

fn reject_witness(witness: &[Vec<u8>]) -> Result<(), ScriptError> {
    if witness.is_empty() {
        Ok(())
    } else {
        Err(ScriptError::UnexpectedWitness)
    }
}

// =============================================================================
// Interpreter
// =============================================================================

/// State of one script run; discarded when the run completes
struct Interpreter<'e, 'a, C: SignatureChecker> {
    engine: &'e ScriptEngine<'a, C>,
    stack: ExecutionStack,
    op_count: usize,
    /// A signature check returned false at some point
    signature_failed: bool,
}

impl<'e, 'a, C: SignatureChecker> Interpreter<'e, 'a, C> {
    fn new(engine: &'e ScriptEngine<'a, C>) -> Self {
        Self::with_stack(engine, ExecutionStack::new())
    }

    fn with_stack(engine: &'e ScriptEngine<'a, C>, stack: ExecutionStack) -> Self {
        Self {
            engine,
            stack,
            op_count: 0,
            signature_failed: false,
        }
    }

    /// Push every operand of a push-only program
    fn push_operands(&mut self, program: &ScriptProgram) -> Result<(), ScriptError> {
        for instruction in program.instructions() {
            match instruction {
                Instruction::Push(data) => self.stack.push(data.clone())?,
                _ => return Err(ScriptError::PushOnlyRequired),
            }
        }
        Ok(())
    }

    /// Execute a program against the current stack
    fn run(
        &mut self,
        program: &ScriptProgram,
        script_code: &[u8],
        sig_version: SigVersion,
    ) -> Result<(), ScriptError> {
        self.op_count = 0;

        for instruction in program.instructions() {
            self.engine.check_deadline()?;

            match instruction {
                Instruction::Push(data) => self.stack.push(data.clone())?,
                Instruction::Op(opcode) => {
                    self.count_ops(1)?;
                    self.step(*opcode, script_code, sig_version)?;
                }
                Instruction::Unknown(byte) => {
                    self.count_ops(1)?;
                    return Err(ScriptError::UnsupportedOpcode(*byte));
                }
            }
        }

        Ok(())
    }

    /// Execute a single operator
    fn step(
        &mut self,
        opcode: Opcode,
        script_code: &[u8],
        sig_version: SigVersion,
    ) -> Result<(), ScriptError> {
        match opcode {
            Opcode::Nop => {}
            Opcode::Verify => {
                let value = self.stack.pop()?;
                if !is_truthy(&value) {
                    return Err(ScriptError::VerifyFailed);
                }
            }
            Opcode::Return => return Err(ScriptError::OpReturn),
            Opcode::Drop => {
                self.stack.pop()?;
            }
            Opcode::Dup => {
                let value = self.stack.top()?.to_vec();
                self.stack.push(value)?;
            }
            Opcode::Equal => {
                let b = self.stack.pop()?;
                let a = self.stack.pop()?;
                self.stack.push(encode_bool(a == b))?;
            }
            Opcode::EqualVerify => {
                let b = self.stack.pop()?;
                let a = self.stack.pop()?;
                if a != b {
                    return Err(ScriptError::EqualVerifyFailed);
                }
            }
            Opcode::Ripemd160 => {
                let value = self.stack.pop()?;
                self.stack.push(ripemd160(&value).to_vec())?;
            }
            Opcode::Sha256 => {
                let value = self.stack.pop()?;
                self.stack.push(sha256(&value).to_vec())?;
            }
            Opcode::Hash160 => {
                let value = self.stack.pop()?;
                self.stack.push(hash160(&value).to_vec())?;
            }
            Opcode::Hash256 => {
                let value = self.stack.pop()?;
                self.stack.push(double_sha256(&value).to_vec())?;
            }
            Opcode::CheckSig | Opcode::CheckSigVerify => {
                let public_key = self.stack.pop()?;
                let signature = self.stack.pop()?;
                let valid = self.check_signature(&signature, &public_key, script_code, sig_version);

                if opcode == Opcode::CheckSigVerify {
                    if !valid {
                        return Err(ScriptError::SignatureRejected);
                    }
                } else {
                    self.stack.push(encode_bool(valid))?;
                }
            }
            Opcode::CheckMultiSig | Opcode::CheckMultiSigVerify => {
                let valid = self.check_multisig(script_code, sig_version)?;

                if opcode == Opcode::CheckMultiSigVerify {
                    if !valid {
                        return Err(ScriptError::SignatureRejected);
                    }
                } else {
                    self.stack.push(encode_bool(valid))?;
                }
            }
        }

        Ok(())
    }

    /// Run one signature check; an empty signature is a plain `false`
    fn check_signature(
        &mut self,
        signature: &[u8],
        public_key: &[u8],
        script_code: &[u8],
        sig_version: SigVersion,
    ) -> bool {
        if signature.is_empty() {
            return false;
        }
        let valid = self
            .engine
            .checker
            .check_signature(signature, public_key, script_code, sig_version);
        if !valid {
            self.signature_failed = true;
        }
        valid
    }

    /// `<dummy> <sig>... <m> <key>... <n> OP_CHECKMULTISIG`
    fn check_multisig(
        &mut self,
        script_code: &[u8],
        sig_version: SigVersion,
    ) -> Result<bool, ScriptError> {
        let key_count = self.pop_count(MAX_PUBKEYS_PER_MULTISIG)?;
        self.count_ops(key_count)?;
        let keys = self.pop_many(key_count)?;

        let sig_count = self.pop_count(key_count)?;
        let signatures = self.pop_many(sig_count)?;

        if !self.stack.pop()?.is_empty() {
            return Err(ScriptError::NonNullDummy);
        }

        // Signatures must appear in the same order as their keys
        let checker = self.engine.checker;
        let mut keys_left = keys.iter();
        let mut valid = true;
        for signature in &signatures {
            let matched = !signature.is_empty()
                && keys_left.any(|key| {
                    checker.check_signature(signature, key, script_code, sig_version)
                });
            if !matched {
                valid = false;
                break;
            }
        }

        if !valid && signatures.iter().any(|signature| !signature.is_empty()) {
            self.signature_failed = true;
        }
        Ok(valid)
    }

    fn pop_count(&mut self, max: usize) -> Result<usize, ScriptError> {
        let value = decode_number(&self.stack.pop()?)?;
        usize::try_from(value)
            .ok()
            .filter(|count| *count <= max)
            .ok_or(ScriptError::InvalidMultisigCount)
    }

    /// Pop `count` values, returned in script (push) order
    fn pop_many(&mut self, count: usize) -> Result<Vec<Vec<u8>>, ScriptError> {
        let mut values = (0..count)
            .map(|_| self.stack.pop())
            .collect::<Result<Vec<_>, _>>()?;
        values.reverse();
        Ok(values)
    }

    fn count_ops(&mut self, count: usize) -> Result<(), ScriptError> {
        self.op_count += count;
        if self.op_count > MAX_OPS_PER_SCRIPT {
            return Err(ScriptError::OpCountExceeded);
        }
        Ok(())
    }

    /// Success requires exactly one truthy element
    fn finish(self) -> Result<(), ScriptError> {
        match self.stack.len() {
            1 if is_truthy(self.stack.top()?) => Ok(()),
            _ if self.signature_failed => Err(ScriptError::SignatureRejected),
            0 => Err(ScriptError::EmptyStack),
            1 => Err(ScriptError::EvalFalse),
            n => Err(ScriptError::CleanStack(n)),
        }
    }
}
