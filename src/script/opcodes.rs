//! Script opcodes
//!
//! The subset of the Bitcoin script instruction set the engine understands.
//! Data pushes (OP_0, direct pushes, OP_PUSHDATA1/2/4, OP_1NEGATE, OP_1..OP_16)
//! are decoded into operands by the program parser and never reach this table.

use serde::{Deserialize, Serialize};

/// Push an empty byte string
pub const OP_0: u8 = 0x00;
/// Largest direct-push opcode (pushes 75 bytes)
pub const OP_PUSHBYTES_75: u8 = 0x4b;
/// Next byte holds the push length
pub const OP_PUSHDATA1: u8 = 0x4c;
/// Next two bytes (little endian) hold the push length
pub const OP_PUSHDATA2: u8 = 0x4d;
/// Next four bytes (little endian) hold the push length
pub const OP_PUSHDATA4: u8 = 0x4e;
/// Push the number -1
pub const OP_1NEGATE: u8 = 0x4f;
/// Push the number 1
pub const OP_1: u8 = 0x51;
/// Push the number 16
pub const OP_16: u8 = 0x60;

/// Non-push opcodes executed by the script engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    // Control (0x61 - 0x6A)
    /// Do nothing
    Nop = 0x61,
    /// Fail unless the top value is true, consuming it
    Verify = 0x69,
    /// Mark the script as unspendable
    Return = 0x6a,

    // Stack operations
    /// Remove the top value
    Drop = 0x75,
    /// Duplicate the top value
    Dup = 0x76,

    // Comparison
    /// Push true if the top two values are byte-equal
    Equal = 0x87,
    /// Equal followed by Verify
    EqualVerify = 0x88,

    // Hashing (0xA6 - 0xAA)
    /// RIPEMD-160 of the top value
    Ripemd160 = 0xa6,
    /// SHA-256 of the top value
    Sha256 = 0xa8,
    /// RIPEMD-160 of SHA-256 of the top value
    Hash160 = 0xa9,
    /// Double SHA-256 of the top value
    Hash256 = 0xaa,

    // Signatures (0xAC - 0xAF)
    /// Check a signature against a public key
    CheckSig = 0xac,
    /// CheckSig followed by Verify
    CheckSigVerify = 0xad,
    /// Check m-of-n signatures
    CheckMultiSig = 0xae,
    /// CheckMultiSig followed by Verify
    CheckMultiSigVerify = 0xaf,
}

impl Opcode {
    /// Convert a byte to an opcode, if the engine supports it
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x61 => Some(Opcode::Nop),
            0x69 => Some(Opcode::Verify),
            0x6a => Some(Opcode::Return),
            0x75 => Some(Opcode::Drop),
            0x76 => Some(Opcode::Dup),
            0x87 => Some(Opcode::Equal),
            0x88 => Some(Opcode::EqualVerify),
            0xa6 => Some(Opcode::Ripemd160),
            0xa8 => Some(Opcode::Sha256),
            0xa9 => Some(Opcode::Hash160),
            0xaa => Some(Opcode::Hash256),
            0xac => Some(Opcode::CheckSig),
            0xad => Some(Opcode::CheckSigVerify),
            0xae => Some(Opcode::CheckMultiSig),
            0xaf => Some(Opcode::CheckMultiSigVerify),
            _ => None,
        }
    }

    /// Get the opcode as a byte
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// Get the opcode name, as rendered in script assembly
    pub fn name(&self) -> &'static str {
        match self {
            Opcode::Nop => "OP_NOP",
            Opcode::Verify => "OP_VERIFY",
            Opcode::Return => "OP_RETURN",
            Opcode::Drop => "OP_DROP",
            Opcode::Dup => "OP_DUP",
            Opcode::Equal => "OP_EQUAL",
            Opcode::EqualVerify => "OP_EQUALVERIFY",
            Opcode::Ripemd160 => "OP_RIPEMD160",
            Opcode::Sha256 => "OP_SHA256",
            Opcode::Hash160 => "OP_HASH160",
            Opcode::Hash256 => "OP_HASH256",
            Opcode::CheckSig => "OP_CHECKSIG",
            Opcode::CheckSigVerify => "OP_CHECKSIGVERIFY",
            Opcode::CheckMultiSig => "OP_CHECKMULTISIG",
            Opcode::CheckMultiSigVerify => "OP_CHECKMULTISIGVERIFY",
        }
    }
}
