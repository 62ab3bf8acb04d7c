//! Script system
//!
//! Decoding, classification and execution of locking and unlocking scripts.

pub mod engine;
pub mod opcodes;
pub mod program;
pub mod types;

pub use engine::{
    is_truthy, ExecutionStack, ScriptEngine, ScriptError, ScriptFlags, SigVersion,
    SignatureChecker, MAX_OPS_PER_SCRIPT, MAX_SCRIPT_ELEMENT_SIZE, MAX_SCRIPT_SIZE,
    MAX_STACK_SIZE,
};
pub use opcodes::Opcode;
pub use program::{Instruction, ScriptProgram};
pub use types::{p2pkh_script, p2sh_script, p2wpkh_script, ScriptType, Template};
