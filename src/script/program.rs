//! Script program decoding
//!
//! Turns the raw bytes of a locking or unlocking script into an ordered list
//! of instructions: data pushes with their operands, and operators.

use std::fmt;

use super::engine::{ScriptError, MAX_SCRIPT_ELEMENT_SIZE, MAX_SCRIPT_SIZE};
use super::opcodes::{
    Opcode, OP_0, OP_1, OP_16, OP_1NEGATE, OP_PUSHBYTES_75, OP_PUSHDATA1, OP_PUSHDATA2,
    OP_PUSHDATA4,
};

/// A single decoded script instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// Push an operand onto the stack
    Push(Vec<u8>),
    /// An operator the engine implements
    Op(Opcode),
    /// An operator the engine does not implement; fails if executed
    Unknown(u8),
}

impl Instruction {
    /// Check if this instruction only pushes data
    pub fn is_push(&self) -> bool {
        matches!(self, Instruction::Push(_))
    }
}

/// A decoded locking or unlocking script
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptProgram {
    instructions: Vec<Instruction>,
}

impl ScriptProgram {
    /// Decode a script from its byte form
    pub fn parse(script: &[u8]) -> Result<Self, ScriptError> {
        if script.len() > MAX_SCRIPT_SIZE {
            return Err(ScriptError::ScriptTooLarge(script.len()));
        }

        let mut instructions = Vec::new();
        let mut pc = 0;

        while pc < script.len() {
            let byte = script[pc];
            pc += 1;

            let instruction = match byte {
                OP_0 => Instruction::Push(Vec::new()),
                0x01..=OP_PUSHBYTES_75 => {
                    Instruction::Push(read_bytes(script, &mut pc, byte as usize)?)
                }
                OP_PUSHDATA1 => {
                    let len = read_length(script, &mut pc, 1)?;
                    Instruction::Push(read_bytes(script, &mut pc, len)?)
                }
                OP_PUSHDATA2 => {
                    let len = read_length(script, &mut pc, 2)?;
                    Instruction::Push(read_bytes(script, &mut pc, len)?)
                }
                OP_PUSHDATA4 => {
                    let len = read_length(script, &mut pc, 4)?;
                    Instruction::Push(read_bytes(script, &mut pc, len)?)
                }
                OP_1NEGATE => Instruction::Push(vec![0x81]),
                OP_1..=OP_16 => Instruction::Push(vec![byte - OP_1 + 1]),
                _ => Opcode::from_byte(byte)
                    .map(Instruction::Op)
                    .unwrap_or(Instruction::Unknown(byte)),
            };

            instructions.push(instruction);
        }

        Ok(Self { instructions })
    }

    /// The decoded instructions, in script order
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Number of instructions
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Check if the script has no instructions
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Check if every instruction is a data push
    pub fn is_push_only(&self) -> bool {
        self.instructions.iter().all(Instruction::is_push)
    }

    /// Operands of a push-only script, in push order
    pub fn pushed_data(&self) -> Option<Vec<&[u8]>> {
        self.instructions
            .iter()
            .map(|instruction| match instruction {
                Instruction::Push(data) => Some(data.as_slice()),
                _ => None,
            })
            .collect()
    }

    /// The operand of the final instruction, if it is a push
    pub fn last_push(&self) -> Option<&[u8]> {
        match self.instructions.last() {
            Some(Instruction::Push(data)) => Some(data),
            _ => None,
        }
    }
}

impl fmt::Display for ScriptProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, instruction) in self.instructions.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            match instruction {
                Instruction::Push(data) if data.is_empty() => write!(f, "OP_0")?,
                Instruction::Push(data) => {
                    write!(f, "OP_PUSHBYTES_{} {}", data.len(), hex::encode(data))?
                }
                Instruction::Op(op) => write!(f, "{}", op.name())?,
                Instruction::Unknown(byte) => write!(f, "OP_UNKNOWN_{:#04x}", byte)?,
            }
        }
        Ok(())
    }
}

/// Read a little-endian push length of `width` bytes
fn read_length(script: &[u8], pc: &mut usize, width: usize) -> Result<usize, ScriptError> {
    let bytes = read_slice(script, pc, width)?;
    Ok(bytes
        .iter()
        .rev()
        .fold(0usize, |acc, byte| (acc << 8) | *byte as usize))
}

/// Read a push operand, enforcing the element size limit
fn read_bytes(script: &[u8], pc: &mut usize, len: usize) -> Result<Vec<u8>, ScriptError> {
    if len > MAX_SCRIPT_ELEMENT_SIZE {
        return Err(ScriptError::PushSizeExceeded(len));
    }
    Ok(read_slice(script, pc, len)?.to_vec())
}

fn read_slice<'a>(script: &'a [u8], pc: &mut usize, len: usize) -> Result<&'a [u8], ScriptError> {
    let end = pc
        .checked_add(len)
        .filter(|end| *end <= script.len())
        .ok_or(ScriptError::MalformedPush)?;
    let slice = &script[*pc..end];
    *pc = end;
    Ok(slice)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_p2pkh_locking_script() {
        let mut script = vec![0x76, 0xa9, 0x14];
        script.extend_from_slice(&[0x11; 20]);
        script.extend_from_slice(&[0x88, 0xac]);

        let program = ScriptProgram::parse(&script).unwrap();
        assert_eq!(program.len(), 5);
        assert_eq!(program.instructions()[0], Instruction::Op(Opcode::Dup));
        assert_eq!(program.instructions()[2], Instruction::Push(vec![0x11; 20]));
        assert!(!program.is_push_only());
    }

    #[test]
    fn test_parse_pushdata_forms() {
        let mut script = vec![OP_PUSHDATA1, 3, 1, 2, 3];
        script.extend_from_slice(&[OP_PUSHDATA2, 2, 0, 9, 9]);
        script.extend_from_slice(&[OP_PUSHDATA4, 1, 0, 0, 0, 7]);
        script.extend_from_slice(&[OP_0, OP_1NEGATE, 0x53]);

        let program = ScriptProgram::parse(&script).unwrap();
        let pushes = program.pushed_data().unwrap();
        assert_eq!(pushes[0], &[1, 2, 3]);
        assert_eq!(pushes[1], &[9, 9]);
        assert_eq!(pushes[2], &[7]);
        assert!(pushes[3].is_empty());
        assert_eq!(pushes[4], &[0x81]);
        assert_eq!(pushes[5], &[3]); // OP_3
        assert_eq!(program.last_push(), Some(&[3u8][..]));
    }

    #[test]
    fn test_truncated_push_is_malformed() {
        assert!(matches!(
            ScriptProgram::parse(&[0x05, 1, 2]),
            Err(ScriptError::MalformedPush)
        ));
        assert!(matches!(
            ScriptProgram::parse(&[OP_PUSHDATA2, 0xff]),
            Err(ScriptError::MalformedPush)
        ));
    }

    #[test]
    fn test_oversized_push_rejected() {
        let mut script = vec![OP_PUSHDATA2];
        script.extend_from_slice(&(600u16).to_le_bytes());
        script.extend(vec![0u8; 600]);
        assert!(matches!(
            ScriptProgram::parse(&script),
            Err(ScriptError::PushSizeExceeded(600))
        ));
    }

    #[test]
    fn test_oversized_script_rejected() {
        let script = vec![0x61; MAX_SCRIPT_SIZE + 1];
        assert!(matches!(
            ScriptProgram::parse(&script),
            Err(ScriptError::ScriptTooLarge(_))
        ));
    }

    #[test]
    fn test_unknown_opcode_is_kept() {
        let program = ScriptProgram::parse(&[0x93]).unwrap(); // OP_ADD
        assert_eq!(program.instructions()[0], Instruction::Unknown(0x93));
        assert!(program.pushed_data().is_none());
    }

    #[test]
    fn test_display_asm() {
        let program = ScriptProgram::parse(&[0xa9, 0x02, 0xab, 0xcd, 0x87]).unwrap();
        assert_eq!(
            program.to_string(),
            "OP_HASH160 OP_PUSHBYTES_2 abcd OP_EQUAL"
        );
    }
}
