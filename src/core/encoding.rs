//! Consensus serialization primitives
//!
//! Little-endian integers and compact-size length prefixes, the building
//! blocks of the transaction and sighash serializations.

/// Append-only byte buffer for consensus serialization
#[derive(Debug, Clone, Default)]
pub struct ByteWriter {
    buffer: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i64(&mut self, value: i64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Write a compact-size length prefix
    pub fn write_compact_size(&mut self, value: u64) {
        match value {
            0..=0xfc => self.buffer.push(value as u8),
            0xfd..=0xffff => {
                self.buffer.push(0xfd);
                self.buffer.extend_from_slice(&(value as u16).to_le_bytes());
            }
            0x1_0000..=0xffff_ffff => {
                self.buffer.push(0xfe);
                self.buffer.extend_from_slice(&(value as u32).to_le_bytes());
            }
            _ => {
                self.buffer.push(0xff);
                self.buffer.extend_from_slice(&value.to_le_bytes());
            }
        }
    }

    /// Write a length-prefixed byte string
    pub fn write_var_bytes(&mut self, bytes: &[u8]) {
        self.write_compact_size(bytes.len() as u64);
        self.write_bytes(bytes);
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }
}
