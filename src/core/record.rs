//! Mempool record format
//!
//! One JSON document per candidate transaction. Script fields arrive as hex
//! text and are decoded here; anything that cannot be decoded becomes a
//! structural rejection for that record alone.

use serde::{Deserialize, Serialize};

use super::transaction::{OutPoint, Transaction, TxInput, TxOutput};
use super::validation::{RejectReason, StructuralError};
use crate::crypto::reversed_hex;
use crate::script::ScriptProgram;

/// A transaction as stored in the mempool directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub version: i64,
    pub locktime: i64,
    pub vin: Vec<InputRecord>,
    pub vout: Vec<OutputRecord>,
}

/// An input record with its embedded previous output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputRecord {
    pub txid: String,
    pub vout: u32,
    #[serde(default)]
    pub prevout: Option<OutputRecord>,
    #[serde(default)]
    pub scriptsig: String,
    #[serde(default)]
    pub scriptsig_asm: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub witness: Vec<String>,
    #[serde(default)]
    pub is_coinbase: bool,
    pub sequence: u32,
}

/// An output record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub scriptpubkey: String,
    #[serde(default)]
    pub scriptpubkey_asm: String,
    #[serde(default)]
    pub scriptpubkey_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scriptpubkey_address: Option<String>,
    pub value: i64,
}

impl TransactionRecord {
    /// Parse a record from JSON bytes
    ///
    /// Bytes that are not UTF-8 are a malformed record like any other parse
    /// failure.
    pub fn from_json(json: impl AsRef<[u8]>) -> Result<Self, StructuralError> {
        serde_json::from_slice(json.as_ref())
            .map_err(|e| StructuralError::MalformedRecord(e.to_string()))
    }

    /// Decode into a transaction ready for validation
    ///
    /// A locktime too large for the transaction's 32-bit field is reported as
    /// out of range rather than as a structural error.
    pub fn to_transaction(&self) -> Result<Transaction, RejectReason> {
        if self.locktime > i64::from(u32::MAX) {
            return Err(RejectReason::LocktimeOutOfRange(self.locktime));
        }
        Ok(Transaction::try_from(self)?)
    }

    /// Render the record as pretty JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

fn decode_hex(text: &str, field: impl FnOnce() -> String) -> Result<Vec<u8>, StructuralError> {
    hex::decode(text).map_err(|e| StructuralError::InvalidHex {
        field: field(),
        reason: e.to_string(),
    })
}

impl OutputRecord {
    /// Decode into an output, reclassifying the script
    ///
    /// The script type is always derived from the script bytes; the record's
    /// address is kept when present and derived otherwise.
    fn to_output(&self, field: &str) -> Result<TxOutput, StructuralError> {
        let script = decode_hex(&self.scriptpubkey, || format!("{field}.scriptpubkey"))?;
        let mut output = TxOutput::new(self.value, script);
        if let Some(address) = &self.scriptpubkey_address {
            output.address = Some(address.clone());
        }
        Ok(output)
    }
}

impl From<&TxOutput> for OutputRecord {
    fn from(output: &TxOutput) -> Self {
        Self {
            scriptpubkey: hex::encode(&output.script_pubkey),
            scriptpubkey_asm: render_asm(&output.script_pubkey),
            scriptpubkey_type: output.script_type.type_name().to_string(),
            scriptpubkey_address: output.address.clone(),
            value: output.value,
        }
    }
}

fn render_asm(script: &[u8]) -> String {
    ScriptProgram::parse(script)
        .map(|program| program.to_string())
        .unwrap_or_default()
}

impl TryFrom<&TransactionRecord> for Transaction {
    type Error = StructuralError;

    fn try_from(record: &TransactionRecord) -> Result<Self, Self::Error> {
        let version = i32::try_from(record.version)
            .map_err(|_| StructuralError::UnsupportedVersion(record.version))?;
        let locktime = u32::try_from(record.locktime)
            .map_err(|_| StructuralError::InvalidLocktime(record.locktime))?;

        let inputs = record
            .vin
            .iter()
            .enumerate()
            .map(|(index, input)| -> Result<TxInput, StructuralError> {
                let mut txid: [u8; 32] = decode_hex(&input.txid, || format!("vin[{index}].txid"))?
                    .try_into()
                    .map_err(|bytes: Vec<u8>| StructuralError::InvalidTxidLength {
                        index,
                        len: bytes.len(),
                    })?;
                txid.reverse();

                let prevout = input
                    .prevout
                    .as_ref()
                    .ok_or(StructuralError::MissingPrevout(index))?
                    .to_output(&format!("vin[{index}].prevout"))?;

                let script_sig =
                    decode_hex(&input.scriptsig, || format!("vin[{index}].scriptsig"))?;

                let witness = input
                    .witness
                    .iter()
                    .enumerate()
                    .map(|(item, text)| {
                        decode_hex(text, || format!("vin[{index}].witness[{item}]"))
                    })
                    .collect::<Result<Vec<_>, _>>()?;

                let mut tx_input = TxInput::new(OutPoint::new(txid, input.vout), prevout, script_sig)
                    .with_witness(witness)
                    .with_sequence(input.sequence);
                tx_input.is_coinbase = input.is_coinbase;
                Ok(tx_input)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let outputs = record
            .vout
            .iter()
            .enumerate()
            .map(|(index, output)| output.to_output(&format!("vout[{index}]")))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Transaction::new(version, locktime, inputs, outputs))
    }
}

impl From<&Transaction> for TransactionRecord {
    fn from(tx: &Transaction) -> Self {
        let vin = tx
            .inputs
            .iter()
            .map(|input| InputRecord {
                txid: reversed_hex(&input.previous_output.txid),
                vout: input.previous_output.vout,
                prevout: Some(OutputRecord::from(&input.prevout)),
                scriptsig: hex::encode(&input.script_sig),
                scriptsig_asm: render_asm(&input.script_sig),
                witness: input.witness.iter().map(hex::encode).collect(),
                is_coinbase: input.is_coinbase,
                sequence: input.sequence,
            })
            .collect();

        Self {
            version: i64::from(tx.version),
            locktime: i64::from(tx.locktime),
            vin,
            vout: tx.outputs.iter().map(OutputRecord::from).collect(),
        }
    }
}
