//! Signed transaction fixtures for unit tests
//!
//! Keys come from fixed secret bytes and signatures are RFC6979
//! deterministic, so every fixture is reproducible.

use crate::core::sighash::{signature_hash, spend_context, SigHashType};
use crate::core::transaction::{OutPoint, Transaction, TxInput, TxOutput};
use crate::crypto::{hash160, KeyPair};
use crate::script::{p2pkh_script, p2sh_script, p2wpkh_script};

/// Deterministic key pair from a one-byte seed
pub fn key(seed: u8) -> KeyPair {
    KeyPair::from_secret_bytes(&[seed.max(1); 32]).expect("valid secret key")
}

/// Deterministic outpoint
pub fn outpoint(seed: u8, vout: u32) -> OutPoint {
    OutPoint::new([seed; 32], vout)
}

/// Append a direct push (at most 75 bytes)
pub fn push_data(script: &mut Vec<u8>, data: &[u8]) {
    assert!(data.len() <= 75, "direct push limited to 75 bytes");
    script.push(data.len() as u8);
    script.extend_from_slice(data);
}

/// `<signature> <public key>`
pub fn p2pkh_unlocking(signature: &[u8], public_key: &[u8]) -> Vec<u8> {
    let mut script = Vec::new();
    push_data(&mut script, signature);
    push_data(&mut script, public_key);
    script
}

/// Sign one input, deriving the script code from its previous output
pub fn sign_input(
    key: &KeyPair,
    tx: &Transaction,
    input_index: usize,
    sighash_type: SigHashType,
) -> Vec<u8> {
    let (script_code, sig_version) = spend_context(tx, input_index).expect("input exists");
    let digest = signature_hash(tx, input_index, &script_code, sig_version, sighash_type)
        .expect("digest for existing input");
    let mut signature = key.sign_digest(&digest);
    signature.push(sighash_type.to_byte());
    signature
}

#[derive(Debug, Clone, Copy)]
enum SpendKind {
    P2pkh,
    P2pkhUncompressed,
    P2wpkh,
    P2shP2wpkh,
}

struct Spend {
    key: KeyPair,
    outpoint: OutPoint,
    value: i64,
    kind: SpendKind,
}

/// Builds transactions whose inputs are correctly signed
pub struct TxBuilder {
    version: i32,
    locktime: u32,
    spends: Vec<Spend>,
    outputs: Vec<TxOutput>,
}

impl Default for TxBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TxBuilder {
    pub fn new() -> Self {
        Self {
            version: 2,
            locktime: 0,
            spends: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn version(mut self, version: i32) -> Self {
        self.version = version;
        self
    }

    pub fn locktime(mut self, locktime: u32) -> Self {
        self.locktime = locktime;
        self
    }

    pub fn spend_p2pkh(self, key: &KeyPair, outpoint: OutPoint, value: i64) -> Self {
        self.spend(key, outpoint, value, SpendKind::P2pkh)
    }

    /// P2PKH spend locked to the 65-byte uncompressed public key
    pub fn spend_p2pkh_uncompressed(self, key: &KeyPair, outpoint: OutPoint, value: i64) -> Self {
        self.spend(key, outpoint, value, SpendKind::P2pkhUncompressed)
    }

    pub fn spend_p2wpkh(self, key: &KeyPair, outpoint: OutPoint, value: i64) -> Self {
        self.spend(key, outpoint, value, SpendKind::P2wpkh)
    }

    pub fn spend_p2sh_p2wpkh(self, key: &KeyPair, outpoint: OutPoint, value: i64) -> Self {
        self.spend(key, outpoint, value, SpendKind::P2shP2wpkh)
    }

    fn spend(mut self, key: &KeyPair, outpoint: OutPoint, value: i64, kind: SpendKind) -> Self {
        self.spends.push(Spend {
            key: key.clone(),
            outpoint,
            value,
            kind,
        });
        self
    }

    /// Add a P2PKH output
    pub fn pay(mut self, value: i64) -> Self {
        let recipient = [self.outputs.len() as u8 + 0x70; 20];
        self.outputs.push(TxOutput::new(value, p2pkh_script(&recipient)));
        self
    }

    /// Sign every input and assign the txid
    pub fn build(self) -> Transaction {
        let inputs = self
            .spends
            .iter()
            .map(|spend| {
                let key_hash = spend.key.public_key_hash();
                let (script_pubkey, script_sig) = match spend.kind {
                    SpendKind::P2pkh => (p2pkh_script(&key_hash), Vec::new()),
                    SpendKind::P2pkhUncompressed => (
                        p2pkh_script(&hash160(&spend.key.public_key_uncompressed())),
                        Vec::new(),
                    ),
                    SpendKind::P2wpkh => (p2wpkh_script(&key_hash), Vec::new()),
                    SpendKind::P2shP2wpkh => {
                        let redeem = p2wpkh_script(&key_hash);
                        let mut script_sig = Vec::new();
                        push_data(&mut script_sig, &redeem);
                        (p2sh_script(&hash160(&redeem)), script_sig)
                    }
                };
                TxInput::new(
                    spend.outpoint,
                    TxOutput::new(spend.value, script_pubkey),
                    script_sig,
                )
            })
            .collect();

        let mut tx = Transaction::new(self.version, self.locktime, inputs, self.outputs);

        // Digests never cover unlocking data, so signing order does not matter
        let signatures: Vec<Vec<u8>> = self
            .spends
            .iter()
            .enumerate()
            .map(|(index, spend)| sign_input(&spend.key, &tx, index, SigHashType::All))
            .collect();

        for ((input, spend), signature) in tx.inputs.iter_mut().zip(&self.spends).zip(signatures) {
            let public_key = spend.key.public_key_bytes();
            match spend.kind {
                SpendKind::P2pkh => input.script_sig = p2pkh_unlocking(&signature, &public_key),
                SpendKind::P2pkhUncompressed => {
                    let uncompressed = spend.key.public_key_uncompressed();
                    input.script_sig = p2pkh_unlocking(&signature, &uncompressed);
                }
                SpendKind::P2wpkh | SpendKind::P2shP2wpkh => {
                    input.witness = vec![signature, public_key];
                }
            }
        }

        Transaction::new(tx.version, tx.locktime, tx.inputs, tx.outputs)
    }
}
