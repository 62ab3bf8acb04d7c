//! Signature hashing and verification
//!
//! Builds the canonical digest a signature commits to and verifies ECDSA
//! signatures over it:
//! - Legacy digest with all sighash types, ANYONECANPAY included
//! - Witness v0 digest (BIP143) committing to the spent value
//! - DER signatures with a trailing sighash byte, low-S policy

use secp256k1::{ecdsa::Signature, Message, PublicKey, Secp256k1, VerifyOnly};
use thiserror::Error;

use super::encoding::ByteWriter;
use super::transaction::Transaction;
use crate::crypto::{double_sha256, Hash256};
use crate::script::{
    p2pkh_script, types::looks_like_public_key, ScriptProgram, SigVersion, SignatureChecker,
    Template,
};

// =============================================================================
// Signature Hash Types
// =============================================================================

/// Which parts of the transaction a signature commits to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SigHashType {
    /// Sign all inputs and all outputs
    #[default]
    All = 0x01,
    /// Sign all inputs but no outputs (blank check)
    None = 0x02,
    /// Sign all inputs and only the output with same index
    Single = 0x03,
    /// SIGHASH_ALL | SIGHASH_ANYONECANPAY
    AllAnyoneCanPay = 0x81,
    /// SIGHASH_NONE | SIGHASH_ANYONECANPAY
    NoneAnyoneCanPay = 0x82,
    /// SIGHASH_SINGLE | SIGHASH_ANYONECANPAY
    SingleAnyoneCanPay = 0x83,
}

impl SigHashType {
    /// Parse sighash type from byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(SigHashType::All),
            0x02 => Some(SigHashType::None),
            0x03 => Some(SigHashType::Single),
            0x81 => Some(SigHashType::AllAnyoneCanPay),
            0x82 => Some(SigHashType::NoneAnyoneCanPay),
            0x83 => Some(SigHashType::SingleAnyoneCanPay),
            _ => None,
        }
    }

    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// Check if this sighash includes ANYONECANPAY flag
    pub fn is_anyone_can_pay(&self) -> bool {
        (*self as u8) & 0x80 != 0
    }

    /// Get the base type (without ANYONECANPAY flag)
    pub fn base_type(&self) -> SigHashType {
        match (*self as u8) & 0x1f {
            0x02 => SigHashType::None,
            0x03 => SigHashType::Single,
            _ => SigHashType::All,
        }
    }
}

/// Signature verifier errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("Input {0} carries no public key")]
    MissingPublicKey(usize),
    #[error("Input index {0} out of range")]
    InputOutOfRange(usize),
}

/// Digest returned for SIGHASH_SINGLE without a matching output
fn sighash_one() -> Hash256 {
    let mut one = [0u8; 32];
    one[0] = 1;
    one
}

// =============================================================================
// Digests
// =============================================================================

/// Legacy signature digest
///
/// The signed input's script is replaced by `script_code`, every other input's
/// script is blanked, and the sighash type is appended as a 32-bit integer.
pub fn legacy_sighash(
    tx: &Transaction,
    input_index: usize,
    script_code: &[u8],
    sighash_type: SigHashType,
) -> Hash256 {
    if input_index >= tx.inputs.len() {
        return sighash_one();
    }

    let base = sighash_type.base_type();
    if base == SigHashType::Single && input_index >= tx.outputs.len() {
        return sighash_one();
    }

    let mut writer = ByteWriter::new();
    writer.write_i32(tx.version);

    if sighash_type.is_anyone_can_pay() {
        let input = &tx.inputs[input_index];
        writer.write_compact_size(1);
        writer.write_bytes(&input.previous_output.txid);
        writer.write_u32(input.previous_output.vout);
        writer.write_var_bytes(script_code);
        writer.write_u32(input.sequence);
    } else {
        writer.write_compact_size(tx.inputs.len() as u64);
        for (i, input) in tx.inputs.iter().enumerate() {
            writer.write_bytes(&input.previous_output.txid);
            writer.write_u32(input.previous_output.vout);
            if i == input_index {
                writer.write_var_bytes(script_code);
            } else {
                writer.write_compact_size(0);
            }
            // NONE and SINGLE let the other inputs update their sequence
            if i != input_index && base != SigHashType::All {
                writer.write_u32(0);
            } else {
                writer.write_u32(input.sequence);
            }
        }
    }

    match base {
        SigHashType::None => writer.write_compact_size(0),
        SigHashType::Single => {
            writer.write_compact_size(input_index as u64 + 1);
            for _ in 0..input_index {
                writer.write_i64(-1);
                writer.write_compact_size(0);
            }
            let output = &tx.outputs[input_index];
            writer.write_i64(output.value);
            writer.write_var_bytes(&output.script_pubkey);
        }
        _ => {
            writer.write_compact_size(tx.outputs.len() as u64);
            for output in &tx.outputs {
                writer.write_i64(output.value);
                writer.write_var_bytes(&output.script_pubkey);
            }
        }
    }

    writer.write_u32(tx.locktime);
    writer.write_u32(u32::from(sighash_type.to_byte()));
    double_sha256(&writer.into_bytes())
}

/// Witness v0 signature digest (BIP143)
pub fn witness_v0_sighash(
    tx: &Transaction,
    input_index: usize,
    script_code: &[u8],
    sighash_type: SigHashType,
) -> Option<Hash256> {
    let input = tx.inputs.get(input_index)?;
    let base = sighash_type.base_type();
    let anyone_can_pay = sighash_type.is_anyone_can_pay();

    let hash_prevouts = if anyone_can_pay {
        [0u8; 32]
    } else {
        let mut writer = ByteWriter::new();
        for input in &tx.inputs {
            writer.write_bytes(&input.previous_output.txid);
            writer.write_u32(input.previous_output.vout);
        }
        double_sha256(&writer.into_bytes())
    };

    let hash_sequence = if anyone_can_pay || base != SigHashType::All {
        [0u8; 32]
    } else {
        let mut writer = ByteWriter::new();
        for input in &tx.inputs {
            writer.write_u32(input.sequence);
        }
        double_sha256(&writer.into_bytes())
    };

    let hash_outputs = match base {
        SigHashType::All => {
            let mut writer = ByteWriter::new();
            for output in &tx.outputs {
                writer.write_i64(output.value);
                writer.write_var_bytes(&output.script_pubkey);
            }
            double_sha256(&writer.into_bytes())
        }
        SigHashType::Single if input_index < tx.outputs.len() => {
            let output = &tx.outputs[input_index];
            let mut writer = ByteWriter::new();
            writer.write_i64(output.value);
            writer.write_var_bytes(&output.script_pubkey);
            double_sha256(&writer.into_bytes())
        }
        _ => [0u8; 32],
    };

    let mut writer = ByteWriter::with_capacity(160 + script_code.len());
    writer.write_i32(tx.version);
    writer.write_bytes(&hash_prevouts);
    writer.write_bytes(&hash_sequence);
    writer.write_bytes(&input.previous_output.txid);
    writer.write_u32(input.previous_output.vout);
    writer.write_var_bytes(script_code);
    writer.write_i64(input.prevout.value);
    writer.write_u32(input.sequence);
    writer.write_bytes(&hash_outputs);
    writer.write_u32(tx.locktime);
    writer.write_u32(u32::from(sighash_type.to_byte()));
    Some(double_sha256(&writer.into_bytes()))
}

/// Digest for one input under the given sighash version
pub fn signature_hash(
    tx: &Transaction,
    input_index: usize,
    script_code: &[u8],
    sig_version: SigVersion,
    sighash_type: SigHashType,
) -> Option<Hash256> {
    match sig_version {
        SigVersion::Base => Some(legacy_sighash(tx, input_index, script_code, sighash_type)),
        SigVersion::WitnessV0 => witness_v0_sighash(tx, input_index, script_code, sighash_type),
    }
}

// =============================================================================
// Signature Verifier
// =============================================================================

/// Verifies ECDSA signatures over transaction digests
pub struct SignatureVerifier {
    secp: Secp256k1<VerifyOnly>,
    require_low_s: bool,
}

impl Default for SignatureVerifier {
    fn default() -> Self {
        Self::new(true)
    }
}

impl SignatureVerifier {
    pub fn new(require_low_s: bool) -> Self {
        Self {
            secp: Secp256k1::verification_only(),
            require_low_s,
        }
    }

    /// Verify a signature for one input of `tx`
    ///
    /// The script code and digest version are derived from the input's
    /// embedded previous output. Returns false, never an error, on any failure.
    pub fn verify(
        &self,
        signature: &[u8],
        public_key: &[u8],
        tx: &Transaction,
        input_index: usize,
    ) -> bool {
        match spend_context(tx, input_index) {
            Some((script_code, sig_version)) => self.verify_with_script_code(
                signature,
                public_key,
                tx,
                input_index,
                &script_code,
                sig_version,
            ),
            None => false,
        }
    }

    /// Verify a signature against an explicit script code
    pub fn verify_with_script_code(
        &self,
        signature: &[u8],
        public_key: &[u8],
        tx: &Transaction,
        input_index: usize,
        script_code: &[u8],
        sig_version: SigVersion,
    ) -> bool {
        let Some((&hash_byte, der)) = signature.split_last() else {
            return false;
        };
        let Some(sighash_type) = SigHashType::from_byte(hash_byte) else {
            return false;
        };
        let Ok(mut sig) = Signature::from_der(der) else {
            return false;
        };
        let Ok(key) = PublicKey::from_slice(public_key) else {
            return false;
        };

        let mut normalized = sig;
        normalized.normalize_s();
        if normalized != sig {
            if self.require_low_s {
                return false;
            }
            sig = normalized;
        }

        let Some(digest) = signature_hash(tx, input_index, script_code, sig_version, sighash_type)
        else {
            return false;
        };

        self.secp
            .verify_ecdsa(&Message::from_digest(digest), &sig, &key)
            .is_ok()
    }

    /// Locate the public key an input presents
    ///
    /// The trailing push of the unlocking script when it has the shape of a
    /// public key, otherwise the top (last) witness item. A P2WPKH witness is
    /// `[signature, public key]`, so the first item would be the signature.
    pub fn extract_public_key(
        &self,
        tx: &Transaction,
        input_index: usize,
    ) -> Result<Vec<u8>, SignatureError> {
        let input = tx
            .inputs
            .get(input_index)
            .ok_or(SignatureError::InputOutOfRange(input_index))?;

        let trailing_push = ScriptProgram::parse(&input.script_sig)
            .ok()
            .and_then(|program| program.last_push().map(<[u8]>::to_vec));
        if let Some(data) = trailing_push.filter(|data| looks_like_public_key(data)) {
            return Ok(data);
        }

        input
            .witness
            .last()
            .filter(|item| !item.is_empty())
            .cloned()
            .ok_or(SignatureError::MissingPublicKey(input_index))
    }
}

/// Script code and digest version for an input, from its previous output
pub(crate) fn spend_context(tx: &Transaction, input_index: usize) -> Option<(Vec<u8>, SigVersion)> {
    let input = tx.inputs.get(input_index)?;
    let script_pubkey = &input.prevout.script_pubkey;

    match Template::match_script(script_pubkey) {
        Template::P2WPKH { key_hash } => Some((p2pkh_script(key_hash), SigVersion::WitnessV0)),
        Template::P2SH { .. } => {
            let program = ScriptProgram::parse(&input.script_sig).ok()?;
            let redeem_script = program.last_push()?;
            match Template::match_script(redeem_script) {
                Template::P2WPKH { key_hash } => {
                    Some((p2pkh_script(key_hash), SigVersion::WitnessV0))
                }
                _ => Some((redeem_script.to_vec(), SigVersion::Base)),
            }
        }
        _ => Some((script_pubkey.clone(), SigVersion::Base)),
    }
}

// =============================================================================
// Engine adapter
// =============================================================================

/// Binds a [`SignatureVerifier`] to one input of one transaction
pub struct TransactionSignatureChecker<'a> {
    verifier: &'a SignatureVerifier,
    tx: &'a Transaction,
    input_index: usize,
}

impl<'a> TransactionSignatureChecker<'a> {
    pub fn new(verifier: &'a SignatureVerifier, tx: &'a Transaction, input_index: usize) -> Self {
        Self {
            verifier,
            tx,
            input_index,
        }
    }
}

impl SignatureChecker for TransactionSignatureChecker<'_> {
    fn check_signature(
        &self,
        signature: &[u8],
        public_key: &[u8],
        script_code: &[u8],
        sig_version: SigVersion,
    ) -> bool {
        self.verifier.verify_with_script_code(
            signature,
            public_key,
            self.tx,
            self.input_index,
            script_code,
            sig_version,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transaction::{OutPoint, TxInput, TxOutput};
    use crate::crypto::KeyPair;
    use crate::testing::{p2pkh_unlocking, sign_input};

    fn key() -> KeyPair {
        KeyPair::from_secret_bytes(&[0x21; 32]).unwrap()
    }

    fn two_input_tx(kp: &KeyPair) -> Transaction {
        let prevout = TxOutput::new(10_000, p2pkh_script(&kp.public_key_hash()));
        let inputs = (0..2u32)
            .map(|vout| TxInput::new(OutPoint::new([0x33; 32], vout), prevout.clone(), Vec::new()))
            .collect();
        let outputs = vec![
            TxOutput::new(7_000, p2pkh_script(&[0x44; 20])),
            TxOutput::new(2_000, p2pkh_script(&[0x55; 20])),
        ];
        Transaction::new(1, 0, inputs, outputs)
    }

    #[test]
    fn test_sighash_type_bytes() {
        assert_eq!(SigHashType::from_byte(0x81), Some(SigHashType::AllAnyoneCanPay));
        assert!(SigHashType::AllAnyoneCanPay.is_anyone_can_pay());
        assert_eq!(SigHashType::SingleAnyoneCanPay.base_type(), SigHashType::Single);
        assert_eq!(SigHashType::from_byte(0x04), None);
        assert_eq!(SigHashType::from_byte(0x80), None);
        assert_eq!(SigHashType::default(), SigHashType::All);
    }

    #[test]
    fn test_legacy_digest_commits_to_input_index() {
        let kp = key();
        let tx = two_input_tx(&kp);
        let code = p2pkh_script(&kp.public_key_hash());
        let first = legacy_sighash(&tx, 0, &code, SigHashType::All);
        let second = legacy_sighash(&tx, 1, &code, SigHashType::All);
        assert_ne!(first, second);
        assert_eq!(first, legacy_sighash(&tx, 0, &code, SigHashType::All));
    }

    #[test]
    fn test_legacy_digest_ignores_unlocking_scripts() {
        let kp = key();
        let mut tx = two_input_tx(&kp);
        let code = p2pkh_script(&kp.public_key_hash());
        let before = legacy_sighash(&tx, 0, &code, SigHashType::All);
        tx.inputs[1].script_sig = vec![0x51; 10];
        tx.inputs[0].script_sig = vec![0x52; 10];
        assert_eq!(before, legacy_sighash(&tx, 0, &code, SigHashType::All));
    }

    #[test]
    fn test_sighash_none_ignores_outputs() {
        let kp = key();
        let mut tx = two_input_tx(&kp);
        let code = p2pkh_script(&kp.public_key_hash());
        let none = legacy_sighash(&tx, 0, &code, SigHashType::None);
        let all = legacy_sighash(&tx, 0, &code, SigHashType::All);
        tx.outputs[0].value = 1;
        assert_eq!(none, legacy_sighash(&tx, 0, &code, SigHashType::None));
        assert_ne!(all, legacy_sighash(&tx, 0, &code, SigHashType::All));
    }

    #[test]
    fn test_sighash_single_without_output_is_one() {
        let kp = key();
        let mut tx = two_input_tx(&kp);
        tx.outputs.truncate(1);
        let code = p2pkh_script(&kp.public_key_hash());
        assert_eq!(legacy_sighash(&tx, 1, &code, SigHashType::Single), sighash_one());
        assert_ne!(legacy_sighash(&tx, 0, &code, SigHashType::Single), sighash_one());
    }

    #[test]
    fn test_anyone_can_pay_ignores_other_inputs() {
        let kp = key();
        let mut tx = two_input_tx(&kp);
        let code = p2pkh_script(&kp.public_key_hash());
        let digest = legacy_sighash(&tx, 0, &code, SigHashType::AllAnyoneCanPay);
        let witness_digest = witness_v0_sighash(&tx, 0, &code, SigHashType::AllAnyoneCanPay);
        tx.inputs[1].previous_output.vout = 9;
        assert_eq!(digest, legacy_sighash(&tx, 0, &code, SigHashType::AllAnyoneCanPay));
        assert_eq!(
            witness_digest,
            witness_v0_sighash(&tx, 0, &code, SigHashType::AllAnyoneCanPay)
        );
    }

    #[test]
    fn test_witness_digest_commits_to_spent_value() {
        let kp = key();
        let mut tx = two_input_tx(&kp);
        let code = p2pkh_script(&kp.public_key_hash());
        let before = witness_v0_sighash(&tx, 0, &code, SigHashType::All).unwrap();
        tx.inputs[0].prevout.value += 1;
        let after = witness_v0_sighash(&tx, 0, &code, SigHashType::All).unwrap();
        assert_ne!(before, after);
        assert!(witness_v0_sighash(&tx, 5, &code, SigHashType::All).is_none());
    }

    #[test]
    fn test_verify_signed_input() {
        let kp = key();
        let mut tx = two_input_tx(&kp);
        let signature = sign_input(&kp, &tx, 0, SigHashType::All);
        tx.inputs[0].script_sig = p2pkh_unlocking(&signature, &kp.public_key_bytes());
        let tx = Transaction::new(tx.version, tx.locktime, tx.inputs, tx.outputs);

        let verifier = SignatureVerifier::default();
        let public_key = kp.public_key_bytes();
        assert!(verifier.verify(&signature, &public_key, &tx, 0));
        // Bound to input 0
        assert!(!verifier.verify(&signature, &public_key, &tx, 1));
        // Wrong key
        let other = KeyPair::from_secret_bytes(&[0x22; 32]).unwrap();
        assert!(!verifier.verify(&signature, &other.public_key_bytes(), &tx, 0));
        // Changing the sighash byte changes the digest
        let mut retagged = signature.clone();
        *retagged.last_mut().unwrap() = SigHashType::None.to_byte();
        assert!(!verifier.verify(&retagged, &public_key, &tx, 0));
    }

    #[test]
    fn test_verify_rejects_garbage_without_panicking() {
        let kp = key();
        let tx = two_input_tx(&kp);
        let verifier = SignatureVerifier::default();
        let public_key = kp.public_key_bytes();
        assert!(!verifier.verify(&[], &public_key, &tx, 0));
        assert!(!verifier.verify(&[0x30, 0x01, 0x01], &public_key, &tx, 0));
        assert!(!verifier.verify(&[0x01; 72], &[0x02; 33], &tx, 0));
        assert!(!verifier.verify(&[0x01; 72], &public_key, &tx, 7));
    }

    #[test]
    fn test_high_s_policy() {
        let kp = key();
        let tx = two_input_tx(&kp);
        let signature = sign_input(&kp, &tx, 0, SigHashType::All);

        // Re-encode with s replaced by n - s
        let (&hash_byte, der) = signature.split_last().unwrap();
        let compact = Signature::from_der(der).unwrap().serialize_compact();
        let mut s = [0u8; 32];
        s.copy_from_slice(&compact[32..]);
        let order = secp256k1::constants::CURVE_ORDER;
        let mut high_s = [0u8; 32];
        let mut borrow = 0i16;
        for i in (0..32).rev() {
            let diff = order[i] as i16 - s[i] as i16 - borrow;
            borrow = i16::from(diff < 0);
            high_s[i] = diff.rem_euclid(256) as u8;
        }
        let mut high = [0u8; 64];
        high[..32].copy_from_slice(&compact[..32]);
        high[32..].copy_from_slice(&high_s);
        let mut high_signature = Signature::from_compact(&high).unwrap().serialize_der().to_vec();
        high_signature.push(hash_byte);

        let public_key = kp.public_key_bytes();
        assert!(!SignatureVerifier::new(true).verify(&high_signature, &public_key, &tx, 0));
        assert!(SignatureVerifier::new(false).verify(&high_signature, &public_key, &tx, 0));
    }

    #[test]
    fn test_extract_public_key() {
        let kp = key();
        let mut tx = two_input_tx(&kp);
        let verifier = SignatureVerifier::default();
        let public_key = kp.public_key_bytes();

        tx.inputs[0].script_sig = p2pkh_unlocking(&[0x30; 71], &public_key);
        assert_eq!(verifier.extract_public_key(&tx, 0), Ok(public_key.clone()));

        tx.inputs[0].script_sig = Vec::new();
        tx.inputs[0].witness = vec![vec![0x30; 71], public_key.clone()];
        assert_eq!(verifier.extract_public_key(&tx, 0), Ok(public_key));

        tx.inputs[0].witness.clear();
        assert_eq!(
            verifier.extract_public_key(&tx, 0),
            Err(SignatureError::MissingPublicKey(0))
        );
        assert_eq!(
            verifier.extract_public_key(&tx, 4),
            Err(SignatureError::InputOutOfRange(4))
        );
    }

    #[test]
    fn test_checker_uses_explicit_script_code() {
        let kp = key();
        let tx = two_input_tx(&kp);
        let signature = sign_input(&kp, &tx, 1, SigHashType::All);
        let verifier = SignatureVerifier::default();
        let checker = TransactionSignatureChecker::new(&verifier, &tx, 1);
        let code = p2pkh_script(&kp.public_key_hash());

        assert!(checker.check_signature(&signature, &kp.public_key_bytes(), &code, SigVersion::Base));
        assert!(!checker.check_signature(&signature, &kp.public_key_bytes(), &[0x51], SigVersion::Base));
        assert!(!checker.check_signature(
            &signature,
            &kp.public_key_bytes(),
            &code,
            SigVersion::WitnessV0
        ));
    }
}
