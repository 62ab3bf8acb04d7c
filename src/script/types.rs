//! Locking script classification
//!
//! Every locking script falls into exactly one of a closed set of families.
//! Anything outside the recognised templates is `Other`, which the engine
//! refuses to execute.

use serde::{Deserialize, Serialize};

use crate::crypto::{base58check, P2PKH_ADDRESS_VERSION, P2SH_ADDRESS_VERSION};

/// Length of a compressed SEC1 public key
pub const COMPRESSED_KEY_SIZE: usize = 33;

/// Length of an uncompressed SEC1 public key
pub const UNCOMPRESSED_KEY_SIZE: usize = 65;

/// The family of a locking script
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScriptType {
    /// Pay to Public Key: `<pubkey> OP_CHECKSIG`
    P2PK,
    /// Pay to Public Key Hash: `OP_DUP OP_HASH160 <20> OP_EQUALVERIFY OP_CHECKSIG`
    P2PKH,
    /// Pay to Script Hash: `OP_HASH160 <20> OP_EQUAL`
    P2SH,
    /// Pay to Witness Public Key Hash: witness v0 program `OP_0 <20>`
    P2WPKH,
    /// Any other script; never executed
    #[default]
    Other,
}

impl ScriptType {
    /// Classify a locking script by its opcode pattern
    pub fn classify(script: &[u8]) -> Self {
        Template::match_script(script).script_type()
    }

    /// Get the script type name as used in mempool records
    pub fn type_name(&self) -> &'static str {
        match self {
            ScriptType::P2PK => "p2pk",
            ScriptType::P2PKH => "p2pkh",
            ScriptType::P2SH => "p2sh",
            ScriptType::P2WPKH => "v0_p2wpkh",
            ScriptType::Other => "unknown",
        }
    }
}

/// A classified locking script with the template fields borrowed from it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template<'a> {
    P2PK { public_key: &'a [u8] },
    P2PKH { key_hash: &'a [u8] },
    P2SH { script_hash: &'a [u8] },
    P2WPKH { key_hash: &'a [u8] },
    Other,
}

impl<'a> Template<'a> {
    /// Match a locking script against the supported templates
    pub fn match_script(script: &'a [u8]) -> Self {
        match script {
            [0x76, 0xa9, 0x14, key_hash @ .., 0x88, 0xac] if key_hash.len() == 20 => {
                Template::P2PKH { key_hash }
            }
            [0xa9, 0x14, script_hash @ .., 0x87] if script_hash.len() == 20 => {
                Template::P2SH { script_hash }
            }
            [0x00, 0x14, key_hash @ ..] if key_hash.len() == 20 => Template::P2WPKH { key_hash },
            [0x21, public_key @ .., 0xac] if public_key.len() == COMPRESSED_KEY_SIZE => {
                Template::P2PK { public_key }
            }
            [0x41, public_key @ .., 0xac] if public_key.len() == UNCOMPRESSED_KEY_SIZE => {
                Template::P2PK { public_key }
            }
            _ => Template::Other,
        }
    }

    /// The script type tag of this template
    pub fn script_type(&self) -> ScriptType {
        match self {
            Template::P2PK { .. } => ScriptType::P2PK,
            Template::P2PKH { .. } => ScriptType::P2PKH,
            Template::P2SH { .. } => ScriptType::P2SH,
            Template::P2WPKH { .. } => ScriptType::P2WPKH,
            Template::Other => ScriptType::Other,
        }
    }

    /// Display address for the template, where one has a legacy encoding
    pub fn address(&self) -> Option<String> {
        match self {
            Template::P2PKH { key_hash } => Some(base58check(P2PKH_ADDRESS_VERSION, key_hash)),
            Template::P2SH { script_hash } => {
                Some(base58check(P2SH_ADDRESS_VERSION, script_hash))
            }
            _ => None,
        }
    }
}

/// Build the P2PKH locking script for a key hash
///
/// Also serves as the script code signed by witness v0 key-hash inputs.
pub fn p2pkh_script(key_hash: &[u8]) -> Vec<u8> {
    let mut script = Vec::with_capacity(25);
    script.extend_from_slice(&[0x76, 0xa9, 0x14]);
    script.extend_from_slice(key_hash);
    script.extend_from_slice(&[0x88, 0xac]);
    script
}

/// Build the P2SH locking script for a script hash
pub fn p2sh_script(script_hash: &[u8]) -> Vec<u8> {
    let mut script = Vec::with_capacity(23);
    script.extend_from_slice(&[0xa9, 0x14]);
    script.extend_from_slice(script_hash);
    script.push(0x87);
    script
}

/// Build the witness v0 key-hash program for a key hash
pub fn p2wpkh_script(key_hash: &[u8]) -> Vec<u8> {
    let mut script = Vec::with_capacity(22);
    script.extend_from_slice(&[0x00, 0x14]);
    script.extend_from_slice(key_hash);
    script
}

/// Check if a byte string has the length and prefix of a SEC1 public key
pub fn looks_like_public_key(data: &[u8]) -> bool {
    match data.len() {
        COMPRESSED_KEY_SIZE => matches!(data[0], 0x02 | 0x03),
        UNCOMPRESSED_KEY_SIZE => data[0] == 0x04,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_templates() {
        let hash = [0x42u8; 20];
        assert_eq!(ScriptType::classify(&p2pkh_script(&hash)), ScriptType::P2PKH);
        assert_eq!(ScriptType::classify(&p2sh_script(&hash)), ScriptType::P2SH);
        assert_eq!(ScriptType::classify(&p2wpkh_script(&hash)), ScriptType::P2WPKH);

        let mut p2pk = vec![0x21];
        p2pk.extend_from_slice(&[0x02; 33]);
        p2pk.push(0xac);
        assert_eq!(ScriptType::classify(&p2pk), ScriptType::P2PK);
    }

    #[test]
    fn test_classify_other() {
        assert_eq!(ScriptType::classify(&[]), ScriptType::Other);
        // OP_RETURN data carrier
        assert_eq!(ScriptType::classify(&[0x6a, 0x01, 0x00]), ScriptType::Other);
        // Witness v0 script hash (32-byte program) is not supported
        let mut p2wsh = vec![0x00, 0x20];
        p2wsh.extend_from_slice(&[0u8; 32]);
        assert_eq!(ScriptType::classify(&p2wsh), ScriptType::Other);
        // Wrong hash length
        let mut short = vec![0x76, 0xa9, 0x13];
        short.extend_from_slice(&[0u8; 19]);
        short.extend_from_slice(&[0x88, 0xac]);
        assert_eq!(ScriptType::classify(&short), ScriptType::Other);
    }

    #[test]
    fn test_template_fields() {
        let hash = [0x07u8; 20];
        let script = p2pkh_script(&hash);
        assert_eq!(
            Template::match_script(&script),
            Template::P2PKH { key_hash: &hash }
        );
    }

    #[test]
    fn test_addresses() {
        let hash = [0u8; 20];
        let p2pkh = Template::match_script(&p2pkh_script(&hash)).address().unwrap();
        assert_eq!(p2pkh, "1111111111111111111114oLvT2");
        let p2sh = Template::match_script(&p2sh_script(&hash)).address().unwrap();
        assert!(p2sh.starts_with('3'));
        assert!(Template::match_script(&p2wpkh_script(&hash)).address().is_none());
    }

    #[test]
    fn test_public_key_shape() {
        assert!(looks_like_public_key(&[0x02; 33]));
        assert!(looks_like_public_key(&[0x04; 65]));
        assert!(!looks_like_public_key(&[0x05; 33]));
        assert!(!looks_like_public_key(&[0x02; 32]));
    }

    #[test]
    fn test_type_names() {
        assert_eq!(ScriptType::P2WPKH.type_name(), "v0_p2wpkh");
        assert_eq!(ScriptType::default(), ScriptType::Other);
    }
}
