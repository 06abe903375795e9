//! Script type: an opaque byte sequence parsed on demand.
//!
//! Provides the output templates the wallet pays to (P2PKH, P2SH, P2PK,
//! bare multisig redeem scripts, OP_RETURN), shape checks for each, and
//! hex/ASM conversions.

use std::fmt;

use crate::chunk::{get_ops, push_data, ScriptChunk};
use crate::opcodes::*;
use crate::ScriptError;
use xec_primitives::ec::is_pubkey_shape;

/// Largest `n` in an `m`-of-`n` multisig redeem script.
pub const MAX_MULTISIG_KEYS: usize = 15;

/// A script, represented as a byte vector newtype.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Script(Vec<u8>);

/// A decoded `OP_m <pubkey>* OP_n OP_CHECKMULTISIG` redeem script.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MultisigScript {
    /// Signatures required.
    pub m: usize,
    /// Public keys in script order.
    pub pubkeys: Vec<Vec<u8>>,
}

impl Script {
    // -----------------------------------------------------------------------
    // Constructors
    // -----------------------------------------------------------------------

    /// Create a new empty script.
    pub fn new() -> Self {
        Script(Vec::new())
    }

    /// Create a script from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Script(bytes.to_vec())
    }

    /// Create a script from a hex-encoded string.
    ///
    /// # Arguments
    /// * `hex_str` - A hex string (e.g. "76a914...88ac").
    ///
    /// # Returns
    /// A `Script` wrapping the decoded bytes, or an error if the hex is invalid.
    pub fn from_hex(hex_str: &str) -> Result<Self, ScriptError> {
        Ok(Script(hex::decode(hex_str)?))
    }

    /// Create a script from a mixture of opcode names and hex data.
    ///
    /// Words starting with `OP_` are opcodes; anything else is hex data and is
    /// pushed with the minimal encoding.
    ///
    /// # Arguments
    /// * `asm` - Whitespace-separated tokens.
    ///
    /// # Returns
    /// A `Script`, or `UnknownOpcode` / a hex error for a bad token.
    pub fn from_asm(asm: &str) -> Result<Self, ScriptError> {
        let mut script = Script::new();
        for word in asm.split_whitespace() {
            if word.starts_with("OP_") {
                let op = opcode_from_name(word)
                    .ok_or_else(|| ScriptError::UnknownOpcode(word.to_string()))?;
                script.push_opcode(op);
            } else {
                script.push(&hex::decode(word)?);
            }
        }
        Ok(script)
    }

    /// `OP_DUP OP_HASH160 <hash160> OP_EQUALVERIFY OP_CHECKSIG`
    pub fn p2pkh(hash160: &[u8; 20]) -> Self {
        let mut b = Vec::with_capacity(25);
        b.extend_from_slice(&[OP_DUP, OP_HASH160, 20]);
        b.extend_from_slice(hash160);
        b.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
        Script(b)
    }

    /// `OP_HASH160 <hash160> OP_EQUAL`
    pub fn p2sh(hash160: &[u8; 20]) -> Self {
        let mut b = Vec::with_capacity(23);
        b.extend_from_slice(&[OP_HASH160, 20]);
        b.extend_from_slice(hash160);
        b.push(OP_EQUAL);
        Script(b)
    }

    /// `<pubkey> OP_CHECKSIG`
    pub fn p2pk(pubkey: &[u8]) -> Self {
        let mut script = Script::new();
        script.push(pubkey);
        script.push_opcode(OP_CHECKSIG);
        script
    }

    /// An `m`-of-`n` redeem script with the keys in the given order.
    ///
    /// # Arguments
    /// * `m` - Signatures required, `1 <= m <= n <= 15`.
    /// * `pubkeys` - Public keys, each 33 or 65 bytes.
    ///
    /// # Returns
    /// The redeem script, or an error if `m`/`n` are out of range or a key
    /// has the wrong shape.
    pub fn multisig(m: usize, pubkeys: &[Vec<u8>]) -> Result<Self, ScriptError> {
        let n = pubkeys.len();
        if !(1 <= m && m <= n && n <= MAX_MULTISIG_KEYS) {
            return Err(ScriptError::InvalidScript(format!(
                "{m} of {n} multisig script not possible"
            )));
        }
        let mut script = Script::new();
        script.push(&[m as u8]);
        for pubkey in pubkeys {
            if !is_pubkey_shape(pubkey) {
                return Err(ScriptError::InvalidPublicKey(hex::encode(pubkey)));
            }
            script.push(pubkey);
        }
        script.push(&[n as u8]);
        script.push_opcode(OP_CHECKMULTISIG);
        Ok(script)
    }

    /// `OP_RETURN` followed by each payload as a minimal push.
    pub fn op_return(pushes: &[&[u8]]) -> Self {
        let mut script = Script(vec![OP_RETURN]);
        for data in pushes {
            script.push(data);
        }
        script
    }

    // -----------------------------------------------------------------------
    // Building
    // -----------------------------------------------------------------------

    /// Append a minimal data push.
    pub fn push(&mut self, data: &[u8]) -> &mut Self {
        self.0.extend_from_slice(&push_data(data, true));
        self
    }

    /// Append a length-prefixed push without the BIP62 small-value opcodes.
    pub fn push_non_minimal(&mut self, data: &[u8]) -> &mut Self {
        self.0.extend_from_slice(&push_data(data, false));
        self
    }

    /// Append a bare opcode.
    pub fn push_opcode(&mut self, op: u8) -> &mut Self {
        self.0.push(op);
        self
    }

    // -----------------------------------------------------------------------
    // Serialization
    // -----------------------------------------------------------------------

    /// Encode the script as a lowercase hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Return a reference to the underlying bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume the script and return its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Return the length of the script in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the script is empty (zero bytes).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse the script into chunks.
    ///
    /// # Returns
    /// The chunk list, or `ScriptError::Truncated` for a malformed script.
    pub fn get_ops(&self) -> Result<Vec<ScriptChunk>, ScriptError> {
        get_ops(&self.0)
    }

    /// Space-separated ASM. A truncated script falls back to its raw hex.
    pub fn to_asm(&self) -> String {
        match self.get_ops() {
            Ok(ops) => ops
                .iter()
                .map(ScriptChunk::to_asm_string)
                .collect::<Vec<_>>()
                .join(" "),
            Err(_) => self.to_hex(),
        }
    }

    // -----------------------------------------------------------------------
    // Template recognition
    // -----------------------------------------------------------------------

    /// True for `OP_DUP OP_HASH160 <20> OP_EQUALVERIFY OP_CHECKSIG`.
    pub fn is_p2pkh(&self) -> bool {
        let b = &self.0;
        b.len() == 25
            && b[0] == OP_DUP
            && b[1] == OP_HASH160
            && b[2] == 20
            && b[23] == OP_EQUALVERIFY
            && b[24] == OP_CHECKSIG
    }

    /// True for `OP_HASH160 <20> OP_EQUAL`.
    pub fn is_p2sh(&self) -> bool {
        let b = &self.0;
        b.len() == 23 && b[0] == OP_HASH160 && b[1] == 20 && b[22] == OP_EQUAL
    }

    /// True for `<33 or 65 byte pubkey> OP_CHECKSIG`.
    pub fn is_p2pk(&self) -> bool {
        self.p2pk_pubkey().is_some()
    }

    /// True if the first byte is `OP_RETURN`.
    pub fn is_opreturn(&self) -> bool {
        self.0.first() == Some(&OP_RETURN)
    }

    /// The hash of a P2PKH script.
    pub fn p2pkh_hash(&self) -> Option<[u8; 20]> {
        if !self.is_p2pkh() {
            return None;
        }
        self.0[3..23].try_into().ok()
    }

    /// The hash of a P2SH script.
    pub fn p2sh_hash(&self) -> Option<[u8; 20]> {
        if !self.is_p2sh() {
            return None;
        }
        self.0[2..22].try_into().ok()
    }

    /// The public key of a P2PK script.
    pub fn p2pk_pubkey(&self) -> Option<&[u8]> {
        let b = &self.0;
        let ok = match b.len() {
            35 => b[0] == 33 && b[34] == OP_CHECKSIG,
            67 => b[0] == 65 && b[66] == OP_CHECKSIG,
            _ => false,
        };
        if !ok {
            return None;
        }
        let pubkey = &b[1..b.len() - 1];
        is_pubkey_shape(pubkey).then_some(pubkey)
    }

    /// Decode an `OP_m <pubkey>* OP_n OP_CHECKMULTISIG` redeem script.
    ///
    /// Returns `None` unless the key count matches `n` and `m <= n`.
    pub fn parse_multisig(&self) -> Option<MultisigScript> {
        let ops = self.get_ops().ok()?;
        if ops.len() < 4 {
            return None;
        }
        let m = small_int_value(ops[0].op).filter(|&m| m >= 1)? as usize;
        let n_op = &ops[ops.len() - 2];
        let n = small_int_value(n_op.op).filter(|&n| n >= 1)? as usize;
        if ops[ops.len() - 1].op != OP_CHECKMULTISIG || m > n {
            return None;
        }
        let keys = &ops[1..ops.len() - 2];
        if keys.len() != n {
            return None;
        }
        let pubkeys = keys
            .iter()
            .map(|c| match &c.data {
                Some(d) if c.is_push() && is_pubkey_shape(d) => Some(d.clone()),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()?;
        Some(MultisigScript { m, pubkeys })
    }
}

impl From<Vec<u8>> for Script {
    fn from(bytes: Vec<u8>) -> Self {
        Script(bytes)
    }
}

impl AsRef<[u8]> for Script {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Script {
    /// Display the script as a lowercase hex string.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Script({})", self.to_hex())
    }
}

impl serde::Serialize for Script {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> serde::Deserialize<'de> for Script {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Script::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    //! Tests for the Script type.
    //!
    //! Covers hex/ASM conversions, the output templates and their shape
    //! checks, and multisig redeem script parsing.

    use super::*;

    const PKH: &str = "e2a623699e81b291c0327f408fea765d534baa2a";
    const G_COMPRESSED: &str = "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";

    fn pkh() -> [u8; 20] {
        hex::decode(PKH).unwrap().try_into().unwrap()
    }

    fn key(b: u8) -> Vec<u8> {
        let mut k = vec![0x02];
        k.extend_from_slice(&[b; 32]);
        k
    }

    // -----------------------------------------------------------------------
    // Construction & conversions
    // -----------------------------------------------------------------------

    #[test]
    fn test_from_hex_roundtrip() {
        let hex_str = "76a914e2a623699e81b291c0327f408fea765d534baa2a88ac";
        let script = Script::from_hex(hex_str).unwrap();
        assert_eq!(script.to_hex(), hex_str);
        assert!(Script::from_hex("ZZZZ").is_err());
        assert!(Script::from_hex("").unwrap().is_empty());
    }

    #[test]
    fn test_to_asm_p2pkh() {
        let script = Script::p2pkh(&pkh());
        assert_eq!(
            script.to_asm(),
            format!("OP_DUP OP_HASH160 {PKH} OP_EQUALVERIFY OP_CHECKSIG")
        );
        let again = Script::from_asm(&script.to_asm()).unwrap();
        assert_eq!(again, script);
    }

    #[test]
    fn test_from_asm_errors() {
        assert!(matches!(
            Script::from_asm("OP_DUP OP_BOGUS"),
            Err(ScriptError::UnknownOpcode(_))
        ));
        assert!(Script::from_asm("OP_RETURN zz").is_err());
    }

    #[test]
    fn test_to_asm_truncated_is_hex() {
        let script = Script::from_hex("6a4c05aabb").unwrap();
        assert_eq!(script.to_asm(), "6a4c05aabb");
    }

    #[test]
    fn test_serde_hex_string() {
        let script = Script::p2sh(&pkh());
        let json = serde_json::to_string(&script).unwrap();
        assert_eq!(json, format!("\"a914{PKH}87\""));
        let back: Script = serde_json::from_str(&json).unwrap();
        assert_eq!(back, script);
    }

    // -----------------------------------------------------------------------
    // Templates
    // -----------------------------------------------------------------------

    #[test]
    fn test_templates_are_recognized() {
        let p2pkh = Script::p2pkh(&pkh());
        assert!(p2pkh.is_p2pkh() && !p2pkh.is_p2sh());
        assert_eq!(p2pkh.p2pkh_hash(), Some(pkh()));

        let p2sh = Script::p2sh(&pkh());
        assert!(p2sh.is_p2sh() && !p2sh.is_p2pkh());
        assert_eq!(p2sh.p2sh_hash(), Some(pkh()));

        let pubkey = hex::decode(G_COMPRESSED).unwrap();
        let p2pk = Script::p2pk(&pubkey);
        assert_eq!(p2pk.len(), 35);
        assert!(p2pk.is_p2pk());
        assert_eq!(p2pk.p2pk_pubkey(), Some(&pubkey[..]));

        assert!(!Script::from_hex("21ff").unwrap().is_p2pk());
        assert!(Script::op_return(&[b"hi"]).is_opreturn());
    }

    #[test]
    fn test_p2pk_rejects_bad_prefix() {
        let mut bad = vec![0x05];
        bad.extend_from_slice(&[1u8; 32]);
        assert!(!Script::p2pk(&bad).is_p2pk());
    }

    #[test]
    fn test_op_return_pushes() {
        let script = Script::op_return(&[b"hello", &[0x01]]);
        assert_eq!(script.to_hex(), "6a0568656c6c6f51");
    }

    // -----------------------------------------------------------------------
    // Multisig
    // -----------------------------------------------------------------------

    #[test]
    fn test_multisig_roundtrip() {
        let keys = vec![key(1), key(2), key(3)];
        let script = Script::multisig(2, &keys).unwrap();
        assert_eq!(script.as_bytes()[0], OP_2);
        assert_eq!(*script.as_bytes().last().unwrap(), OP_CHECKMULTISIG);
        assert_eq!(script.len(), 1 + 3 * 34 + 2);

        let parsed = script.parse_multisig().unwrap();
        assert_eq!(parsed.m, 2);
        assert_eq!(parsed.pubkeys, keys);
    }

    #[test]
    fn test_multisig_bounds() {
        assert!(Script::multisig(0, &[key(1)]).is_err());
        assert!(Script::multisig(2, &[key(1)]).is_err());
        let sixteen: Vec<Vec<u8>> = (0..16).map(key).collect();
        assert!(Script::multisig(1, &sixteen).is_err());
        assert!(matches!(
            Script::multisig(1, &[vec![0x02; 10]]),
            Err(ScriptError::InvalidPublicKey(_))
        ));
    }

    #[test]
    fn test_parse_multisig_rejects_count_mismatch() {
        // OP_2 <k1> <k2> OP_3 OP_CHECKMULTISIG declares three keys but has two.
        let mut script = Script::new();
        script.push(&[2]).push(&key(1)).push(&key(2)).push(&[3]);
        script.push_opcode(OP_CHECKMULTISIG);
        assert!(script.parse_multisig().is_none());
        assert!(Script::p2pkh(&pkh()).parse_multisig().is_none());
    }
}
