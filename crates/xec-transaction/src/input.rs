//! Transaction inputs and their signing state.
//!
//! An input is known either by the scriptSig bytes it was deserialized
//! from or by the keys and signatures it was built from. `Encoding` keeps
//! exactly one of these authoritative:
//!
//! - `Raw` holds scriptSig bytes plus the `InputDescriptor` read out of
//!   them. The bytes are re-serialized verbatim.
//! - `Structured` holds a descriptor only. The scriptSig is rebuilt from
//!   it on demand.
//!
//! Attaching a signature turns a `Raw` input into a `Structured` one, and
//! a `Structured` input whose last signature arrives is frozen back into
//! `Raw` form, so the two views are never out of step.
//!
//! Multisig keys are kept sorted by their resolved pubkey bytes. Signature
//! slots are positional to that order, which every cosigning wallet
//! reproduces independently of the redeem script it was given.

use xec_primitives::hash::hash160;
use xec_primitives::util::{compact_size_len, ByteReader, ByteWriter};
use xec_primitives::ScriptType;
use xec_script::chunk::{get_ops, push_data};
use xec_script::opcodes::*;
use xec_script::script::MAX_MULTISIG_KEYS;
use xec_script::{Address, Script, ScriptChunk};

use crate::outpoint::{OutPoint, OUTPOINT_LEN};
use crate::output::MAX_VALUE;
use crate::x_pubkey::{XPubKey, ADDRESS_PREFIX, COMPRESSED_PUBKEY_ESTIMATE};
use crate::TransactionError;

/// Sequence number of a final input.
pub const DEFAULT_SEQUENCE: u32 = 0xffff_ffff;

/// One-byte placeholder pushed for a signature that is not there yet.
pub const NO_SIGNATURE: u8 = 0xff;

/// Signature length assumed by size estimation, sighash byte included.
pub const ECDSA_SIG_ESTIMATE: usize = 0x48;
pub const SCHNORR_SIG_ESTIMATE: usize = 0x41;

/// Length of a compressed pubkey push.
const COMPRESSED_PUBKEY_LEN: usize = 33;

/// What an input spends and who has signed for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDescriptor {
    script_type: ScriptType,
    num_required_sigs: usize,
    pubkeys: Vec<Vec<u8>>,
    x_pubkeys: Vec<XPubKey>,
    signatures: Vec<Option<Vec<u8>>>,
    address: Option<Address>,
}

impl InputDescriptor {
    /// An unsigned P2PKH input for `x_pubkey`.
    pub fn p2pkh(x_pubkey: XPubKey) -> Result<Self, TransactionError> {
        let pubkey = x_pubkey.to_pubkey()?;
        let address = x_pubkey.address()?;
        Ok(InputDescriptor {
            script_type: ScriptType::P2pkh,
            num_required_sigs: 1,
            pubkeys: vec![pubkey],
            x_pubkeys: vec![x_pubkey],
            signatures: vec![None],
            address: Some(address),
        })
    }

    /// An unsigned `m`-of-`n` P2SH multisig input.
    ///
    /// The keys may come in any order; they are stored sorted.
    pub fn p2sh_multisig(m: usize, x_pubkeys: Vec<XPubKey>) -> Result<Self, TransactionError> {
        let n = x_pubkeys.len();
        if !(1 <= m && m <= n && n <= MAX_MULTISIG_KEYS) {
            return Err(TransactionError::InvalidTransaction(format!(
                "{m} of {n} multisig not possible"
            )));
        }
        let pubkeys = x_pubkeys
            .iter()
            .map(XPubKey::to_pubkey)
            .collect::<Result<Vec<_>, _>>()?;
        let (pubkeys, x_pubkeys) = sort_keys(pubkeys, x_pubkeys);
        let redeem = Script::multisig(m, &pubkeys)?;
        Ok(InputDescriptor {
            script_type: ScriptType::P2sh,
            num_required_sigs: m,
            signatures: vec![None; n],
            address: Some(Address::from_multisig_script(&redeem)),
            pubkeys,
            x_pubkeys,
        })
    }

    /// An unsigned bare pay-to-pubkey input.
    pub fn p2pk(pubkey: Vec<u8>) -> Result<Self, TransactionError> {
        let x_pubkey = XPubKey::from_bytes(&pubkey)?;
        if !matches!(x_pubkey, XPubKey::PubKey(_)) {
            return Err(TransactionError::InvalidXPubKey(hex::encode(&pubkey)));
        }
        Ok(InputDescriptor {
            script_type: ScriptType::P2pk,
            num_required_sigs: 1,
            pubkeys: vec![pubkey],
            x_pubkeys: vec![x_pubkey],
            signatures: vec![None],
            address: None,
        })
    }

    /// Replace the signature list, positional to the sorted keys.
    pub fn with_signatures(
        mut self,
        signatures: Vec<Option<Vec<u8>>>,
    ) -> Result<Self, TransactionError> {
        if signatures.len() != self.signatures.len() {
            return Err(TransactionError::InvalidTransaction(format!(
                "expected {} signature slots, got {}",
                self.signatures.len(),
                signatures.len()
            )));
        }
        self.signatures = signatures;
        Ok(self)
    }

    fn opaque(script_type: ScriptType) -> Self {
        InputDescriptor {
            script_type,
            num_required_sigs: 0,
            pubkeys: Vec::new(),
            x_pubkeys: Vec::new(),
            signatures: Vec::new(),
            address: None,
        }
    }

    pub fn script_type(&self) -> ScriptType {
        self.script_type
    }

    pub fn num_required_sigs(&self) -> usize {
        self.num_required_sigs
    }

    /// Resolved pubkeys in ascending byte order.
    pub fn pubkeys(&self) -> &[Vec<u8>] {
        &self.pubkeys
    }

    /// x_pubkeys paired with `pubkeys`.
    pub fn x_pubkeys(&self) -> &[XPubKey] {
        &self.x_pubkeys
    }

    /// Signatures with their sighash byte, or `None` for an open slot.
    ///
    /// An incomplete multisig input has one slot per key. A complete one
    /// read from the wire has exactly `m`.
    pub fn signatures(&self) -> &[Option<Vec<u8>>] {
        &self.signatures
    }

    pub fn address(&self) -> Option<&Address> {
        self.address.as_ref()
    }

    pub fn num_valid_sigs(&self) -> usize {
        self.signatures.iter().flatten().count()
    }

    pub fn is_complete(&self) -> bool {
        match self.script_type {
            ScriptType::Coinbase | ScriptType::Unknown => true,
            _ => self.num_required_sigs == 0 || self.num_valid_sigs() == self.num_required_sigs,
        }
    }

    /// Assemble the scriptSig.
    ///
    /// A complete input pushes its signatures and real pubkeys. An
    /// incomplete one pushes every slot, with `NO_SIGNATURE` for the empty
    /// ones, and the x_pubkeys so a cosigner can find its keys.
    fn build_script_sig(&self) -> Vec<u8> {
        let (keys, sigs): (Vec<Vec<u8>>, Vec<Vec<u8>>) = if self.is_complete() {
            (
                self.pubkeys.clone(),
                self.signatures.iter().flatten().cloned().collect(),
            )
        } else {
            (
                self.x_pubkeys.iter().map(XPubKey::to_bytes).collect(),
                self.signatures
                    .iter()
                    .map(|s| s.clone().unwrap_or_else(|| vec![NO_SIGNATURE]))
                    .collect(),
            )
        };
        self.assemble(&keys, &sigs)
    }

    /// A scriptSig of the final size, with zeroed placeholders.
    fn estimate_script_sig(&self, sign_schnorr: bool) -> Vec<u8> {
        let pubkey_size = self
            .x_pubkeys
            .first()
            .map_or(COMPRESSED_PUBKEY_ESTIMATE, XPubKey::estimated_pubkey_size);
        let sig_size = if sign_schnorr {
            SCHNORR_SIG_ESTIMATE
        } else {
            ECDSA_SIG_ESTIMATE
        };
        let keys = vec![vec![0u8; pubkey_size]; self.x_pubkeys.len()];
        let sigs = vec![vec![0u8; sig_size]; self.num_required_sigs];
        self.assemble(&keys, &sigs)
    }

    fn assemble(&self, keys: &[Vec<u8>], sigs: &[Vec<u8>]) -> Vec<u8> {
        let mut script = Vec::new();
        if self.script_type == ScriptType::P2sh {
            script.push(OP_0);
        }
        for sig in sigs {
            script.extend(push_data(sig, true));
        }
        match self.script_type {
            ScriptType::P2pkh => {
                if let Some(key) = keys.first() {
                    script.extend(push_data(key, true));
                }
            }
            ScriptType::P2sh => {
                script.extend(push_data(&redeem_script(self.num_required_sigs, keys), true));
            }
            // Coinbase and unknown inputs only exist in raw form.
            _ => {}
        }
        script
    }
}

/// Sort pubkeys ascending, carrying their x_pubkeys along.
fn sort_keys(pubkeys: Vec<Vec<u8>>, x_pubkeys: Vec<XPubKey>) -> (Vec<Vec<u8>>, Vec<XPubKey>) {
    let mut pairs: Vec<(Vec<u8>, XPubKey)> = pubkeys.into_iter().zip(x_pubkeys).collect();
    pairs.sort_by(|a, b| (&a.0, a.1.to_bytes()).cmp(&(&b.0, b.1.to_bytes())));
    pairs.into_iter().unzip()
}

/// `OP_m <key>* OP_n OP_CHECKMULTISIG` over arbitrary key pushes, so
/// x_pubkeys can stand in for keys in an incomplete input.
fn redeem_script(m: usize, keys: &[Vec<u8>]) -> Vec<u8> {
    let mut out = push_data(&[m as u8], true);
    for key in keys {
        out.extend(push_data(key, true));
    }
    out.extend(push_data(&[keys.len() as u8], true));
    out.push(OP_CHECKMULTISIG);
    out
}

/// True if `op` pushes data and can push at least `min_size` bytes.
fn is_push_opcode(op: u8, min_size: usize) -> bool {
    let small = op <= OP_1NEGATE || is_small_int_op(op);
    match min_size {
        0 => small,
        1 => op != OP_0 && small,
        n if n < OP_PUSHDATA1 as usize => (n as u8..=OP_PUSHDATA4).contains(&op),
        n if n <= 0xff => (OP_PUSHDATA1..=OP_PUSHDATA4).contains(&op),
        n if n <= 0xffff => op == OP_PUSHDATA2 || op == OP_PUSHDATA4,
        _ => op == OP_PUSHDATA4,
    }
}

/// An `fd` x_pubkey is shorter than any real key.
fn is_address_hint(chunk: &ScriptChunk) -> bool {
    chunk.is_push() && chunk.data.as_deref().and_then(<[u8]>::first) == Some(&ADDRESS_PREFIX)
}

fn chunk_data(chunk: &ScriptChunk) -> Vec<u8> {
    chunk.data.clone().unwrap_or_default()
}

fn signature_or_none(data: Vec<u8>) -> Option<Vec<u8>> {
    if data == [NO_SIGNATURE] {
        None
    } else {
        Some(data)
    }
}

/// Read what a scriptSig says about the input. Never fails: anything
/// unrecognized is `Unknown`.
fn parse_script_sig(script_sig: &[u8], coinbase: bool) -> InputDescriptor {
    if coinbase {
        return InputDescriptor::opaque(ScriptType::Coinbase);
    }
    let ops = match get_ops(script_sig) {
        Ok(ops) => ops,
        Err(_) => return InputDescriptor::opaque(ScriptType::Unknown),
    };

    if ops.len() == 1 && is_push_opcode(ops[0].op, COMPRESSED_PUBKEY_LEN) {
        return InputDescriptor {
            script_type: ScriptType::P2pk,
            num_required_sigs: 1,
            pubkeys: Vec::new(),
            x_pubkeys: Vec::new(),
            signatures: vec![Some(chunk_data(&ops[0]))],
            address: None,
        };
    }

    if ops.len() == 2
        && is_push_opcode(ops[0].op, 1)
        && (is_push_opcode(ops[1].op, COMPRESSED_PUBKEY_LEN) || is_address_hint(&ops[1]))
    {
        return parse_p2pkh(&ops).unwrap_or_else(|| InputDescriptor::opaque(ScriptType::Unknown));
    }

    if ops.len() >= 3 && ops[0].op == OP_0 && ops[1..].iter().all(|c| is_push_opcode(c.op, 1)) {
        return parse_p2sh_multisig(&ops)
            .unwrap_or_else(|| InputDescriptor::opaque(ScriptType::Unknown));
    }

    InputDescriptor::opaque(ScriptType::Unknown)
}

fn parse_p2pkh(ops: &[ScriptChunk]) -> Option<InputDescriptor> {
    let x_pubkey = XPubKey::from_bytes(&chunk_data(&ops[1])).ok()?;
    let pubkey = x_pubkey.to_pubkey().ok()?;
    let address = x_pubkey.address().ok()?;
    Some(InputDescriptor {
        script_type: ScriptType::P2pkh,
        num_required_sigs: 1,
        pubkeys: vec![pubkey],
        x_pubkeys: vec![x_pubkey],
        signatures: vec![signature_or_none(chunk_data(&ops[0]))],
        address: Some(address),
    })
}

/// `OP_0 <sig>* <OP_m <key>* OP_n OP_CHECKMULTISIG>`
fn parse_p2sh_multisig(ops: &[ScriptChunk]) -> Option<InputDescriptor> {
    let redeem = chunk_data(&ops[ops.len() - 1]);
    let redeem_ops = get_ops(&redeem).ok()?;
    if redeem_ops.len() < 4 {
        return None;
    }
    let m = small_int_value(redeem_ops[0].op).filter(|&m| m >= 1)? as usize;
    let n = small_int_value(redeem_ops[redeem_ops.len() - 2].op).filter(|&n| n >= 1)? as usize;
    if redeem_ops.len() != n + 3
        || redeem_ops[redeem_ops.len() - 1].op != OP_CHECKMULTISIG
        || !redeem_ops[1..redeem_ops.len() - 2]
            .iter()
            .all(|c| is_push_opcode(c.op, 0))
    {
        return None;
    }

    let x_pubkeys = redeem_ops[1..redeem_ops.len() - 2]
        .iter()
        .map(|c| XPubKey::from_bytes(&chunk_data(c)))
        .collect::<Result<Vec<_>, _>>()
        .ok()?;
    let pubkeys = x_pubkeys
        .iter()
        .map(XPubKey::to_pubkey)
        .collect::<Result<Vec<_>, _>>()
        .ok()?;
    let signatures: Vec<Option<Vec<u8>>> = ops[1..ops.len() - 1]
        .iter()
        .map(|c| signature_or_none(chunk_data(c)))
        .collect();
    if m > n || (signatures.len() != m && signatures.len() != n) {
        return None;
    }

    let address = Address::from_p2sh_hash(hash160(&redeem_script(m, &pubkeys)));
    let (pubkeys, x_pubkeys) = sort_keys(pubkeys, x_pubkeys);
    Some(InputDescriptor {
        script_type: ScriptType::P2sh,
        num_required_sigs: m,
        pubkeys,
        x_pubkeys,
        signatures,
        address: Some(address),
    })
}

/// scriptSig bytes together with what was read from them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawScriptSig {
    bytes: Vec<u8>,
    keys: InputDescriptor,
}

impl RawScriptSig {
    pub fn parse(bytes: Vec<u8>, coinbase: bool) -> Self {
        let keys = parse_script_sig(&bytes, coinbase);
        RawScriptSig { bytes, keys }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn keys(&self) -> &InputDescriptor {
        &self.keys
    }
}

/// Which representation of an input is authoritative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Encoding {
    Raw(RawScriptSig),
    Structured(InputDescriptor),
}

impl Encoding {
    pub fn keys(&self) -> &InputDescriptor {
        match self {
            Encoding::Raw(raw) => raw.keys(),
            Encoding::Structured(keys) => keys,
        }
    }

    pub fn script_sig(&self) -> Vec<u8> {
        match self {
            Encoding::Raw(raw) => raw.bytes.clone(),
            Encoding::Structured(keys) => keys.build_script_sig(),
        }
    }
}

/// A signature slot a signer can still fill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureSlot {
    /// Position among the sorted keys.
    pub index: usize,
    pub pubkey: Vec<u8>,
    pub x_pubkey: XPubKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxInput {
    pub outpoint: OutPoint,
    pub sequence: u32,
    encoding: Encoding,
    value: Option<u64>,
    /// Confirmation height of the spent coin, if known. Zero or negative
    /// means unconfirmed.
    pub height: Option<i32>,
}

impl TxInput {
    /// An input read from a serialized transaction.
    pub fn from_script_sig(outpoint: OutPoint, sequence: u32, script_sig: Vec<u8>) -> Self {
        let raw = RawScriptSig::parse(script_sig, outpoint.is_null());
        TxInput {
            outpoint,
            sequence,
            encoding: Encoding::Raw(raw),
            value: None,
            height: None,
        }
    }

    /// An input built from its keys, typically unsigned.
    pub fn from_descriptor(
        outpoint: OutPoint,
        sequence: u32,
        keys: InputDescriptor,
        value: Option<u64>,
    ) -> Result<Self, TransactionError> {
        if matches!(keys.script_type, ScriptType::Coinbase | ScriptType::Unknown) {
            return Err(TransactionError::UnknownInputType(keys.script_type.to_string()));
        }
        let mut input = TxInput {
            outpoint,
            sequence,
            encoding: Encoding::Structured(keys),
            value,
            height: None,
        };
        input.freeze_if_complete();
        Ok(input)
    }

    pub fn with_height(mut self, height: i32) -> Self {
        self.height = Some(height);
        self
    }

    pub fn encoding(&self) -> &Encoding {
        &self.encoding
    }

    pub fn keys(&self) -> &InputDescriptor {
        self.encoding.keys()
    }

    pub fn script_type(&self) -> ScriptType {
        self.keys().script_type
    }

    pub fn num_required_sigs(&self) -> usize {
        self.keys().num_required_sigs
    }

    pub fn pubkeys(&self) -> &[Vec<u8>] {
        self.keys().pubkeys()
    }

    pub fn x_pubkeys(&self) -> &[XPubKey] {
        self.keys().x_pubkeys()
    }

    pub fn signatures(&self) -> &[Option<Vec<u8>>] {
        self.keys().signatures()
    }

    pub fn address(&self) -> Option<&Address> {
        self.keys().address()
    }

    pub fn value(&self) -> Option<u64> {
        self.value
    }

    pub fn set_value(&mut self, value: u64) {
        self.value = Some(value);
    }

    pub fn is_coinbase(&self) -> bool {
        self.outpoint.is_null()
    }

    pub fn num_valid_sigs(&self) -> usize {
        self.keys().num_valid_sigs()
    }

    pub fn is_complete(&self) -> bool {
        self.keys().is_complete()
    }

    /// Open slots in sorted-key order. Empty once the input is complete.
    pub fn signature_slots(&self) -> Vec<SignatureSlot> {
        if self.is_complete() {
            return Vec::new();
        }
        let keys = self.keys();
        keys.signatures
            .iter()
            .enumerate()
            .filter(|(_, sig)| sig.is_none())
            .filter_map(|(index, _)| {
                Some(SignatureSlot {
                    index,
                    pubkey: keys.pubkeys.get(index)?.clone(),
                    x_pubkey: keys.x_pubkeys.get(index)?.clone(),
                })
            })
            .collect()
    }

    /// Fill slot `index` with `sig` (sighash byte included).
    pub fn update_signature(&mut self, index: usize, sig: Vec<u8>) -> Result<(), TransactionError> {
        let mut keys = self.structured_keys()?;
        let slot = keys.signatures.get_mut(index).ok_or_else(|| {
            TransactionError::InvalidTransaction(format!("no signature slot {index}"))
        })?;
        *slot = Some(sig);
        self.encoding = Encoding::Structured(keys);
        self.freeze_if_complete();
        Ok(())
    }

    /// Swap an address hint (`fd` x_pubkey) for the key that signs it.
    ///
    /// Only single-key inputs carry hints.
    pub fn resolve_address_hint(&mut self, pubkey: Vec<u8>) -> Result<(), TransactionError> {
        let mut keys = self.structured_keys()?;
        if keys.x_pubkeys.len() != 1 || !matches!(keys.x_pubkeys[0], XPubKey::Address(_)) {
            return Err(TransactionError::InvalidTransaction(
                "input has no address hint".to_string(),
            ));
        }
        keys.x_pubkeys[0] = XPubKey::from_bytes(&pubkey)?;
        keys.pubkeys[0] = pubkey;
        self.encoding = Encoding::Structured(keys);
        Ok(())
    }

    fn structured_keys(&self) -> Result<InputDescriptor, TransactionError> {
        let keys = self.keys();
        match keys.script_type {
            ScriptType::Coinbase | ScriptType::Unknown => {
                Err(TransactionError::UnknownInputType(keys.script_type.to_string()))
            }
            _ => Ok(keys.clone()),
        }
    }

    fn freeze_if_complete(&mut self) {
        if let Encoding::Structured(keys) = &self.encoding {
            if keys.is_complete() {
                let bytes = keys.build_script_sig();
                self.encoding = Encoding::Raw(RawScriptSig::parse(bytes, self.outpoint.is_null()));
            }
        }
    }

    pub fn script_sig(&self) -> Vec<u8> {
        self.encoding.script_sig()
    }

    /// The script committed to by this input's sighash.
    pub fn preimage_script(&self) -> Result<Script, TransactionError> {
        let keys = self.keys();
        match keys.script_type {
            ScriptType::P2pkh => keys
                .address
                .as_ref()
                .map(Address::to_script)
                .ok_or_else(|| TransactionError::UnknownInputType("p2pkh without address".into())),
            ScriptType::P2sh => Ok(Script::multisig(keys.num_required_sigs, &keys.pubkeys)?),
            ScriptType::P2pk => keys
                .pubkeys
                .first()
                .map(|pk| Script::p2pk(pk))
                .ok_or_else(|| TransactionError::UnknownInputType("p2pk without pubkey".into())),
            other => Err(TransactionError::UnknownInputType(other.to_string())),
        }
    }

    /// Serialized size once fully signed.
    ///
    /// Complete inputs are measured exactly; others use placeholders of
    /// `ECDSA_SIG_ESTIMATE` or `SCHNORR_SIG_ESTIMATE` bytes per signature.
    pub fn size(&self, sign_schnorr: bool) -> usize {
        let script_len = match &self.encoding {
            Encoding::Raw(raw) if raw.keys.is_complete() => raw.bytes.len(),
            encoding => encoding.keys().estimate_script_sig(sign_schnorr).len(),
        };
        OUTPOINT_LEN + compact_size_len(script_len) + script_len + 4
    }

    /// Wire form. An incomplete input with a known value appends it as
    /// 8 bytes after the sequence, for offline cosigners.
    pub fn write_to(&self, writer: &mut ByteWriter) {
        self.outpoint.write_to(writer);
        writer.write_var_bytes(&self.script_sig());
        writer.write_u32_le(self.sequence);
        if let (false, Some(value)) = (self.is_complete(), self.value) {
            writer.write_u64_le(value);
        }
    }

    /// Inverse of `write_to`: an input whose scriptSig reads as incomplete
    /// must be followed by its value.
    pub fn read_from(reader: &mut ByteReader) -> Result<Self, TransactionError> {
        let outpoint = OutPoint::read_from(reader)?;
        let script_sig = reader.read_var_bytes()?.to_vec();
        let sequence = reader.read_u32_le()?;
        let mut input = Self::from_script_sig(outpoint, sequence, script_sig);
        if !input.is_complete() {
            let value = reader.read_u64_le()?;
            if value > MAX_VALUE {
                return Err(TransactionError::Serialization(format!(
                    "input value {value} out of range"
                )));
            }
            input.value = Some(value);
        }
        Ok(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xec_primitives::chainhash::Hash256;
    use xec_primitives::ec::PrivateKey;

    fn outpoint(n: u32) -> OutPoint {
        OutPoint::new(Hash256::new([0x11; 32]), n)
    }

    fn key(seed: u8) -> PrivateKey {
        PrivateKey::from_bytes(&[seed; 32]).unwrap()
    }

    fn compressed(seed: u8) -> Vec<u8> {
        key(seed).pub_key().to_compressed().to_vec()
    }

    // ---------------------------------------------------------------
    // Recognition
    // ---------------------------------------------------------------

    #[test]
    fn test_is_push_opcode() {
        assert!(!is_push_opcode(OP_CHECKMULTISIGVERIFY, 0));
        assert!(is_push_opcode(OP_0, 0));
        assert!(!is_push_opcode(OP_0, 1));
        assert!(is_push_opcode(OP_1NEGATE, 1));
        assert!(!is_push_opcode(OP_RESERVED, 0));
        assert!(!is_push_opcode(OP_16, 2));
        assert!(is_push_opcode(OP_PUSHDATA2, 256));
        assert!(!is_push_opcode(OP_PUSHDATA1, 256));
        assert!(is_push_opcode(33, 33));
        assert!(!is_push_opcode(32, 33));
    }

    #[test]
    fn test_parse_signed_p2pkh() {
        let sig = vec![0x30; 71];
        let pk = compressed(1);
        let mut script = push_data(&sig, true);
        script.extend(push_data(&pk, true));

        let input = TxInput::from_script_sig(outpoint(0), DEFAULT_SEQUENCE, script.clone());
        assert_eq!(input.script_type(), ScriptType::P2pkh);
        assert!(input.is_complete());
        assert_eq!(input.pubkeys(), &[pk.clone()]);
        assert_eq!(input.address(), Some(&Address::from_pubkey(&pk).unwrap()));
        assert_eq!(input.script_sig(), script);
        assert_eq!(input.size(false), 36 + 1 + script.len() + 4);
    }

    #[test]
    fn test_parse_unsigned_p2pkh() {
        let pk = compressed(1);
        let mut script = push_data(&[NO_SIGNATURE], true);
        script.extend(push_data(&pk, true));
        let input = TxInput::from_script_sig(outpoint(0), DEFAULT_SEQUENCE, script);
        assert_eq!(input.script_type(), ScriptType::P2pkh);
        assert_eq!(input.signatures(), &[None]);
        assert!(!input.is_complete());
        assert_eq!(input.signature_slots().len(), 1);
    }

    #[test]
    fn test_parse_p2pk_and_unknown() {
        let input = TxInput::from_script_sig(outpoint(0), 0, push_data(&[0x30; 71], true));
        assert_eq!(input.script_type(), ScriptType::P2pk);
        assert!(input.is_complete());

        // Not a template; never signed, serialized verbatim.
        let odd = vec![OP_DUP, OP_DROP];
        let input = TxInput::from_script_sig(outpoint(0), 0, odd.clone());
        assert_eq!(input.script_type(), ScriptType::Unknown);
        assert!(input.is_complete());
        assert_eq!(input.script_sig(), odd);
        assert!(input.preimage_script().is_err());

        // Truncated push.
        let input = TxInput::from_script_sig(outpoint(0), 0, vec![0x05, 0x01]);
        assert_eq!(input.script_type(), ScriptType::Unknown);
    }

    #[test]
    fn test_coinbase() {
        let input = TxInput::from_script_sig(OutPoint::null(), DEFAULT_SEQUENCE, vec![0x03, 1, 2, 3]);
        assert!(input.is_coinbase());
        assert_eq!(input.script_type(), ScriptType::Coinbase);
        assert!(input.is_complete());
        let mut input = input;
        assert!(matches!(
            input.update_signature(0, vec![1]),
            Err(TransactionError::UnknownInputType(_))
        ));
    }

    // ---------------------------------------------------------------
    // Multisig ordering
    // ---------------------------------------------------------------

    #[test]
    fn test_multisig_keys_sorted() {
        let a = compressed(1);
        let b = compressed(2);
        let c = compressed(3);
        let xs: Vec<XPubKey> = [&c, &a, &b]
            .iter()
            .map(|k| XPubKey::PubKey(k.to_vec()))
            .collect();
        let keys = InputDescriptor::p2sh_multisig(2, xs).unwrap();
        let mut sorted = vec![a, b, c];
        sorted.sort();
        assert_eq!(keys.pubkeys(), sorted.as_slice());
        assert_eq!(keys.signatures().len(), 3);

        let reversed: Vec<XPubKey> = sorted.iter().rev().map(|k| XPubKey::PubKey(k.clone())).collect();
        assert_eq!(InputDescriptor::p2sh_multisig(2, reversed).unwrap(), keys);
    }

    #[test]
    fn test_multisig_bounds() {
        let xs = vec![XPubKey::PubKey(compressed(1))];
        assert!(InputDescriptor::p2sh_multisig(0, xs.clone()).is_err());
        assert!(InputDescriptor::p2sh_multisig(2, xs).is_err());
    }

    #[test]
    fn test_partial_multisig_wire_roundtrip() {
        let xs = vec![XPubKey::PubKey(compressed(1)), XPubKey::PubKey(compressed(2))];
        let keys = InputDescriptor::p2sh_multisig(2, xs).unwrap();
        let mut input = TxInput::from_descriptor(outpoint(3), DEFAULT_SEQUENCE, keys, Some(5000)).unwrap();
        input.update_signature(1, vec![0x30; 72]).unwrap();
        assert_eq!(input.num_valid_sigs(), 1);
        assert!(!input.is_complete());

        let mut writer = ByteWriter::new();
        input.write_to(&mut writer);
        let bytes = writer.into_bytes();
        assert_eq!(&bytes[bytes.len() - 8..], &5000u64.to_le_bytes());

        let mut reader = ByteReader::new(&bytes);
        let back = TxInput::read_from(&mut reader).unwrap();
        assert_eq!(reader.remaining(), 0);
        assert_eq!(back.value(), Some(5000));
        assert_eq!(back.script_type(), ScriptType::P2sh);
        assert_eq!(back.signatures(), input.signatures());
        assert_eq!(back.pubkeys(), input.pubkeys());
        assert_eq!(back.address(), input.address());
        assert_eq!(back.signature_slots()[0].index, 0);
    }

    #[test]
    fn test_complete_input_drops_value_and_freezes() {
        let keys = InputDescriptor::p2pkh(XPubKey::PubKey(compressed(1))).unwrap();
        let mut input = TxInput::from_descriptor(outpoint(0), DEFAULT_SEQUENCE, keys, Some(1000)).unwrap();
        assert!(matches!(input.encoding(), Encoding::Structured(_)));
        input.update_signature(0, vec![0x30; 71]).unwrap();
        assert!(input.is_complete());
        assert!(matches!(input.encoding(), Encoding::Raw(_)));

        let mut writer = ByteWriter::new();
        input.write_to(&mut writer);
        assert_eq!(writer.len(), input.size(false));
    }

    #[test]
    fn test_size_estimate_placeholders() {
        let keys = InputDescriptor::p2pkh(XPubKey::PubKey(compressed(1))).unwrap();
        let input = TxInput::from_descriptor(outpoint(0), DEFAULT_SEQUENCE, keys, None).unwrap();
        // push(0x48) + push(0x21)
        assert_eq!(input.size(false), 36 + 1 + (1 + 0x48) + (1 + 0x21) + 4);
        assert_eq!(input.size(true), 36 + 1 + (1 + 0x41) + (1 + 0x21) + 4);

        let uncompressed = key(1).public_key(false).to_bytes();
        let keys = InputDescriptor::p2pkh(XPubKey::PubKey(uncompressed)).unwrap();
        let input = TxInput::from_descriptor(outpoint(0), DEFAULT_SEQUENCE, keys, None).unwrap();
        assert_eq!(input.size(true), 36 + 1 + (1 + 0x41) + (1 + 0x41) + 4);
    }

    #[test]
    fn test_address_hint_resolution() {
        let pk = compressed(4);
        let addr = Address::from_pubkey(&pk).unwrap();
        let keys = InputDescriptor::p2pkh(XPubKey::from_address(&addr)).unwrap();
        let mut input = TxInput::from_descriptor(outpoint(0), DEFAULT_SEQUENCE, keys, Some(1)).unwrap();
        assert_eq!(input.address(), Some(&addr));
        assert_eq!(input.preimage_script().unwrap(), addr.to_script());

        input.resolve_address_hint(pk.clone()).unwrap();
        assert_eq!(input.pubkeys(), &[pk]);
        assert!(input.resolve_address_hint(compressed(5)).is_err());
    }
}
