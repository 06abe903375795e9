//! The transaction: wire codec, values and fee, ordering, and signing.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, warn};
use xec_primitives::chainhash::Hash256;
use xec_primitives::ec::{is_schnorr_signature, schnorr, PrivateKey, PublicKey, Signature};
use xec_primitives::util::{compact_size_len, ByteReader, ByteWriter};
use xec_script::Address;

use crate::input::TxInput;
use crate::output::TxOutput;
use crate::sighash::{self, SighashComponents, SIGHASH_ALL_FORKID};
use crate::x_pubkey::XPubKey;
use crate::TransactionError;

/// Default transaction version.
pub const DEFAULT_VERSION: i32 = 2;

/// Smallest possible serialized input: outpoint, empty script, sequence.
const MIN_INPUT_SIZE: usize = 41;
/// Smallest possible serialized output: value, empty script.
const MIN_OUTPUT_SIZE: usize = 9;

/// Signing keys by the pubkey or x_pubkey bytes of the slot they fill,
/// with the compression flag of the key's public form.
pub type KeyPairs = HashMap<Vec<u8>, (PrivateKey, bool)>;

/// A transaction that may be only partially signed.
///
/// Inputs and outputs are reached through accessors so that structural
/// changes always drop the cached sighash components.
#[derive(Debug)]
pub struct Transaction {
    pub version: i32,
    inputs: Vec<TxInput>,
    outputs: Vec<TxOutput>,
    pub locktime: u32,
    /// Sign with Schnorr instead of ECDSA. Also drives size estimation.
    pub sign_schnorr: bool,
    sighash_cache: Mutex<Option<SighashComponents>>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::from_io(Vec::new(), Vec::new(), 0, false)
    }

    /// Build from components.
    pub fn from_io(
        inputs: Vec<TxInput>,
        outputs: Vec<TxOutput>,
        locktime: u32,
        sign_schnorr: bool,
    ) -> Self {
        Transaction {
            version: DEFAULT_VERSION,
            inputs,
            outputs,
            locktime,
            sign_schnorr,
            sighash_cache: Mutex::new(None),
        }
    }

    // -----------------------------------------------------------------
    // Deserialization
    // -----------------------------------------------------------------

    pub fn from_hex(hex_str: &str) -> Result<Self, TransactionError> {
        let bytes = hex::decode(hex_str)
            .map_err(|e| TransactionError::Serialization(format!("invalid hex: {e}")))?;
        Self::from_bytes(&bytes)
    }

    /// Parse a whole transaction. Trailing bytes are an error.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TransactionError> {
        let mut reader = ByteReader::new(bytes);
        let tx = Self::read_from(&mut reader)?;
        if reader.remaining() > 0 {
            return Err(TransactionError::Serialization(format!(
                "{} trailing bytes after transaction",
                reader.remaining()
            )));
        }
        Ok(tx)
    }

    /// Read one transaction, including the value extension of incomplete
    /// inputs.
    pub fn read_from(reader: &mut ByteReader) -> Result<Self, TransactionError> {
        let version = reader.read_i32_le()?;

        let n_inputs = read_count(reader, MIN_INPUT_SIZE, "input")?;
        let mut inputs = Vec::with_capacity(n_inputs);
        for _ in 0..n_inputs {
            inputs.push(TxInput::read_from(reader)?);
        }

        let n_outputs = read_count(reader, MIN_OUTPUT_SIZE, "output")?;
        let mut outputs = Vec::with_capacity(n_outputs);
        for _ in 0..n_outputs {
            outputs.push(TxOutput::read_from(reader)?);
        }

        let locktime = reader.read_u32_le()?;
        let mut tx = Self::from_io(inputs, outputs, locktime, false);
        tx.version = version;
        tx.sign_schnorr = (0..tx.inputs.len()).any(|i| tx.is_schnorr_signed(i));
        Ok(tx)
    }

    // -----------------------------------------------------------------
    // Serialization
    // -----------------------------------------------------------------

    /// Wire bytes. Incomplete inputs carry their value after the sequence.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = ByteWriter::new();
        writer.write_i32_le(self.version);
        writer.write_compact_size(self.inputs.len() as u64);
        for input in &self.inputs {
            input.write_to(&mut writer);
        }
        writer.write_compact_size(self.outputs.len() as u64);
        for output in &self.outputs {
            output.write_to(&mut writer);
        }
        writer.write_u32_le(self.locktime);
        writer.into_bytes()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Bytes suitable for the network. Refuses incomplete transactions,
    /// whose serialization is only meaningful to other wallets.
    pub fn serialize_for_broadcast(&self) -> Result<Vec<u8>, TransactionError> {
        let (signed, required) = self.signature_count();
        if !self.is_complete() {
            return Err(TransactionError::Incomplete { signed, required });
        }
        Ok(self.to_bytes())
    }

    /// The transaction id, once every input is signed.
    pub fn txid(&self) -> Option<Hash256> {
        if !self.is_complete() {
            return None;
        }
        Some(Hash256::digest(&self.to_bytes()))
    }

    // -----------------------------------------------------------------
    // Inputs and outputs
    // -----------------------------------------------------------------

    pub fn inputs(&self) -> &[TxInput] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[TxOutput] {
        &self.outputs
    }

    /// Mutable access to the inputs. Drops the sighash cache.
    pub fn inputs_mut(&mut self) -> &mut [TxInput] {
        self.invalidate();
        &mut self.inputs
    }

    pub fn add_inputs(&mut self, inputs: impl IntoIterator<Item = TxInput>) {
        self.invalidate();
        self.inputs.extend(inputs);
    }

    pub fn add_outputs(&mut self, outputs: impl IntoIterator<Item = TxOutput>) {
        self.invalidate();
        self.outputs.extend(outputs);
    }

    pub fn set_outputs(&mut self, outputs: Vec<TxOutput>) {
        self.invalidate();
        self.outputs = outputs;
    }

    fn invalidate(&mut self) {
        *self
            .sighash_cache
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn is_coinbase(&self) -> bool {
        self.inputs.first().is_some_and(TxInput::is_coinbase)
    }

    /// Sum of spent values.
    pub fn input_value(&self) -> Result<u64, TransactionError> {
        self.inputs.iter().enumerate().try_fold(0u64, |total, (i, input)| {
            let value = input.value().ok_or(TransactionError::InputValueMissing(i))?;
            total.checked_add(value).ok_or(TransactionError::ValueOverflow)
        })
    }

    pub fn output_value(&self) -> Result<u64, TransactionError> {
        self.outputs.iter().try_fold(0u64, |total, o| {
            total.checked_add(o.value).ok_or(TransactionError::ValueOverflow)
        })
    }

    /// `input_value - output_value`; zero for coinbase transactions.
    pub fn get_fee(&self) -> Result<i64, TransactionError> {
        if self.is_coinbase() {
            return Ok(0);
        }
        let to_i64 = |v: u64| i64::try_from(v).map_err(|_| TransactionError::ValueOverflow);
        Ok(to_i64(self.input_value()?)? - to_i64(self.output_value()?)?)
    }

    /// Randomize input order.
    pub fn shuffle_inputs<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.invalidate();
        self.inputs.shuffle(rng);
    }

    /// Put OP_RETURN outputs first, in their current order, followed by the
    /// rest either shuffled or sorted by `(value, script)`.
    pub fn sort_outputs<R: Rng + ?Sized>(&mut self, shuffle: bool, rng: &mut R) {
        self.invalidate();
        let (mut data, mut rest): (Vec<TxOutput>, Vec<TxOutput>) =
            self.outputs.drain(..).partition(TxOutput::is_opreturn);
        if shuffle {
            rest.shuffle(rng);
        } else {
            rest.sort_by_cached_key(|o| (o.value, o.script_pubkey().as_bytes().to_vec()));
        }
        data.append(&mut rest);
        self.outputs = data;
    }

    // -----------------------------------------------------------------
    // Completion and size
    // -----------------------------------------------------------------

    pub fn is_complete(&self) -> bool {
        self.inputs.iter().all(TxInput::is_complete)
    }

    /// `(signatures present, signatures required)` over all inputs.
    pub fn signature_count(&self) -> (usize, usize) {
        self.inputs.iter().fold((0, 0), |(s, r), input| {
            (s + input.num_valid_sigs(), r + input.num_required_sigs())
        })
    }

    /// Size of the fully signed transaction. Exact once complete.
    pub fn estimated_size(&self) -> usize {
        let inputs: usize = self.inputs.iter().map(|i| i.size(self.sign_schnorr)).sum();
        let outputs: usize = self.outputs.iter().map(TxOutput::size).sum();
        4 + compact_size_len(self.inputs.len())
            + inputs
            + compact_size_len(self.outputs.len())
            + outputs
            + 4
    }

    /// True if input `index` carries Schnorr signatures.
    pub fn is_schnorr_signed(&self, index: usize) -> bool {
        self.inputs
            .get(index)
            .and_then(|input| input.signatures().iter().flatten().next().cloned())
            .is_some_and(|sig| sig.len() == schnorr::SCHNORR_SIG_LEN + 1)
    }

    // -----------------------------------------------------------------
    // Sighash
    // -----------------------------------------------------------------

    fn sighash_components(&self) -> SighashComponents {
        let mut cache = self
            .sighash_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match cache.as_ref() {
            Some(components) if components.matches(self) => components.clone(),
            _ => {
                let components = SighashComponents::compute(self);
                *cache = Some(components.clone());
                components
            }
        }
    }

    /// Preimage for input `index`.
    pub fn preimage(&self, index: usize, sighash_type: u32) -> Result<Vec<u8>, TransactionError> {
        sighash::preimage(self, &self.sighash_components(), index, sighash_type)
    }

    /// Digest signed for input `index` under `SIGHASH_ALL_FORKID`.
    pub fn sighash(&self, index: usize) -> Result<[u8; 32], TransactionError> {
        sighash::signature_hash(self, &self.sighash_components(), index, SIGHASH_ALL_FORKID)
    }

    // -----------------------------------------------------------------
    // Signing
    // -----------------------------------------------------------------

    /// Fill every open slot a key in `keypairs` can sign.
    ///
    /// Slots are visited in sorted-key order. Each signature is verified
    /// before it is stored; a slot that fails is logged and left open.
    ///
    /// # Returns
    /// The number of signatures added.
    pub fn sign(&mut self, keypairs: &KeyPairs) -> Result<usize, TransactionError> {
        let mut added = 0;
        for i in 0..self.inputs.len() {
            for slot in self.inputs[i].signature_slots() {
                if self.inputs[i].is_complete() {
                    break;
                }
                let Some((key, compressed)) = keypairs
                    .get(&slot.pubkey)
                    .or_else(|| keypairs.get(&slot.x_pubkey.to_bytes()))
                else {
                    continue;
                };

                let pubkey = if let XPubKey::Address(_) = slot.x_pubkey {
                    let pubkey = key.public_key(*compressed).to_bytes();
                    if self.inputs[i].address() != Some(&Address::from_pubkey(&pubkey)?) {
                        warn!(input = i, pubkey = %hex::encode(&pubkey), "key does not match address hint");
                        continue;
                    }
                    self.inputs[i].resolve_address_hint(pubkey.clone())?;
                    pubkey
                } else {
                    slot.pubkey
                };

                let hash = self.sighash(i)?;
                let sig = if self.sign_schnorr {
                    key.sign_schnorr(&hash)?.to_vec()
                } else {
                    key.sign(&hash)?.to_der()
                };
                if !verify_signature(&pubkey, &sig, &hash) {
                    warn!(input = i, pubkey = %hex::encode(&pubkey), "signature failed self-verification, slot skipped");
                    continue;
                }
                let mut sig = sig;
                sig.push(SIGHASH_ALL_FORKID as u8);
                self.inputs[i].update_signature(slot.index, sig)?;
                added += 1;
                debug!(input = i, slot = slot.index, "input signed");
            }
        }
        Ok(added)
    }

    /// Merge one signature per input, as produced by another wallet.
    ///
    /// Each signature is matched to the open slot whose pubkey verifies it
    /// over this input's preimage. Complete inputs are skipped.
    pub fn update_signatures(&mut self, signatures: &[Vec<u8>]) -> Result<(), TransactionError> {
        if signatures.len() != self.inputs.len() {
            return Err(TransactionError::InvalidTransaction(format!(
                "{} signatures for {} inputs",
                signatures.len(),
                self.inputs.len()
            )));
        }
        for (i, full_sig) in signatures.iter().enumerate() {
            if self.inputs[i].is_complete() {
                continue;
            }
            let Some((&sighash_type, sig)) = full_sig.split_last() else {
                return Err(TransactionError::InvalidTransaction(format!(
                    "empty signature for input {i}"
                )));
            };
            sighash::check_sighash_type(sighash_type as u32)?;
            let hash = self.sighash(i)?;
            let slot = self.inputs[i]
                .signature_slots()
                .into_iter()
                .find(|slot| verify_signature(&slot.pubkey, sig, &hash))
                .ok_or_else(|| {
                    TransactionError::InvalidTransaction(format!(
                        "signature for input {i} matches no key"
                    ))
                })?;
            self.inputs[i].update_signature(slot.index, full_sig.clone())?;
        }
        Ok(())
    }
}

/// Verify `sig` (without sighash byte) over `msghash`.
///
/// 64-byte signatures are Schnorr, anything else is parsed as DER ECDSA.
pub fn verify_signature(pubkey: &[u8], sig: &[u8], msghash: &[u8; 32]) -> bool {
    let Ok(pubkey) = PublicKey::from_bytes(pubkey) else {
        return false;
    };
    if is_schnorr_signature(sig) {
        return schnorr::verify_slice(&pubkey, msghash, sig);
    }
    match Signature::from_der(sig) {
        Ok(sig) => pubkey.verify(msghash, &sig),
        Err(_) => false,
    }
}

fn read_count(
    reader: &mut ByteReader,
    min_item_size: usize,
    what: &str,
) -> Result<usize, TransactionError> {
    let count = reader.read_compact_size()?.value();
    if count > (reader.remaining() / min_item_size) as u64 {
        return Err(TransactionError::Serialization(format!(
            "{what} count {count} exceeds remaining data"
        )));
    }
    Ok(count as usize)
}

impl Clone for Transaction {
    fn clone(&self) -> Self {
        Transaction {
            version: self.version,
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
            locktime: self.locktime,
            sign_schnorr: self.sign_schnorr,
            sighash_cache: Mutex::new(None),
        }
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use xec_script::Script;

    fn p2pkh_out(tag: u8, value: u64) -> TxOutput {
        TxOutput::new(Address::from_p2pkh_hash([tag; 20]), value)
    }

    #[test]
    fn test_empty_transaction() {
        let tx = Transaction::new();
        assert_eq!(tx.to_hex(), "02000000000000000000");
        assert_eq!(tx.estimated_size(), 10);
        assert!(tx.is_complete());
        assert_eq!(Transaction::from_hex("02000000000000000000").unwrap().version, 2);
    }

    #[test]
    fn test_count_larger_than_data() {
        assert!(matches!(
            Transaction::from_hex("02000000fdffff"),
            Err(TransactionError::Serialization(_))
        ));
        assert!(Transaction::from_hex("0200").is_err());
        assert!(Transaction::from_hex("zz").is_err());
    }

    #[test]
    fn test_sort_outputs_opreturn_first() {
        let memo = TxOutput::from_script(&Script::op_return(&[b"x"]), 0);
        let mut tx = Transaction::from_io(
            vec![],
            vec![p2pkh_out(2, 700), memo.clone(), p2pkh_out(1, 700), p2pkh_out(9, 5)],
            0,
            false,
        );
        let mut rng = StdRng::seed_from_u64(1);
        tx.sort_outputs(false, &mut rng);
        let values: Vec<u64> = tx.outputs().iter().map(|o| o.value).collect();
        assert_eq!(values, vec![0, 5, 700, 700]);
        assert_eq!(tx.outputs()[0], memo);
        // Equal values tie-break on script bytes.
        assert_eq!(tx.outputs()[2], p2pkh_out(1, 700));

        tx.sort_outputs(true, &mut rng);
        assert_eq!(tx.outputs()[0], memo);
        assert_eq!(tx.output_value().unwrap(), 1405);
    }

    #[test]
    fn test_sighash_cache_follows_outputs() {
        let mut tx = Transaction::from_io(vec![], vec![p2pkh_out(1, 1)], 0, false);
        let first = tx.sighash_components();
        tx.set_outputs(vec![p2pkh_out(2, 1)]);
        let second = tx.sighash_components();
        assert_eq!(first.n_outputs, second.n_outputs);
        assert_ne!(first.hash_outputs, second.hash_outputs);
    }

    #[test]
    fn test_verify_signature_dispatch() {
        let key = PrivateKey::from_bytes(&[3u8; 32]).unwrap();
        let pubkey = key.pub_key().to_bytes();
        let hash = [7u8; 32];
        let ecdsa = key.sign(&hash).unwrap().to_der();
        let schnorr_sig = key.sign_schnorr(&hash).unwrap();
        assert!(verify_signature(&pubkey, &ecdsa, &hash));
        assert!(verify_signature(&pubkey, &schnorr_sig, &hash));
        assert!(!verify_signature(&pubkey, &schnorr_sig, &[8u8; 32]));
        assert!(!verify_signature(&[1, 2, 3], &ecdsa, &hash));
    }
}
