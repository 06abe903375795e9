//! Signature hash computation.
//!
//! eCash signs a BIP143-style digest with the FORKID flag for replay
//! protection. Only `SIGHASH_ALL | SIGHASH_FORKID` is produced or
//! accepted here.
//!
//! The three aggregate hashes (prevouts, sequences, outputs) are shared by
//! every input of a transaction and are cached on it, keyed by the input
//! and output counts at the time they were computed.

use xec_primitives::hash::sha256d;
use xec_primitives::util::ByteWriter;

use crate::transaction::Transaction;
use crate::TransactionError;

// -----------------------------------------------------------------------
// Sighash flag constants
// -----------------------------------------------------------------------

/// Sign all inputs and all outputs.
pub const SIGHASH_ALL: u32 = 0x01;

/// Replay-protection flag required since the UAHF fork.
pub const SIGHASH_FORKID: u32 = 0x40;

/// The only supported sighash type: ALL | FORKID.
pub const SIGHASH_ALL_FORKID: u32 = SIGHASH_ALL | SIGHASH_FORKID;

// -----------------------------------------------------------------------
// Shared components
// -----------------------------------------------------------------------

/// The per-transaction part of every input's preimage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SighashComponents {
    pub n_inputs: usize,
    pub n_outputs: usize,
    pub hash_prevouts: [u8; 32],
    pub hash_sequence: [u8; 32],
    pub hash_outputs: [u8; 32],
}

impl SighashComponents {
    pub fn compute(tx: &Transaction) -> Self {
        let mut prevouts = ByteWriter::with_capacity(tx.inputs().len() * 36);
        let mut sequences = ByteWriter::with_capacity(tx.inputs().len() * 4);
        for input in tx.inputs() {
            input.outpoint.write_to(&mut prevouts);
            sequences.write_u32_le(input.sequence);
        }
        let mut outputs = ByteWriter::new();
        for output in tx.outputs() {
            output.write_to(&mut outputs);
        }
        SighashComponents {
            n_inputs: tx.inputs().len(),
            n_outputs: tx.outputs().len(),
            hash_prevouts: sha256d(prevouts.as_bytes()),
            hash_sequence: sha256d(sequences.as_bytes()),
            hash_outputs: sha256d(outputs.as_bytes()),
        }
    }

    pub fn matches(&self, tx: &Transaction) -> bool {
        self.n_inputs == tx.inputs().len() && self.n_outputs == tx.outputs().len()
    }
}

// -----------------------------------------------------------------------
// Preimage
// -----------------------------------------------------------------------

/// Reject anything but ALL | FORKID.
pub fn check_sighash_type(sighash_type: u32) -> Result<(), TransactionError> {
    if sighash_type & 0xff != SIGHASH_ALL_FORKID {
        return Err(TransactionError::UnsupportedSighash(sighash_type));
    }
    Ok(())
}

/// Build the preimage for input `index`.
///
/// The preimage consists of:
/// 1. nVersion (4 bytes LE)
/// 2. hashPrevouts (32 bytes)
/// 3. hashSequence (32 bytes)
/// 4. outpoint (32+4 bytes)
/// 5. preimage script (CompactSize + script)
/// 6. value of the spent output (8 bytes LE)
/// 7. nSequence (4 bytes LE)
/// 8. hashOutputs (32 bytes)
/// 9. nLocktime (4 bytes LE)
/// 10. sighash type (4 bytes LE)
///
/// # Arguments
/// * `tx` - The transaction being signed.
/// * `components` - Shared hashes computed for `tx`.
/// * `index` - Index of the input being signed.
/// * `sighash_type` - Must be `SIGHASH_ALL_FORKID`.
///
/// # Returns
/// The raw preimage, or an error if the type is unsupported, the index is
/// out of range, the input's value is unknown or its type cannot be signed.
pub fn preimage(
    tx: &Transaction,
    components: &SighashComponents,
    index: usize,
    sighash_type: u32,
) -> Result<Vec<u8>, TransactionError> {
    check_sighash_type(sighash_type)?;
    let input = tx.inputs().get(index).ok_or_else(|| {
        TransactionError::InvalidTransaction(format!(
            "input index {} out of range (tx has {} inputs)",
            index,
            tx.inputs().len()
        ))
    })?;
    let value = input
        .value()
        .ok_or(TransactionError::InputValueMissing(index))?;
    let script = input.preimage_script()?;

    let mut writer = ByteWriter::with_capacity(160 + script.len());
    writer.write_i32_le(tx.version);
    writer.write_bytes(&components.hash_prevouts);
    writer.write_bytes(&components.hash_sequence);
    input.outpoint.write_to(&mut writer);
    writer.write_var_bytes(script.as_bytes());
    writer.write_u64_le(value);
    writer.write_u32_le(input.sequence);
    writer.write_bytes(&components.hash_outputs);
    writer.write_u32_le(tx.locktime);
    writer.write_u32_le(sighash_type);
    Ok(writer.into_bytes())
}

/// sha256d of the preimage: the digest actually signed.
pub fn signature_hash(
    tx: &Transaction,
    components: &SighashComponents,
    index: usize,
    sighash_type: u32,
) -> Result<[u8; 32], TransactionError> {
    Ok(sha256d(&preimage(tx, components, index, sighash_type)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_all_forkid() {
        assert!(check_sighash_type(0x41).is_ok());
        // Higher bits are ignored.
        assert!(check_sighash_type(0x0100_0041).is_ok());
        assert!(matches!(
            check_sighash_type(0x01),
            Err(TransactionError::UnsupportedSighash(0x01))
        ));
        assert!(check_sighash_type(0xc1).is_err());
        assert!(check_sighash_type(0x43).is_err());
    }

    #[test]
    fn test_empty_components() {
        let tx = Transaction::new();
        let c = SighashComponents::compute(&tx);
        assert_eq!(c.hash_prevouts, sha256d(&[]));
        assert!(c.matches(&tx));
    }
}
