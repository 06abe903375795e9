//! Transaction output: a value and the destination it pays.

use xec_primitives::util::{compact_size_len, ByteReader, ByteWriter};
use xec_script::{Destination, Script};

use crate::TransactionError;

/// Largest value an amount on the wire may carry.
pub const MAX_VALUE: u64 = i64::MAX as u64;

/// A single output.
///
/// The destination is classified once from the output script and turned
/// back into the same script on serialization.
///
/// # Wire format
///
/// | Field         | Size          |
/// |---------------|---------------|
/// | value         | 8 bytes (LE)  |
/// | script length | CompactSize   |
/// | scriptPubKey  | variable      |
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxOutput {
    pub destination: Destination,
    /// Amount in satoshis.
    pub value: u64,
}

impl TxOutput {
    pub fn new(destination: impl Into<Destination>, value: u64) -> Self {
        TxOutput {
            destination: destination.into(),
            value,
        }
    }

    /// An output paying `value` to the raw `script`.
    pub fn from_script(script: &Script, value: u64) -> Self {
        TxOutput {
            destination: Destination::from_script_pubkey(script.as_bytes()),
            value,
        }
    }

    pub fn script_pubkey(&self) -> Script {
        self.destination.to_script()
    }

    pub fn is_opreturn(&self) -> bool {
        self.destination.is_opreturn()
    }

    /// Serialized size in bytes.
    pub fn size(&self) -> usize {
        let script_len = self.script_pubkey().len();
        8 + compact_size_len(script_len) + script_len
    }

    /// Deserialize an output.
    ///
    /// # Arguments
    /// * `reader` - Positioned at the start of an encoded output.
    ///
    /// # Returns
    /// The output, or a `TransactionError` if the data is truncated or the
    /// value does not fit in an `i64`.
    pub fn read_from(reader: &mut ByteReader) -> Result<Self, TransactionError> {
        let value = reader.read_u64_le()?;
        if value > MAX_VALUE {
            return Err(TransactionError::Serialization(format!(
                "output value {value} out of range"
            )));
        }
        let script = reader.read_var_bytes()?;
        Ok(TxOutput {
            destination: Destination::from_script_pubkey(script),
            value,
        })
    }

    pub fn write_to(&self, writer: &mut ByteWriter) {
        writer.write_u64_le(self.value);
        writer.write_var_bytes(self.script_pubkey().as_bytes());
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = ByteWriter::with_capacity(self.size());
        self.write_to(&mut writer);
        writer.into_bytes()
    }
}
