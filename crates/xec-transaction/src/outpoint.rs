//! Reference to a previous transaction output.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use xec_primitives::chainhash::Hash256;
use xec_primitives::util::{ByteReader, ByteWriter};

use crate::TransactionError;

/// Serialized size of an outpoint.
pub const OUTPOINT_LEN: usize = 36;

/// `(txid, output index)`. The txid is kept in wire order; `Display`
/// shows it reversed as `txid:n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct OutPoint {
    pub txid: Hash256,
    pub n: u32,
}

impl OutPoint {
    pub fn new(txid: Hash256, n: u32) -> Self {
        OutPoint { txid, n }
    }

    /// The null outpoint spent by coinbase inputs.
    pub fn null() -> Self {
        OutPoint {
            txid: Hash256::zero(),
            n: 0xffff_ffff,
        }
    }

    pub fn is_null(&self) -> bool {
        self.txid.is_zero()
    }

    pub fn read_from(reader: &mut ByteReader) -> Result<Self, TransactionError> {
        let txid = Hash256::new(reader.read_array()?);
        let n = reader.read_u32_le()?;
        Ok(OutPoint { txid, n })
    }

    pub fn write_to(&self, writer: &mut ByteWriter) {
        writer.write_bytes(self.txid.as_bytes());
        writer.write_u32_le(self.n);
    }

    pub fn to_bytes(&self) -> [u8; OUTPOINT_LEN] {
        let mut out = [0u8; OUTPOINT_LEN];
        out[..32].copy_from_slice(self.txid.as_bytes());
        out[32..].copy_from_slice(&self.n.to_le_bytes());
        out
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.n)
    }
}

impl FromStr for OutPoint {
    type Err = TransactionError;

    /// Parse `txid:n` with the txid in display order.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (txid, n) = s
            .split_once(':')
            .ok_or_else(|| TransactionError::Serialization(format!("bad outpoint '{s}'")))?;
        let n = n
            .parse()
            .map_err(|_| TransactionError::Serialization(format!("bad output index '{n}'")))?;
        Ok(OutPoint {
            txid: Hash256::from_hex(txid)?,
            n,
        })
    }
}

impl From<OutPoint> for String {
    fn from(o: OutPoint) -> Self {
        o.to_string()
    }
}

impl TryFrom<String> for OutPoint {
    type Error = TransactionError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TXID: &str = "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b";

    #[test]
    fn test_text_roundtrip() {
        let text = format!("{TXID}:7");
        let outpoint: OutPoint = text.parse().unwrap();
        assert_eq!(outpoint.n, 7);
        assert_eq!(outpoint.to_string(), text);
        // Wire order is the reverse of the display order.
        assert_eq!(outpoint.txid.as_bytes()[0], 0x3b);
    }

    #[test]
    fn test_wire_roundtrip() {
        let outpoint: OutPoint = format!("{TXID}:258").parse().unwrap();
        let bytes = outpoint.to_bytes();
        assert_eq!(&bytes[32..], &[0x02, 0x01, 0x00, 0x00]);
        let mut writer = ByteWriter::new();
        outpoint.write_to(&mut writer);
        assert_eq!(writer.as_bytes(), &bytes);
        let mut reader = ByteReader::new(&bytes);
        assert_eq!(OutPoint::read_from(&mut reader).unwrap(), outpoint);
    }

    #[test]
    fn test_parse_errors() {
        assert!("nocolon".parse::<OutPoint>().is_err());
        assert!(format!("{TXID}:x").parse::<OutPoint>().is_err());
        assert!("abcd:1".parse::<OutPoint>().is_err());
        assert!(OutPoint::null().is_null());
    }

    #[test]
    fn test_serde_as_string() {
        let outpoint: OutPoint = format!("{TXID}:1").parse().unwrap();
        let json = serde_json::to_string(&outpoint).unwrap();
        assert_eq!(json, format!("\"{TXID}:1\""));
        assert_eq!(serde_json::from_str::<OutPoint>(&json).unwrap(), outpoint);
    }
}
