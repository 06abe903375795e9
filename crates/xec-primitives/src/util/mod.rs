//! Binary serialization helpers.
//!
//! `CompactSize` is the variable-length integer used for every count and
//! length prefix on the wire. `ByteReader` and `ByteWriter` are the cursor
//! types used by the transaction, BIP32 and x_pubkey codecs.

use crate::PrimitivesError;

// ---------------------------------------------------------------------------
// CompactSize
// ---------------------------------------------------------------------------

/// A CompactSize variable-length integer.
///
/// Encodes as 1 byte below `0xfd`, `0xfd` + u16 up to `0xffff`,
/// `0xfe` + u32 up to `0xffff_ffff`, and `0xff` + u64 otherwise. All
/// payloads are little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CompactSize(pub u64);

impl CompactSize {
    /// Number of bytes this value occupies on the wire.
    pub fn encoded_len(&self) -> usize {
        match self.0 {
            0..=0xfc => 1,
            0xfd..=0xffff => 3,
            0x1_0000..=0xffff_ffff => 5,
            _ => 9,
        }
    }

    /// Encode into a fresh vector.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        let v = self.0;
        match self.encoded_len() {
            1 => out.push(v as u8),
            3 => {
                out.push(0xfd);
                out.extend_from_slice(&(v as u16).to_le_bytes());
            }
            5 => {
                out.push(0xfe);
                out.extend_from_slice(&(v as u32).to_le_bytes());
            }
            _ => {
                out.push(0xff);
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        out
    }

    /// The wrapped integer.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl From<u64> for CompactSize {
    fn from(v: u64) -> Self {
        CompactSize(v)
    }
}

impl From<usize> for CompactSize {
    fn from(v: usize) -> Self {
        CompactSize(v as u64)
    }
}

/// Byte length of the CompactSize prefix for a payload of `len` bytes.
pub fn compact_size_len(len: usize) -> usize {
    CompactSize::from(len).encoded_len()
}

// ---------------------------------------------------------------------------
// ByteReader
// ---------------------------------------------------------------------------

/// A bounds-checked cursor over a byte slice.
///
/// Every read fails with `PrimitivesError::UnexpectedEof` instead of
/// panicking when the slice runs out, so it is safe on untrusted input.
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        ByteReader { data, pos: 0 }
    }

    /// Read `n` bytes and advance.
    ///
    /// # Arguments
    /// * `n` - Number of bytes to read.
    ///
    /// # Returns
    /// A borrowed slice of length `n`, or `UnexpectedEof`.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], PrimitivesError> {
        let end = self.pos.checked_add(n).ok_or(PrimitivesError::UnexpectedEof)?;
        if end > self.data.len() {
            return Err(PrimitivesError::UnexpectedEof);
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    /// Read exactly `N` bytes into an array.
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], PrimitivesError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, PrimitivesError> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16_le(&mut self) -> Result<u16, PrimitivesError> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32_le(&mut self) -> Result<u32, PrimitivesError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32_be(&mut self) -> Result<u32, PrimitivesError> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    pub fn read_i32_le(&mut self) -> Result<i32, PrimitivesError> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64_le(&mut self) -> Result<u64, PrimitivesError> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    /// Read a CompactSize.
    pub fn read_compact_size(&mut self) -> Result<CompactSize, PrimitivesError> {
        let v = match self.read_u8()? {
            0xff => self.read_u64_le()?,
            0xfe => self.read_u32_le()? as u64,
            0xfd => self.read_u16_le()? as u64,
            b => b as u64,
        };
        Ok(CompactSize(v))
    }

    /// Read a CompactSize length prefix followed by that many bytes.
    pub fn read_var_bytes(&mut self) -> Result<&'a [u8], PrimitivesError> {
        let len = self.read_compact_size()?.value();
        let len = usize::try_from(len).map_err(|_| PrimitivesError::VarIntTooLarge)?;
        self.read_bytes(len)
    }

    /// Unread byte count.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Current offset from the start of the slice.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// The unread tail, without advancing.
    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }
}

// ---------------------------------------------------------------------------
// ByteWriter
// ---------------------------------------------------------------------------

/// An append-only little-endian writer.
#[derive(Debug, Default, Clone)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        ByteWriter { buf: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        ByteWriter {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_u8(&mut self, val: u8) {
        self.buf.push(val);
    }

    pub fn write_u16_le(&mut self, val: u16) {
        self.buf.extend_from_slice(&val.to_le_bytes());
    }

    pub fn write_u32_le(&mut self, val: u32) {
        self.buf.extend_from_slice(&val.to_le_bytes());
    }

    pub fn write_u32_be(&mut self, val: u32) {
        self.buf.extend_from_slice(&val.to_be_bytes());
    }

    pub fn write_i32_le(&mut self, val: i32) {
        self.buf.extend_from_slice(&val.to_le_bytes());
    }

    pub fn write_u64_le(&mut self, val: u64) {
        self.buf.extend_from_slice(&val.to_le_bytes());
    }

    pub fn write_compact_size(&mut self, val: u64) {
        self.buf.extend_from_slice(&CompactSize(val).to_bytes());
    }

    /// Write a CompactSize length prefix followed by `bytes`.
    pub fn write_var_bytes(&mut self, bytes: &[u8]) {
        self.write_compact_size(bytes.len() as u64);
        self.write_bytes(bytes);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Boundary values pick the right size class.
    #[test]
    fn test_compact_size_boundaries() {
        let cases: [(u64, &str); 7] = [
            (0, "00"),
            (0xfc, "fc"),
            (0xfd, "fdfd00"),
            (0xffff, "fdffff"),
            (0x1_0000, "fe00000100"),
            (0xffff_ffff, "feffffffff"),
            (0x1_0000_0000, "ff0000000001000000"),
        ];
        for (value, expected) in cases {
            let cs = CompactSize(value);
            assert_eq!(hex::encode(cs.to_bytes()), expected, "value {value:#x}");
            assert_eq!(cs.encoded_len(), expected.len() / 2);
            let bytes = hex::decode(expected).unwrap();
            let mut reader = ByteReader::new(&bytes);
            assert_eq!(reader.read_compact_size().unwrap(), cs);
            assert_eq!(reader.remaining(), 0);
        }
    }

    #[test]
    fn test_reader_truncation_is_error() {
        let mut reader = ByteReader::new(&[0xfd, 0x01]);
        assert!(matches!(
            reader.read_compact_size(),
            Err(PrimitivesError::UnexpectedEof)
        ));

        let mut reader = ByteReader::new(&[0x05, 0xaa, 0xbb]);
        assert!(reader.read_var_bytes().is_err());
    }

    #[test]
    fn test_writer_reader_mixed_fields() {
        let mut w = ByteWriter::with_capacity(32);
        w.write_i32_le(-2);
        w.write_var_bytes(b"hello");
        w.write_u64_le(546);
        w.write_u32_be(0x0488_b21e);
        let bytes = w.into_bytes();

        let mut r = ByteReader::new(&bytes);
        assert_eq!(r.read_i32_le().unwrap(), -2);
        assert_eq!(r.read_var_bytes().unwrap(), b"hello");
        assert_eq!(r.read_u64_le().unwrap(), 546);
        assert_eq!(r.read_u32_be().unwrap(), 0x0488_b21e);
        assert!(r.rest().is_empty());
    }
}
