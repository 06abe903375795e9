//! 32-byte hashes with reversed-hex display.
//!
//! Transaction ids are stored in wire (internal) byte order. Only the text
//! boundary, `Display`/`FromStr` and serde, reverses them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::hash::sha256d;
use crate::PrimitivesError;

/// Size of a hash in bytes.
pub const HASH_SIZE: usize = 32;

/// A 32-byte double-SHA-256 hash such as a transaction id.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash256([u8; HASH_SIZE]);

impl Hash256 {
    /// Wrap bytes given in internal order.
    pub const fn new(bytes: [u8; HASH_SIZE]) -> Self {
        Hash256(bytes)
    }

    /// The all-zero hash, used by coinbase outpoints.
    pub const fn zero() -> Self {
        Hash256([0u8; HASH_SIZE])
    }

    /// Hash `data` with SHA-256d.
    pub fn digest(data: &[u8]) -> Self {
        Hash256(sha256d(data))
    }

    /// Build from a slice in internal order.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, PrimitivesError> {
        let arr: [u8; HASH_SIZE] =
            bytes
                .try_into()
                .map_err(|_| PrimitivesError::InvalidKeyLength {
                    expected: HASH_SIZE,
                    got: bytes.len(),
                })?;
        Ok(Hash256(arr))
    }

    /// Parse display-order (reversed) hex.
    pub fn from_hex(hex_str: &str) -> Result<Self, PrimitivesError> {
        let mut bytes = hex::decode(hex_str)?;
        bytes.reverse();
        Self::from_slice(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// Display-order hex.
    pub fn to_hex(&self) -> String {
        let mut rev = self.0;
        rev.reverse();
        hex::encode(rev)
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({})", self.to_hex())
    }
}

impl FromStr for Hash256 {
    type Err = PrimitivesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl From<[u8; HASH_SIZE]> for Hash256 {
    fn from(bytes: [u8; HASH_SIZE]) -> Self {
        Hash256(bytes)
    }
}

impl Serialize for Hash256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Hash256::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
