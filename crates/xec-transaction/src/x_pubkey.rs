//! Extended pubkeys as written into unsigned and partially signed inputs.
//!
//! A cosigner that receives a partially signed transaction needs to know
//! which of its keys each slot wants, so unsigned slots carry an
//! "x_pubkey" instead of a plain public key:
//!
//! ```text
//! 02|03 <32 bytes>, 04 <64 bytes>    plain public key
//! ff <78-byte xpub> <idx> <idx>      BIP32 xpub plus [change, index]
//! fd <output script>                 "the key behind this address"
//! ```
//!
//! Each index is 2 bytes little-endian, or `ffff` followed by 4 bytes
//! little-endian when it does not fit.

use std::fmt;

use xec_primitives::bip32::{ExtendedKey, EXTENDED_KEY_LEN};
use xec_primitives::ec::is_pubkey_shape;
use xec_primitives::util::ByteReader;
use xec_script::{Address, Script};

use crate::TransactionError;

const BIP32_PREFIX: u8 = 0xff;
pub(crate) const ADDRESS_PREFIX: u8 = 0xfd;
const INDEX_ESCAPE: u16 = 0xffff;

/// Pubkey size assumed by size estimation: compressed.
pub const COMPRESSED_PUBKEY_ESTIMATE: usize = 0x21;
/// Pubkey size assumed by size estimation: uncompressed.
pub const UNCOMPRESSED_PUBKEY_ESTIMATE: usize = 0x41;

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum XPubKey {
    /// A SEC1 public key, compressed or not.
    PubKey(Vec<u8>),
    /// An account xpub and the `[change, index]` path below it.
    Bip32 {
        xpub: [u8; EXTENDED_KEY_LEN],
        derivation: [u32; 2],
    },
    /// The output script of an address whose key the signer should find.
    Address(Script),
}

impl XPubKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TransactionError> {
        match bytes.first() {
            Some(0x02 | 0x03 | 0x04) => {
                if !is_pubkey_shape(bytes) {
                    return Err(TransactionError::InvalidXPubKey(hex::encode(bytes)));
                }
                Ok(XPubKey::PubKey(bytes.to_vec()))
            }
            Some(&BIP32_PREFIX) => parse_bip32(&bytes[1..]),
            Some(&ADDRESS_PREFIX) => Ok(XPubKey::Address(Script::from_bytes(&bytes[1..]))),
            _ => Err(TransactionError::InvalidXPubKey(hex::encode(bytes))),
        }
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, TransactionError> {
        let bytes = hex::decode(hex_str)
            .map_err(|e| TransactionError::InvalidXPubKey(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// `ff` form for child `[change, index]` of a serialized account xpub.
    pub fn from_bip32(xpub: [u8; EXTENDED_KEY_LEN], change: u32, index: u32) -> Self {
        XPubKey::Bip32 {
            xpub,
            derivation: [change, index],
        }
    }

    /// `fd` form pointing at `address`.
    pub fn from_address(address: &Address) -> Self {
        XPubKey::Address(address.to_script())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            XPubKey::PubKey(pk) => pk.clone(),
            XPubKey::Bip32 { xpub, derivation } => {
                let mut out = Vec::with_capacity(1 + EXTENDED_KEY_LEN + 12);
                out.push(BIP32_PREFIX);
                out.extend_from_slice(xpub);
                for &i in derivation {
                    if i < INDEX_ESCAPE as u32 {
                        out.extend_from_slice(&(i as u16).to_le_bytes());
                    } else {
                        out.extend_from_slice(&INDEX_ESCAPE.to_le_bytes());
                        out.extend_from_slice(&i.to_le_bytes());
                    }
                }
                out
            }
            XPubKey::Address(script) => {
                let mut out = Vec::with_capacity(1 + script.len());
                out.push(ADDRESS_PREFIX);
                out.extend_from_slice(script.as_bytes());
                out
            }
        }
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// The `[change, index]` path of the BIP32 form.
    pub fn derivation(&self) -> Option<[u32; 2]> {
        match self {
            XPubKey::Bip32 { derivation, .. } => Some(*derivation),
            _ => None,
        }
    }

    /// Resolve to the bytes a signature slot is keyed and sorted by.
    ///
    /// The BIP32 form derives the child key. The address form has no key
    /// yet and resolves to its own encoding until a signer fills it in.
    pub fn to_pubkey(&self) -> Result<Vec<u8>, TransactionError> {
        match self {
            XPubKey::PubKey(pk) => Ok(pk.clone()),
            XPubKey::Bip32 { xpub, derivation } => {
                let node = ExtendedKey::from_public_bytes(xpub)?.derive_indices(derivation)?;
                Ok(node.public_key().to_compressed().to_vec())
            }
            XPubKey::Address(_) => Ok(self.to_bytes()),
        }
    }

    /// The address this slot pays from.
    pub fn address(&self) -> Result<Address, TransactionError> {
        match self {
            XPubKey::Address(script) => {
                if let Some(hash) = script.p2pkh_hash() {
                    Ok(Address::from_p2pkh_hash(hash))
                } else if let Some(hash) = script.p2sh_hash() {
                    Ok(Address::from_p2sh_hash(hash))
                } else {
                    Err(TransactionError::InvalidXPubKey(format!(
                        "address hint is not an address script: {}",
                        script.to_hex()
                    )))
                }
            }
            _ => Ok(Address::from_pubkey(&self.to_pubkey()?)?),
        }
    }

    /// Pubkey length assumed when estimating the size of a signed input.
    pub fn estimated_pubkey_size(&self) -> usize {
        match self {
            XPubKey::PubKey(pk) if pk.len() == 65 => UNCOMPRESSED_PUBKEY_ESTIMATE,
            _ => COMPRESSED_PUBKEY_ESTIMATE,
        }
    }
}

fn parse_bip32(body: &[u8]) -> Result<XPubKey, TransactionError> {
    let mut reader = ByteReader::new(body);
    let bad = || TransactionError::InvalidXPubKey(format!("ff{}", hex::encode(body)));
    let xpub: [u8; EXTENDED_KEY_LEN] = reader.read_array().map_err(|_| bad())?;
    let mut path = Vec::with_capacity(2);
    while reader.remaining() > 0 {
        let short = reader.read_u16_le().map_err(|_| bad())?;
        let index = if short == INDEX_ESCAPE {
            reader.read_u32_le().map_err(|_| bad())?
        } else {
            short as u32
        };
        path.push(index);
    }
    let derivation: [u32; 2] = path.try_into().map_err(|_| bad())?;
    Ok(XPubKey::Bip32 { xpub, derivation })
}

impl fmt::Debug for XPubKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "XPubKey({})", self.to_hex())
    }
}
