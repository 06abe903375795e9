//! BIP32 hierarchical deterministic keys.
//!
//! An extended key is a private or public key plus a chain code and its
//! position in the tree. Serialized form (78 bytes, Base58Check text):
//!
//! ```text
//! version(4) || depth(1) || parent fingerprint(4) || child number(4)
//!   || chain code(32) || key(33: 0x00||priv or compressed pub)
//! ```
//!
//! Version bytes come from `ChainParams`; nothing here assumes a network.

use std::fmt;

use crate::base58;
use crate::chain_params::ChainParams;
use crate::ec::{PrivateKey, PublicKey};
use crate::hash::{hash160, hmac_sha512};
use crate::PrimitivesError;

/// Offset added to an index to request hardened derivation.
pub const HARDENED: u32 = 0x8000_0000;

/// Length of a serialized extended key.
pub const EXTENDED_KEY_LEN: usize = 78;

/// Key material of one tree node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyMaterial {
    Private(PrivateKey),
    Public(PublicKey),
}

/// A node in a BIP32 tree. Immutable; derivation returns new nodes.
#[derive(Clone, PartialEq, Eq)]
pub struct ExtendedKey {
    depth: u8,
    parent_fingerprint: [u8; 4],
    child_number: u32,
    chain_code: [u8; 32],
    key: KeyMaterial,
}

impl ExtendedKey {
    /// Master key from a seed: `HMAC-SHA512("Bitcoin seed", seed)`.
    pub fn from_seed(seed: &[u8]) -> Result<Self, PrimitivesError> {
        let i = hmac_sha512(b"Bitcoin seed", seed);
        let key = PrivateKey::from_bytes(&i[..32])
            .map_err(|_| PrimitivesError::InvalidExtendedKey("seed yields invalid master key".into()))?;
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&i[32..]);
        Ok(ExtendedKey {
            depth: 0,
            parent_fingerprint: [0u8; 4],
            child_number: 0,
            chain_code,
            key: KeyMaterial::Private(key),
        })
    }

    pub fn is_private(&self) -> bool {
        matches!(self.key, KeyMaterial::Private(_))
    }

    pub fn private_key(&self) -> Option<&PrivateKey> {
        match &self.key {
            KeyMaterial::Private(k) => Some(k),
            KeyMaterial::Public(_) => None,
        }
    }

    /// The compressed public key of this node.
    pub fn public_key(&self) -> PublicKey {
        match &self.key {
            KeyMaterial::Private(k) => k.pub_key(),
            KeyMaterial::Public(p) => p.with_compression(true),
        }
    }

    pub fn depth(&self) -> u8 {
        self.depth
    }

    pub fn child_number(&self) -> u32 {
        self.child_number
    }

    pub fn parent_fingerprint(&self) -> [u8; 4] {
        self.parent_fingerprint
    }

    pub fn chain_code(&self) -> &[u8; 32] {
        &self.chain_code
    }

    /// First four bytes of hash160 of the compressed public key.
    pub fn fingerprint(&self) -> [u8; 4] {
        let h = hash160(&self.public_key().to_compressed());
        [h[0], h[1], h[2], h[3]]
    }

    /// The public-only view of this node.
    pub fn neuter(&self) -> ExtendedKey {
        ExtendedKey {
            key: KeyMaterial::Public(self.public_key()),
            ..self.clone()
        }
    }

    /// Derive child `index`. Indices at or above `HARDENED` need a
    /// private node.
    pub fn derive_child(&self, index: u32) -> Result<ExtendedKey, PrimitivesError> {
        let hardened = index >= HARDENED;
        let mut data = Vec::with_capacity(37);
        match &self.key {
            KeyMaterial::Private(k) if hardened => {
                data.push(0x00);
                data.extend_from_slice(&k.to_bytes());
            }
            KeyMaterial::Public(_) if hardened => {
                return Err(PrimitivesError::HardenedPublicDerivation(index));
            }
            _ => data.extend_from_slice(&self.public_key().to_compressed()),
        }
        data.extend_from_slice(&index.to_be_bytes());

        let i = hmac_sha512(&self.chain_code, &data);
        let mut tweak = [0u8; 32];
        tweak.copy_from_slice(&i[..32]);
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&i[32..]);

        let key = match &self.key {
            KeyMaterial::Private(k) => KeyMaterial::Private(k.tweak_add(&tweak)?),
            KeyMaterial::Public(p) => KeyMaterial::Public(p.with_compression(true).tweak_add(&tweak)?),
        };
        let depth = self.depth.checked_add(1).ok_or_else(|| {
            PrimitivesError::InvalidExtendedKey("maximum depth exceeded".to_string())
        })?;
        Ok(ExtendedKey {
            depth,
            parent_fingerprint: self.fingerprint(),
            child_number: index,
            chain_code,
            key,
        })
    }

    /// Derive along a sequence of indices.
    pub fn derive_indices(&self, indices: &[u32]) -> Result<ExtendedKey, PrimitivesError> {
        indices
            .iter()
            .try_fold(self.clone(), |node, &i| node.derive_child(i))
    }

    /// Derive along a text path such as `m/44'/899'/0'`.
    pub fn derive_path(&self, path: &str) -> Result<ExtendedKey, PrimitivesError> {
        self.derive_indices(&parse_path(path)?)
    }

    /// The 78-byte serialization with this network's version header.
    pub fn to_bytes(&self, params: &ChainParams) -> [u8; EXTENDED_KEY_LEN] {
        let (version, key_bytes) = match &self.key {
            KeyMaterial::Private(k) => {
                let mut kb = [0u8; 33];
                kb[1..].copy_from_slice(&k.to_bytes());
                (params.xprv_header, kb)
            }
            KeyMaterial::Public(p) => (params.xpub_header, p.to_compressed()),
        };
        let mut out = [0u8; EXTENDED_KEY_LEN];
        out[..4].copy_from_slice(&version.to_be_bytes());
        out[4] = self.depth;
        out[5..9].copy_from_slice(&self.parent_fingerprint);
        out[9..13].copy_from_slice(&self.child_number.to_be_bytes());
        out[13..45].copy_from_slice(&self.chain_code);
        out[45..].copy_from_slice(&key_bytes);
        out
    }

    /// Parse the 78-byte form.
    ///
    /// The header must be this network's xprv or xpub header and must agree
    /// with the key byte. Child 0 is derived before the key is accepted, so
    /// a corrupt key fails here rather than at first use.
    pub fn from_bytes(bytes: &[u8], params: &ChainParams) -> Result<Self, PrimitivesError> {
        let version = read_version(bytes)?;
        if version == params.xprv_header {
            Self::parse(bytes, true)
        } else if version == params.xpub_header {
            Self::parse(bytes, false)
        } else {
            Err(PrimitivesError::InvalidExtendedKey(format!(
                "unknown version header {version:#010x}"
            )))
        }
    }

    /// Parse a 78-byte public node whatever its version header.
    ///
    /// Embedded xpubs in partially signed inputs carry the header of the
    /// wallet that wrote them; derivation does not depend on it.
    pub fn from_public_bytes(bytes: &[u8]) -> Result<Self, PrimitivesError> {
        read_version(bytes)?;
        Self::parse(bytes, false)
    }

    fn parse(bytes: &[u8], private: bool) -> Result<Self, PrimitivesError> {
        let depth = bytes[4];
        let mut parent_fingerprint = [0u8; 4];
        parent_fingerprint.copy_from_slice(&bytes[5..9]);
        let child_number = u32::from_be_bytes([bytes[9], bytes[10], bytes[11], bytes[12]]);
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&bytes[13..45]);
        let key_bytes = &bytes[45..];

        let key = if private {
            if key_bytes[0] != 0x00 {
                return Err(PrimitivesError::InvalidExtendedKey(
                    "private key must be prefixed by 0x00".to_string(),
                ));
            }
            KeyMaterial::Private(PrivateKey::from_bytes(&key_bytes[1..])?)
        } else {
            if key_bytes[0] != 0x02 && key_bytes[0] != 0x03 {
                return Err(PrimitivesError::InvalidExtendedKey(
                    "public key must be compressed".to_string(),
                ));
            }
            KeyMaterial::Public(PublicKey::from_bytes(key_bytes)?)
        };
        if depth == 0 && (parent_fingerprint != [0u8; 4] || child_number != 0) {
            return Err(PrimitivesError::InvalidExtendedKey(
                "master key with non-zero parent or index".to_string(),
            ));
        }

        let node = ExtendedKey {
            depth,
            parent_fingerprint,
            child_number,
            chain_code,
            key,
        };
        node.derive_child(0)?;
        Ok(node)
    }

    /// Base58Check text (`xprv...` / `xpub...` on mainnet).
    pub fn to_string(&self, params: &ChainParams) -> String {
        base58::check_encode(&self.to_bytes(params))
    }

    pub fn from_string(text: &str, params: &ChainParams) -> Result<Self, PrimitivesError> {
        let bytes = base58::check_decode(text.trim())?;
        Self::from_bytes(&bytes, params)
    }
}

impl fmt::Debug for ExtendedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtendedKey")
            .field("depth", &self.depth)
            .field("child_number", &self.child_number)
            .field("private", &self.is_private())
            .field("public_key", &self.public_key().to_hex())
            .finish()
    }
}

fn read_version(bytes: &[u8]) -> Result<u32, PrimitivesError> {
    if bytes.len() != EXTENDED_KEY_LEN {
        return Err(PrimitivesError::InvalidKeyLength {
            expected: EXTENDED_KEY_LEN,
            got: bytes.len(),
        });
    }
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Parse `m/0'/1/2'` into indices, adding `HARDENED` for a trailing `'`.
pub fn parse_path(path: &str) -> Result<Vec<u32>, PrimitivesError> {
    let mut parts = path.trim().split('/');
    match parts.next() {
        Some("m") | Some("M") => {}
        _ => {
            return Err(PrimitivesError::InvalidPath(format!(
                "path must start with 'm': {path}"
            )))
        }
    }
    parts
        .map(|part| {
            let (digits, hardened) = match part.strip_suffix('\'') {
                Some(d) => (d, true),
                None => (part, false),
            };
            let index: u32 = digits
                .parse()
                .map_err(|_| PrimitivesError::InvalidPath(format!("bad path element '{part}'")))?;
            if index >= HARDENED {
                return Err(PrimitivesError::InvalidPath(format!(
                    "index {index} out of range"
                )));
            }
            Ok(if hardened { index + HARDENED } else { index })
        })
        .collect()
}

/// True if `text` is a valid public extended key for `params`.
pub fn is_xpub(text: &str, params: &ChainParams) -> bool {
    matches!(ExtendedKey::from_string(text, params), Ok(k) if !k.is_private())
}

/// True if `text` is a valid private extended key for `params`.
pub fn is_xprv(text: &str, params: &ChainParams) -> bool {
    matches!(ExtendedKey::from_string(text, params), Ok(k) if k.is_private())
}

pub fn is_bip32_key(text: &str, params: &ChainParams) -> bool {
    ExtendedKey::from_string(text, params).is_ok()
}
