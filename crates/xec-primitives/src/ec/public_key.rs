//! secp256k1 public key.
//!
//! A point plus the SEC1 form it was created or parsed in. The form matters
//! on this chain: an uncompressed key hashes to a different address and
//! sorts differently inside a multisig redeem script, so the original
//! encoding is preserved through every round trip.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use k256::ecdsa::VerifyingKey;
use k256::ProjectivePoint;

use crate::ec::curve::{point_from_sec1, point_to_sec1, scalar_from_bytes};
use crate::ec::schnorr;
use crate::ec::signature::Signature;
use crate::hash::hash160;
use crate::PrimitivesError;

/// Length of a compressed SEC1 public key.
pub const COMPRESSED_LEN: usize = 33;

/// Length of an uncompressed SEC1 public key.
pub const UNCOMPRESSED_LEN: usize = 65;

/// A validated secp256k1 public key.
#[derive(Clone, Debug)]
pub struct PublicKey {
    inner: VerifyingKey,
    compressed: bool,
}

/// True if `bytes` has the shape of a SEC1 key: 33 bytes led by 0x02/0x03
/// or 65 bytes led by 0x04. Does not check that the point is on the curve.
pub fn is_pubkey_shape(bytes: &[u8]) -> bool {
    matches!(
        (bytes.len(), bytes.first()),
        (COMPRESSED_LEN, Some(0x02 | 0x03)) | (UNCOMPRESSED_LEN, Some(0x04))
    )
}

impl PublicKey {
    /// Parse a SEC1-encoded key.
    ///
    /// Accepts only the compressed form (33 bytes, leading 0x02/0x03) and
    /// the uncompressed form (65 bytes, leading 0x04). Hybrid encodings and
    /// off-curve points are rejected.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PrimitivesError> {
        if !is_pubkey_shape(bytes) {
            return Err(PrimitivesError::InvalidPublicKey(format!(
                "expected 33 bytes with 02/03 prefix or 65 bytes with 04 prefix, got {} bytes",
                bytes.len()
            )));
        }
        let vk = VerifyingKey::from_sec1_bytes(bytes).map_err(|_| PrimitivesError::PointNotOnCurve)?;
        Ok(PublicKey {
            inner: vk,
            compressed: bytes.len() == COMPRESSED_LEN,
        })
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, PrimitivesError> {
        let bytes = hex::decode(hex_str)?;
        Self::from_bytes(&bytes)
    }

    pub(crate) fn from_k256_verifying_key(vk: &VerifyingKey, compressed: bool) -> Self {
        PublicKey {
            inner: *vk,
            compressed,
        }
    }

    pub(crate) fn from_projective(
        point: &ProjectivePoint,
        compressed: bool,
    ) -> Result<Self, PrimitivesError> {
        Self::from_bytes(&point_to_sec1(point, compressed)?)
    }

    /// Whether this key serializes in compressed form.
    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    /// The same point in the other (or same) SEC1 form.
    pub fn with_compression(&self, compressed: bool) -> PublicKey {
        PublicKey {
            inner: self.inner,
            compressed,
        }
    }

    /// SEC1 bytes in this key's own form.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.inner
            .to_encoded_point(self.compressed)
            .as_bytes()
            .to_vec()
    }

    pub fn to_compressed(&self) -> [u8; COMPRESSED_LEN] {
        let mut out = [0u8; COMPRESSED_LEN];
        out.copy_from_slice(self.inner.to_encoded_point(true).as_bytes());
        out
    }

    pub fn to_uncompressed(&self) -> [u8; UNCOMPRESSED_LEN] {
        let mut out = [0u8; UNCOMPRESSED_LEN];
        out.copy_from_slice(self.inner.to_encoded_point(false).as_bytes());
        out
    }

    /// Hex of `to_bytes()`.
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Hash160 of the key in its own SEC1 form.
    pub fn hash160(&self) -> [u8; 20] {
        hash160(&self.to_bytes())
    }

    /// Verify an ECDSA signature over a 32-byte digest.
    pub fn verify(&self, hash: &[u8; 32], sig: &Signature) -> bool {
        sig.verify(hash, self)
    }

    /// Verify a 64-byte Schnorr signature over a 32-byte digest.
    pub fn verify_schnorr(&self, hash: &[u8; 32], sig: &[u8; 64]) -> bool {
        schnorr::verify(self, hash, sig)
    }

    /// Return `self + tweak * G`, keeping this key's SEC1 form.
    ///
    /// Used by public BIP32 derivation. Fails when `tweak >= N` or the
    /// result is the point at infinity.
    pub fn tweak_add(&self, tweak: &[u8; 32]) -> Result<PublicKey, PrimitivesError> {
        let t = scalar_from_bytes(tweak).ok_or_else(|| {
            PrimitivesError::InvalidPublicKey("tweak is not below the curve order".to_string())
        })?;
        let point = self.to_projective_point()? + ProjectivePoint::GENERATOR * t;
        Self::from_projective(&point, self.compressed)
    }

    pub(crate) fn to_projective_point(&self) -> Result<ProjectivePoint, PrimitivesError> {
        point_from_sec1(self.inner.to_encoded_point(false).as_bytes())
    }

    pub(crate) fn verifying_key(&self) -> &VerifyingKey {
        &self.inner
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for PublicKey {}

impl Hash for PublicKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.to_bytes().hash(state);
    }
}

/// Keys order by their serialized bytes, the order multisig scripts use.
impl Ord for PublicKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_bytes().cmp(&other.to_bytes())
    }
}

impl PartialOrd for PublicKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNCOMPRESSED_OK: &str = "0411db93e1dcdb8a016b49840f8c53bc1eb68a382e97b1482ecad7b148a6909a5cb2e0eaddfb84ccf9744464f82e160bfa9b8b64f9d4c03f999b8643f656b412a3";
    const UNCOMPRESSED_X_CHANGED: &str = "0415db93e1dcdb8a016b49840f8c53bc1eb68a382e97b1482ecad7b148a6909a5cb2e0eaddfb84ccf9744464f82e160bfa9b8b64f9d4c03f999b8643f656b412a3";
    const COMPRESSED_EVEN: &str = "02ce0b14fb842b1ba549fdd675c98075f12e9c510f8ef52bd021a9a1f4809d3b4d";
    const COMPRESSED_ODD: &str = "032689c7c2dab13309fb143e0e8fe396342521887e976690b6b47f5b2a4b7d448e";

    #[test]
    fn test_parse_accepts_only_sec1_forms() {
        assert!(PublicKey::from_hex(UNCOMPRESSED_OK).is_ok());
        assert!(PublicKey::from_hex(COMPRESSED_EVEN).is_ok());
        assert!(PublicKey::from_hex(COMPRESSED_ODD).is_ok());

        assert!(matches!(
            PublicKey::from_hex(UNCOMPRESSED_X_CHANGED),
            Err(PrimitivesError::PointNotOnCurve)
        ));
        // Hybrid prefix 0x06 with a valid uncompressed body.
        let hybrid = format!("06{}", &UNCOMPRESSED_OK[2..]);
        assert!(matches!(
            PublicKey::from_hex(&hybrid),
            Err(PrimitivesError::InvalidPublicKey(_))
        ));
        assert!(PublicKey::from_bytes(&[0x05]).is_err());
        assert!(PublicKey::from_bytes(&[]).is_err());
    }

    /// The parsed form survives serialization.
    #[test]
    fn test_form_is_preserved() {
        let full = PublicKey::from_hex(UNCOMPRESSED_OK).unwrap();
        assert!(!full.is_compressed());
        assert_eq!(full.to_hex(), UNCOMPRESSED_OK);

        let short = full.with_compression(true);
        assert_eq!(short.to_bytes().len(), 33);
        assert_ne!(short.hash160(), full.hash160());
        assert_eq!(short.to_uncompressed(), full.to_uncompressed());
    }

    #[test]
    fn test_ordering_is_bytewise() {
        let a = PublicKey::from_hex(COMPRESSED_EVEN).unwrap();
        let b = PublicKey::from_hex(COMPRESSED_ODD).unwrap();
        let c = PublicKey::from_hex(UNCOMPRESSED_OK).unwrap();
        let mut keys = vec![c.clone(), b.clone(), a.clone()];
        keys.sort();
        assert_eq!(keys, vec![a, b, c]);
    }

    #[test]
    fn test_tweak_add_matches_private_tweak() {
        let sk = crate::ec::PrivateKey::generate();
        let tweak = crate::hash::sha256(b"tweak");
        let via_public = sk.pub_key().tweak_add(&tweak).unwrap();
        let via_private = sk.tweak_add(&tweak).unwrap().pub_key();
        assert_eq!(via_public, via_private);
    }
}
