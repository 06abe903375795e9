//! secp256k1 private key.
//!
//! Wraps the k256 signing key and exposes the operations the wallet needs:
//! ECDSA and Schnorr signing over a 32-byte digest, ECDH, and the
//! additive tweak used by BIP32 child derivation.

use k256::ecdsa::SigningKey;
use k256::{ProjectivePoint, Scalar};
use rand::rngs::OsRng;

use crate::ec::curve::{nonzero_scalar_from_bytes, scalar_from_bytes, scalar_to_bytes};
use crate::ec::public_key::PublicKey;
use crate::ec::schnorr;
use crate::ec::signature::Signature;
use crate::PrimitivesError;

/// Length of a serialized private key in bytes.
pub const PRIVATE_KEY_LEN: usize = 32;

/// A secp256k1 secret scalar in `[1, N)`.
#[derive(Clone, Debug)]
pub struct PrivateKey {
    inner: SigningKey,
}

impl PrivateKey {
    /// Generate a fresh key from the OS random number generator.
    pub fn generate() -> Self {
        PrivateKey {
            inner: SigningKey::random(&mut OsRng),
        }
    }

    /// Create a private key from a raw 32-byte big-endian scalar.
    ///
    /// # Arguments
    /// * `bytes` - Exactly 32 bytes.
    ///
    /// # Returns
    /// `Ok(PrivateKey)`, or `InvalidPrivateKey` if the length is wrong or
    /// the scalar is zero or not below the curve order.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PrimitivesError> {
        if bytes.len() != PRIVATE_KEY_LEN {
            return Err(PrimitivesError::InvalidPrivateKey(format!(
                "expected {} bytes, got {}",
                PRIVATE_KEY_LEN,
                bytes.len()
            )));
        }
        let signing_key = SigningKey::from_bytes(bytes.into())
            .map_err(|e| PrimitivesError::InvalidPrivateKey(e.to_string()))?;
        Ok(PrivateKey { inner: signing_key })
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, PrimitivesError> {
        let bytes = hex::decode(hex_str)?;
        Self::from_bytes(&bytes)
    }

    pub(crate) fn from_scalar(scalar: &Scalar) -> Result<Self, PrimitivesError> {
        Self::from_bytes(&scalar_to_bytes(scalar))
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.inner.to_bytes().into()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// The compressed public key.
    pub fn pub_key(&self) -> PublicKey {
        PublicKey::from_k256_verifying_key(self.inner.verifying_key(), true)
    }

    /// The public key in the requested SEC1 form.
    pub fn public_key(&self, compressed: bool) -> PublicKey {
        PublicKey::from_k256_verifying_key(self.inner.verifying_key(), compressed)
    }

    /// ECDSA-sign a 32-byte digest.
    ///
    /// Uses RFC6979 nonces, grinds for a low R as Bitcoin Core does, and
    /// normalizes S to the lower half of the order.
    pub fn sign(&self, hash: &[u8; 32]) -> Result<Signature, PrimitivesError> {
        Signature::sign_low_r(hash, self)
    }

    /// Schnorr-sign a 32-byte digest, returning `R.x || s`.
    pub fn sign_schnorr(&self, hash: &[u8; 32]) -> Result<[u8; 64], PrimitivesError> {
        schnorr::sign(self, hash)
    }

    /// ECDH: multiply `their_key` by this scalar.
    ///
    /// # Returns
    /// The shared point as a compressed `PublicKey`.
    pub fn ecdh(&self, their_key: &PublicKey) -> Result<PublicKey, PrimitivesError> {
        let shared = their_key.to_projective_point()? * self.to_scalar();
        PublicKey::from_projective(&shared, true)
    }

    /// Return `(self + tweak) mod N`.
    ///
    /// Fails when `tweak >= N` or the sum is zero, which BIP32 treats as
    /// an invalid child.
    pub fn tweak_add(&self, tweak: &[u8; 32]) -> Result<PrivateKey, PrimitivesError> {
        let t = scalar_from_bytes(tweak).ok_or_else(|| {
            PrimitivesError::InvalidPrivateKey("tweak is not below the curve order".to_string())
        })?;
        let sum = self.to_scalar() + t;
        let bytes = scalar_to_bytes(&sum);
        nonzero_scalar_from_bytes(&bytes)
            .ok_or_else(|| PrimitivesError::InvalidPrivateKey("tweaked key is zero".to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// The public point `self * G`.
    pub(crate) fn public_point(&self) -> ProjectivePoint {
        ProjectivePoint::GENERATOR * self.to_scalar()
    }

    pub(crate) fn to_scalar(&self) -> Scalar {
        *self.inner.as_nonzero_scalar().as_ref()
    }
}

impl PartialEq for PrivateKey {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for PrivateKey {}
