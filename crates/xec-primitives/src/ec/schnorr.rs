//! BCH-style Schnorr signatures (May 2019 upgrade).
//!
//! A signature is `R.x || s` where `R` has a y coordinate that is a
//! quadratic residue mod P, and `e = sha256(R.x || compressed(P) || m)`.
//! Nonces come from RFC6979 with the algorithm tag `"Schnorr+SHA256  "`,
//! so signatures match libsecp256k1 byte for byte.

use k256::{ProjectivePoint, Scalar};
use sha2::{Digest, Sha256};

use crate::ec::curve::{
    has_square_y, point_xy, scalar_from_bytes, scalar_reduce, scalar_to_bytes, NonceStream,
    FIELD_PRIME,
};
use crate::ec::private_key::PrivateKey;
use crate::ec::public_key::PublicKey;
use crate::PrimitivesError;

/// Length of a Schnorr signature.
pub const SCHNORR_SIG_LEN: usize = 64;

const ALGO_TAG: &[u8; 16] = b"Schnorr+SHA256  ";

/// `e = sha256(r || compressed pubkey || msg) mod N`.
pub(crate) fn challenge(r: &[u8; 32], pubkey_compressed: &[u8; 33], msg: &[u8; 32]) -> Scalar {
    let mut hasher = Sha256::new();
    hasher.update(r);
    hasher.update(pubkey_compressed);
    hasher.update(msg);
    let digest: [u8; 32] = hasher.finalize().into();
    scalar_reduce(&digest)
}

/// Sign a 32-byte digest.
pub fn sign(key: &PrivateKey, msg: &[u8; 32]) -> Result<[u8; 64], PrimitivesError> {
    let d = key.to_scalar();
    let mut nonces = NonceStream::new(&key.to_bytes(), msg, None, Some(ALGO_TAG));
    let mut k = nonces.next_scalar();
    let r_point = ProjectivePoint::GENERATOR * k;
    let (rx, _) = point_xy(&r_point)?;
    if !has_square_y(&r_point)? {
        k = -k;
    }

    let e = challenge(&rx, &key.pub_key().to_compressed(), msg);
    let s = k + e * d;

    let mut sig = [0u8; SCHNORR_SIG_LEN];
    sig[..32].copy_from_slice(&rx);
    sig[32..].copy_from_slice(&scalar_to_bytes(&s));
    Ok(sig)
}

/// Verify a 64-byte signature over a 32-byte digest.
pub fn verify(pub_key: &PublicKey, msg: &[u8; 32], sig: &[u8; 64]) -> bool {
    let mut r = [0u8; 32];
    r.copy_from_slice(&sig[..32]);
    let mut s_bytes = [0u8; 32];
    s_bytes.copy_from_slice(&sig[32..]);

    if r >= FIELD_PRIME {
        return false;
    }
    let Some(s) = scalar_from_bytes(&s_bytes) else {
        return false;
    };
    let Ok(p) = pub_key.to_projective_point() else {
        return false;
    };

    let e = challenge(&r, &pub_key.to_compressed(), msg);
    let r_point = ProjectivePoint::GENERATOR * s - p * e;
    if r_point == ProjectivePoint::IDENTITY {
        return false;
    }
    match (point_xy(&r_point), has_square_y(&r_point)) {
        (Ok((x, _)), Ok(true)) => x == r,
        _ => false,
    }
}

/// Verify when the signature arrives as an untyped slice.
pub fn verify_slice(pub_key: &PublicKey, msg: &[u8; 32], sig: &[u8]) -> bool {
    match <&[u8; 64]>::try_from(sig) {
        Ok(sig) => verify(pub_key, msg, sig),
        Err(_) => false,
    }
}
