//! Scalar and point helpers shared by the signing schemes.
//!
//! Wraps the k256 arithmetic types with the conversions the wallet needs:
//! strict scalar parsing, SEC1 point decoding, the Jacobi-symbol test used
//! by Schnorr, and the RFC6979 HMAC-DRBG nonce stream.

use std::sync::OnceLock;

use k256::elliptic_curve::ops::Reduce;
use k256::elliptic_curve::scalar::IsHigh;
use k256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use k256::elliptic_curve::PrimeField;
use k256::{AffinePoint, EncodedPoint, FieldBytes, ProjectivePoint, Scalar, U256};
use num_bigint::BigUint;
use num_traits::One;

use crate::hash::hmac_sha256;
use crate::PrimitivesError;

/// The secp256k1 group order N, big-endian.
pub const CURVE_ORDER: [u8; 32] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0xFE, 0xBA, 0xAE, 0xDC, 0xE6, 0xAF, 0x48, 0xA0, 0x3B, 0xBF, 0xD2, 0x5E, 0x8C, 0xD0, 0x36,
    0x41, 0x41,
];

/// The secp256k1 field prime P, big-endian.
pub const FIELD_PRIME: [u8; 32] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFE, 0xFF, 0xFF,
    0xFC, 0x2F,
];

// ---------------------------------------------------------------------------
// Scalars
// ---------------------------------------------------------------------------

/// Parse a big-endian scalar, rejecting values >= N.
pub fn scalar_from_bytes(bytes: &[u8; 32]) -> Option<Scalar> {
    Option::from(Scalar::from_repr(FieldBytes::clone_from_slice(bytes)))
}

/// Parse a big-endian scalar, rejecting zero and values >= N.
pub fn nonzero_scalar_from_bytes(bytes: &[u8; 32]) -> Option<Scalar> {
    scalar_from_bytes(bytes).filter(|s| !bool::from(s.is_zero()))
}

/// Interpret 32 bytes as an integer and reduce it mod N.
pub fn scalar_reduce(bytes: &[u8; 32]) -> Scalar {
    <Scalar as Reduce<U256>>::reduce(U256::from_be_slice(bytes))
}

/// Big-endian encoding of a scalar.
pub fn scalar_to_bytes(s: &Scalar) -> [u8; 32] {
    s.to_repr().into()
}

/// True if the scalar is greater than N/2.
pub fn scalar_is_high(s: &Scalar) -> bool {
    bool::from(s.is_high())
}

// ---------------------------------------------------------------------------
// Points
// ---------------------------------------------------------------------------

/// Decode a SEC1 point (33 or 65 bytes) that must lie on the curve.
pub fn point_from_sec1(bytes: &[u8]) -> Result<ProjectivePoint, PrimitivesError> {
    let encoded = EncodedPoint::from_bytes(bytes)
        .map_err(|e| PrimitivesError::InvalidPublicKey(e.to_string()))?;
    let affine: Option<AffinePoint> = AffinePoint::from_encoded_point(&encoded).into();
    let affine = affine.ok_or(PrimitivesError::PointNotOnCurve)?;
    let point = ProjectivePoint::from(affine);
    if point == ProjectivePoint::IDENTITY {
        return Err(PrimitivesError::PointAtInfinity);
    }
    Ok(point)
}

/// Affine `(x, y)` coordinates of a point, or an error at infinity.
pub fn point_xy(point: &ProjectivePoint) -> Result<([u8; 32], [u8; 32]), PrimitivesError> {
    let encoded = point.to_affine().to_encoded_point(false);
    match (encoded.x(), encoded.y()) {
        (Some(x), Some(y)) => {
            let mut xb = [0u8; 32];
            let mut yb = [0u8; 32];
            xb.copy_from_slice(x);
            yb.copy_from_slice(y);
            Ok((xb, yb))
        }
        _ => Err(PrimitivesError::PointAtInfinity),
    }
}

/// SEC1 encoding of a point.
pub fn point_to_sec1(point: &ProjectivePoint, compressed: bool) -> Result<Vec<u8>, PrimitivesError> {
    if *point == ProjectivePoint::IDENTITY {
        return Err(PrimitivesError::PointAtInfinity);
    }
    Ok(point.to_affine().to_encoded_point(compressed).as_bytes().to_vec())
}

fn field_prime() -> &'static BigUint {
    static P: OnceLock<BigUint> = OnceLock::new();
    P.get_or_init(|| BigUint::from_bytes_be(&FIELD_PRIME))
}

/// True if `y` is a quadratic residue mod P (Jacobi symbol +1).
///
/// P is prime, so the Jacobi symbol equals the Legendre symbol
/// `y^((P-1)/2) mod P`.
pub fn is_quadratic_residue(y: &[u8; 32]) -> bool {
    let p = field_prime();
    let y = BigUint::from_bytes_be(y);
    let exp = (p - BigUint::one()) >> 1;
    y.modpow(&exp, p).is_one()
}

/// True if the point's y coordinate has Jacobi symbol +1.
pub fn has_square_y(point: &ProjectivePoint) -> Result<bool, PrimitivesError> {
    let (_, y) = point_xy(point)?;
    Ok(is_quadratic_residue(&y))
}

// ---------------------------------------------------------------------------
// RFC6979 nonces
// ---------------------------------------------------------------------------

/// RFC6979 HMAC-SHA256 DRBG seeded the way libsecp256k1 seeds it:
/// `key || msg || [extra32] || [algo16]`.
pub(crate) struct NonceStream {
    k: [u8; 32],
    v: [u8; 32],
    started: bool,
}

impl NonceStream {
    pub(crate) fn new(
        secret: &[u8; 32],
        msg: &[u8; 32],
        extra: Option<&[u8; 32]>,
        algo16: Option<&[u8; 16]>,
    ) -> Self {
        let mut seed = Vec::with_capacity(112);
        seed.extend_from_slice(secret);
        seed.extend_from_slice(&scalar_to_bytes(&scalar_reduce(msg)));
        if let Some(extra) = extra {
            seed.extend_from_slice(extra);
        }
        if let Some(algo) = algo16 {
            seed.extend_from_slice(algo);
        }

        let mut k = [0u8; 32];
        let mut v = [1u8; 32];
        for tag in [0x00u8, 0x01] {
            let mut data = Vec::with_capacity(33 + seed.len());
            data.extend_from_slice(&v);
            data.push(tag);
            data.extend_from_slice(&seed);
            k = hmac_sha256(&k, &data);
            v = hmac_sha256(&k, &v);
        }
        NonceStream { k, v, started: false }
    }

    /// Next candidate in `[1, N)`.
    pub(crate) fn next_scalar(&mut self) -> Scalar {
        loop {
            if self.started {
                let mut data = Vec::with_capacity(33);
                data.extend_from_slice(&self.v);
                data.push(0x00);
                self.k = hmac_sha256(&self.k, &data);
                self.v = hmac_sha256(&self.k, &self.v);
            }
            self.started = true;
            self.v = hmac_sha256(&self.k, &self.v);
            if let Some(s) = nonzero_scalar_from_bytes(&self.v) {
                return s;
            }
        }
    }
}
