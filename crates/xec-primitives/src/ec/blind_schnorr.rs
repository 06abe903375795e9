//! Blind Schnorr signatures.
//!
//! The signer publishes `R = kG` and later answers exactly one blinded
//! challenge with `s = k + e·x`. The requester blinds `R` with random
//! scalars `a`, `b` and a sign flip `c`, so the signer never learns the
//! message or the final signature:
//!
//! ```text
//! R' = c·(R + aG + bP)        with c in {-1, +1} making R'.y a residue
//! e  = H(R'.x || P || m)
//! e' = c·e + b                (sent to the signer)
//! s  = k + e'·x               (returned by the signer)
//! s' = c·(s + a)              (final signature is R'.x || s')
//! ```

use k256::elliptic_curve::Field;
use k256::{ProjectivePoint, Scalar};
use rand::rngs::OsRng;

use crate::ec::curve::{has_square_y, point_xy, scalar_from_bytes, scalar_to_bytes};
use crate::ec::private_key::PrivateKey;
use crate::ec::public_key::PublicKey;
use crate::ec::schnorr;
use crate::PrimitivesError;

/// Holds the signing key and a single-use nonce.
pub struct BlindSigner {
    key: PrivateKey,
    nonce: Option<Scalar>,
    r: PublicKey,
}

impl BlindSigner {
    /// Create a signer with a fresh random nonce.
    pub fn new(key: PrivateKey) -> Result<Self, PrimitivesError> {
        let k = loop {
            let k = Scalar::random(&mut OsRng);
            if !bool::from(k.is_zero()) {
                break k;
            }
        };
        let r = PublicKey::from_projective(&(ProjectivePoint::GENERATOR * k), true)?;
        Ok(BlindSigner {
            key,
            nonce: Some(k),
            r,
        })
    }

    /// The nonce commitment `R` to hand to the requester.
    pub fn r(&self) -> &PublicKey {
        &self.r
    }

    pub fn pub_key(&self) -> PublicKey {
        self.key.pub_key()
    }

    /// Answer the blinded challenge. The nonce is consumed on the first
    /// call; any later call fails with `NonceReused`.
    pub fn sign(&mut self, blinded_e: &[u8; 32]) -> Result<[u8; 32], PrimitivesError> {
        let e = scalar_from_bytes(blinded_e).ok_or_else(|| {
            PrimitivesError::InvalidSignature("blinded challenge is not below the order".into())
        })?;
        let k = self.nonce.take().ok_or(PrimitivesError::NonceReused)?;
        let s = k + e * self.key.to_scalar();
        Ok(scalar_to_bytes(&s))
    }

    /// Whether the nonce is still unused.
    pub fn is_fresh(&self) -> bool {
        self.nonce.is_some()
    }
}

/// Requester side: blinds a message for a given signer and unblinds the reply.
pub struct BlindSignatureRequest {
    pub_key: PublicKey,
    message: [u8; 32],
    a: Scalar,
    flip: bool,
    r_new_x: [u8; 32],
    blinded_e: Scalar,
}

impl BlindSignatureRequest {
    /// Blind `message` against the signer's `pub_key` and nonce commitment `r`.
    pub fn new(
        pub_key: &PublicKey,
        r: &PublicKey,
        message: &[u8; 32],
    ) -> Result<Self, PrimitivesError> {
        let a = Scalar::random(&mut OsRng);
        let b = Scalar::random(&mut OsRng);
        Self::with_blinding(pub_key, r, message, a, b)
    }

    fn with_blinding(
        pub_key: &PublicKey,
        r: &PublicKey,
        message: &[u8; 32],
        a: Scalar,
        b: Scalar,
    ) -> Result<Self, PrimitivesError> {
        let p = pub_key.to_projective_point()?;
        let r_prime = r.to_projective_point()? + ProjectivePoint::GENERATOR * a + p * b;
        let flip = !has_square_y(&r_prime)?;
        let r_new = if flip { -r_prime } else { r_prime };
        let (r_new_x, _) = point_xy(&r_new)?;

        let e = schnorr::challenge(&r_new_x, &pub_key.to_compressed(), message);
        let blinded_e = (if flip { -e } else { e }) + b;

        Ok(BlindSignatureRequest {
            pub_key: pub_key.clone(),
            message: *message,
            a,
            flip,
            r_new_x,
            blinded_e,
        })
    }

    /// The blinded challenge `e'` to send to the signer.
    pub fn request(&self) -> [u8; 32] {
        scalar_to_bytes(&self.blinded_e)
    }

    /// Unblind the signer's `s` and verify the resulting signature.
    ///
    /// # Returns
    /// The 64-byte Schnorr signature over the original message, or
    /// `InvalidSignature` if the signer's reply does not verify.
    pub fn finalize(&self, s: &[u8; 32]) -> Result<[u8; 64], PrimitivesError> {
        let s = scalar_from_bytes(s).ok_or_else(|| {
            PrimitivesError::InvalidSignature("blind reply is not below the order".into())
        })?;
        let unblinded = s + self.a;
        let s_new = if self.flip { -unblinded } else { unblinded };

        let mut sig = [0u8; 64];
        sig[..32].copy_from_slice(&self.r_new_x);
        sig[32..].copy_from_slice(&scalar_to_bytes(&s_new));
        if !schnorr::verify(&self.pub_key, &self.message, &sig) {
            return Err(PrimitivesError::InvalidSignature(
                "unblinded signature does not verify".into(),
            ));
        }
        Ok(sig)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::sha256;

    #[test]
    fn test_blind_roundtrip_verifies() {
        let mut signer = BlindSigner::new(PrivateKey::generate()).unwrap();
        let msg = sha256(b"blind me");
        let req = BlindSignatureRequest::new(&signer.pub_key(), signer.r(), &msg).unwrap();
        let s = signer.sign(&req.request()).unwrap();
        let sig = req.finalize(&s).unwrap();
        assert!(signer.pub_key().verify_schnorr(&msg, &sig));
        // The signer never saw R'.x.
        assert_ne!(&sig[..32], &signer.r().to_compressed()[1..]);
    }

    /// Both sign-flip branches unblind correctly.
    #[test]
    fn test_both_flip_branches() {
        let mut seen = [false, false];
        for i in 1u64..64 {
            let mut signer = BlindSigner::new(PrivateKey::generate()).unwrap();
            let msg = sha256(&i.to_le_bytes());
            let req = BlindSignatureRequest::with_blinding(
                &signer.pub_key(),
                signer.r(),
                &msg,
                Scalar::from(i),
                Scalar::from(i * 7 + 3),
            )
            .unwrap();
            seen[req.flip as usize] = true;
            let s = signer.sign(&req.request()).unwrap();
            assert!(req.finalize(&s).is_ok());
            if seen[0] && seen[1] {
                return;
            }
        }
        panic!("flip branch not exercised: {seen:?}");
    }

    #[test]
    fn test_nonce_is_single_use() {
        let mut signer = BlindSigner::new(PrivateKey::generate()).unwrap();
        assert!(signer.is_fresh());
        signer.sign(&[1u8; 32]).unwrap();
        assert!(!signer.is_fresh());
        assert!(matches!(
            signer.sign(&[2u8; 32]),
            Err(PrimitivesError::NonceReused)
        ));
    }

    #[test]
    fn test_bad_reply_rejected() {
        let mut signer = BlindSigner::new(PrivateKey::generate()).unwrap();
        let msg = [9u8; 32];
        let req = BlindSignatureRequest::new(&signer.pub_key(), signer.r(), &msg).unwrap();
        let mut s = signer.sign(&req.request()).unwrap();
        s[31] ^= 1;
        assert!(matches!(
            req.finalize(&s),
            Err(PrimitivesError::InvalidSignature(_))
        ));
    }
}
