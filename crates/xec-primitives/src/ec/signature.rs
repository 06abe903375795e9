//! ECDSA signatures with DER serialization and deterministic nonces.
//!
//! Signing follows libsecp256k1: RFC6979 nonces with optional 32-byte
//! extra entropy, low-S normalization, and (for transactions) grinding
//! the extra entropy until R fits in 32 bytes without a sign byte.

use k256::ecdsa::signature::hazmat::PrehashVerifier;
use k256::ecdsa::{self, RecoveryId, VerifyingKey};
use k256::elliptic_curve::Field;
use k256::ProjectivePoint;

use crate::ec::curve::{
    point_xy, scalar_is_high, scalar_reduce, scalar_to_bytes, NonceStream, CURVE_ORDER,
};
use crate::ec::private_key::PrivateKey;
use crate::ec::public_key::PublicKey;
use crate::PrimitivesError;

/// An ECDSA signature `(r, s)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    r: [u8; 32],
    s: [u8; 32],
}

impl Signature {
    pub fn new(r: [u8; 32], s: [u8; 32]) -> Self {
        Signature { r, s }
    }

    pub fn r(&self) -> &[u8; 32] {
        &self.r
    }

    pub fn s(&self) -> &[u8; 32] {
        &self.s
    }

    /// Parse a strict DER signature: `30 len 02 rlen r 02 slen s`.
    ///
    /// # Returns
    /// `InvalidSignature` for any structural problem, for trailing bytes,
    /// or when `r`/`s` is zero or not below the curve order.
    pub fn from_der(bytes: &[u8]) -> Result<Self, PrimitivesError> {
        let bad = |msg: &str| PrimitivesError::InvalidSignature(format!("malformed DER: {msg}"));

        if bytes.len() < 8 || bytes.len() > 72 {
            return Err(bad("bad size"));
        }
        if bytes[0] != 0x30 {
            return Err(bad("no sequence header"));
        }
        if bytes[1] as usize != bytes.len() - 2 {
            return Err(bad("sequence length mismatch"));
        }

        let mut idx = 2;
        let mut read_int = |name: &str| -> Result<[u8; 32], PrimitivesError> {
            if idx + 2 > bytes.len() || bytes[idx] != 0x02 {
                return Err(bad(&format!("no {name} integer marker")));
            }
            let len = bytes[idx + 1] as usize;
            idx += 2;
            if len == 0 || idx + len > bytes.len() {
                return Err(bad(&format!("bogus {name} length")));
            }
            let int = &bytes[idx..idx + len];
            idx += len;
            if int[0] & 0x80 != 0 {
                return Err(bad(&format!("negative {name}")));
            }
            if len > 1 && int[0] == 0 && int[1] & 0x80 == 0 {
                return Err(bad(&format!("excess padding in {name}")));
            }
            let trimmed = if int[0] == 0 { &int[1..] } else { int };
            if trimmed.len() > 32 {
                return Err(bad(&format!("{name} too large")));
            }
            let mut out = [0u8; 32];
            out[32 - trimmed.len()..].copy_from_slice(trimmed);
            Ok(out)
        };

        let r = read_int("R")?;
        let s = read_int("S")?;
        if idx != bytes.len() {
            return Err(bad("trailing bytes"));
        }

        for (name, v) in [("R", &r), ("S", &s)] {
            if v.iter().all(|b| *b == 0) {
                return Err(PrimitivesError::InvalidSignature(format!("signature {name} is zero")));
            }
            if v.as_slice() >= CURVE_ORDER.as_slice() {
                return Err(PrimitivesError::InvalidSignature(format!(
                    "signature {name} is >= curve order"
                )));
            }
        }
        Ok(Signature { r, s })
    }

    /// Serialize as DER. S is emitted as stored; signing always stores low-S.
    pub fn to_der(&self) -> Vec<u8> {
        let rb = der_int(&self.r);
        let sb = der_int(&self.s);
        let mut out = Vec::with_capacity(6 + rb.len() + sb.len());
        out.push(0x30);
        out.push((4 + rb.len() + sb.len()) as u8);
        out.push(0x02);
        out.push(rb.len() as u8);
        out.extend_from_slice(&rb);
        out.push(0x02);
        out.push(sb.len() as u8);
        out.extend_from_slice(&sb);
        out
    }

    /// `r || s` as 64 bytes.
    pub fn to_compact(&self) -> [u8; 64] {
        let mut out = [0u8; 64];
        out[..32].copy_from_slice(&self.r);
        out[32..].copy_from_slice(&self.s);
        out
    }

    pub fn from_compact(bytes: &[u8]) -> Result<Self, PrimitivesError> {
        if bytes.len() != 64 {
            return Err(PrimitivesError::InvalidSignature(format!(
                "compact signature must be 64 bytes, got {}",
                bytes.len()
            )));
        }
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);
        Ok(Signature { r, s })
    }

    /// Plain RFC6979 signature with no extra entropy.
    pub fn sign_rfc6979(hash: &[u8; 32], key: &PrivateKey) -> Result<Self, PrimitivesError> {
        Self::sign_with_entropy(hash, key, None)
    }

    /// RFC6979 signature re-drawn with a little-endian counter as extra
    /// entropy until `r < 2^255`, so the DER encoding is at most 70 bytes.
    pub fn sign_low_r(hash: &[u8; 32], key: &PrivateKey) -> Result<Self, PrimitivesError> {
        let mut sig = Self::sign_with_entropy(hash, key, None)?;
        let mut counter: u32 = 0;
        while sig.r[0] >= 0x80 {
            counter += 1;
            let mut extra = [0u8; 32];
            extra[..4].copy_from_slice(&counter.to_le_bytes());
            sig = Self::sign_with_entropy(hash, key, Some(&extra))?;
        }
        Ok(sig)
    }

    fn sign_with_entropy(
        hash: &[u8; 32],
        key: &PrivateKey,
        extra: Option<&[u8; 32]>,
    ) -> Result<Self, PrimitivesError> {
        let d = key.to_scalar();
        let z = scalar_reduce(hash);
        let mut nonces = NonceStream::new(&key.to_bytes(), hash, extra, None);
        loop {
            let k = nonces.next_scalar();
            let (rx, _) = point_xy(&(ProjectivePoint::GENERATOR * k))?;
            let r = scalar_reduce(&rx);
            if bool::from(r.is_zero()) {
                continue;
            }
            let k_inv: k256::Scalar = Option::from(k.invert()).ok_or_else(|| {
                PrimitivesError::InvalidSignature("nonce has no inverse".to_string())
            })?;
            let mut s = k_inv * (z + r * d);
            if bool::from(s.is_zero()) {
                continue;
            }
            if scalar_is_high(&s) {
                s = -s;
            }
            return Ok(Signature {
                r: scalar_to_bytes(&r),
                s: scalar_to_bytes(&s),
            });
        }
    }

    /// Verify against a 32-byte digest. A high-S signature is normalized
    /// first, as libsecp256k1 callers do.
    pub fn verify(&self, hash: &[u8; 32], pub_key: &PublicKey) -> bool {
        match self.to_k256() {
            Ok(sig) => {
                let sig = sig.normalize_s().unwrap_or(sig);
                pub_key.verifying_key().verify_prehash(hash, &sig).is_ok()
            }
            Err(_) => false,
        }
    }

    /// Recover the signing key given a recovery id in `0..4`.
    pub fn recover(
        &self,
        hash: &[u8; 32],
        recid: u8,
        compressed: bool,
    ) -> Result<PublicKey, PrimitivesError> {
        let recovery_id = RecoveryId::from_byte(recid)
            .ok_or_else(|| PrimitivesError::InvalidSignature("invalid recovery id".to_string()))?;
        let vk = VerifyingKey::recover_from_prehash(hash, &self.to_k256()?, recovery_id)
            .map_err(|e| PrimitivesError::InvalidSignature(e.to_string()))?;
        Ok(PublicKey::from_k256_verifying_key(&vk, compressed))
    }

    fn to_k256(&self) -> Result<ecdsa::Signature, PrimitivesError> {
        ecdsa::Signature::from_scalars(k256::FieldBytes::from(self.r), k256::FieldBytes::from(self.s))
            .map_err(|e| PrimitivesError::InvalidSignature(e.to_string()))
    }
}

/// Minimal DER integer body: strip leading zeros, re-add one if the high
/// bit would read as negative.
fn der_int(val: &[u8; 32]) -> Vec<u8> {
    let start = val.iter().position(|b| *b != 0).unwrap_or(31);
    let trimmed = &val[start..];
    let mut out = Vec::with_capacity(33);
    if trimmed[0] & 0x80 != 0 {
        out.push(0x00);
    }
    out.extend_from_slice(trimmed);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::sha256;

    fn key(hex_str: &str) -> PrivateKey {
        PrivateKey::from_hex(hex_str).unwrap()
    }

    /// RFC6979 secp256k1/SHA-256 vectors (Trezor / CoreBitcoin set).
    #[test]
    fn test_rfc6979_vectors() {
        let cases = [
            (
                "cca9fbcc1b41e5a95d369eaa6ddcff73b61a4efaa279cfc6567e8daa39cbaf50",
                "sample",
                "3045022100af340daf02cc15c8d5d08d7735dfe6b98a474ed373bdb5fbecf7571be52b384202205009fb27f37034a9b24b707b7c6b79ca23ddef9e25f7282e8a797efe53a8f124",
            ),
            (
                "0000000000000000000000000000000000000000000000000000000000000001",
                "Satoshi Nakamoto",
                "3045022100934b1ea10a4b3c1757e2b0c017d0b6143ce3c9a7e6a4a49860d7a6ab210ee3d802202442ce9d2b916064108014783e923ec36b49743e2ffa1c4496f01a512aafd9e5",
            ),
            (
                "fffffffffffffffffffffffffffffffebaaedce6af48a03bbfd25e8cd0364140",
                "Satoshi Nakamoto",
                "3045022100fd567d121db66e382991534ada77a6bd3106f0a1098c231e47993447cd6af2d002206b39cd0eb1bc8603e159ef5c20a5c8ad685a45b06ce9bebed3f153d10d93bed5",
            ),
            (
                "f8b8af8ce3c7cca5e300d33939540c10d45ce001b8f252bfbc57ba0342904181",
                "Alan Turing",
                "304402207063ae83e7f62bbb171798131b4a0564b956930092b33b07b395615d9ec7e15c022058dfcc1e00a35e1572f366ffe34ba0fc47db1e7189759b9fb233c5b05ab388ea",
            ),
        ];
        for (sk, msg, expected) in cases {
            let k = key(sk);
            let hash = sha256(msg.as_bytes());
            let sig = Signature::sign_rfc6979(&hash, &k).unwrap();
            assert_eq!(hex::encode(sig.to_der()), expected, "message {msg:?}");
            assert!(k.pub_key().verify(&hash, &sig));
        }
    }

    /// Grinding leaves an already-low R untouched and forces R < 2^255.
    #[test]
    fn test_low_r_grinding() {
        let k = key("f8b8af8ce3c7cca5e300d33939540c10d45ce001b8f252bfbc57ba0342904181");
        let hash = sha256(b"Alan Turing");
        assert_eq!(
            Signature::sign_low_r(&hash, &k).unwrap(),
            Signature::sign_rfc6979(&hash, &k).unwrap()
        );

        let k = key("cca9fbcc1b41e5a95d369eaa6ddcff73b61a4efaa279cfc6567e8daa39cbaf50");
        let hash = sha256(b"sample");
        let sig = Signature::sign_low_r(&hash, &k).unwrap();
        assert!(sig.r()[0] < 0x80);
        assert_eq!(
            hex::encode(sig.to_der()),
            "3044022049a2d9262114951d5101ac3a3cd755504e7a606363b317eec856c3277bc4ef3f\
             02202e408c4c944ae57783b3fcf7b23089831c58334b04c7d0edfba63108d8ca8271"
        );
        assert!(sig.to_der().len() <= 70);
        assert!(k.pub_key().verify(&hash, &sig));
    }

    #[test]
    fn test_der_roundtrip_and_strictness() {
        let der = hex::decode(
            "304402207063ae83e7f62bbb171798131b4a0564b956930092b33b07b395615d9ec7e15c022058dfcc1e00a35e1572f366ffe34ba0fc47db1e7189759b9fb233c5b05ab388ea",
        )
        .unwrap();
        let sig = Signature::from_der(&der).unwrap();
        assert_eq!(sig.to_der(), der);

        let mut trailing = der.clone();
        trailing.push(0x01);
        assert!(Signature::from_der(&trailing).is_err());

        let mut bad_header = der.clone();
        bad_header[0] = 0x31;
        assert!(Signature::from_der(&bad_header).is_err());

        // Zero R and S.
        assert!(Signature::from_der(&[0x30, 0x06, 0x02, 0x01, 0x00, 0x02, 0x01, 0x00]).is_err());
    }

    #[test]
    fn test_recover_finds_signer() {
        let k = PrivateKey::generate();
        let hash = sha256(b"recover me");
        let sig = Signature::sign_rfc6979(&hash, &k).unwrap();
        let found = (0..4u8)
            .filter_map(|id| sig.recover(&hash, id, true).ok())
            .any(|pk| pk == k.pub_key());
        assert!(found);
    }
}
