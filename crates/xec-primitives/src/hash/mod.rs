//! Hash functions used by the wallet core.
//!
//! SHA-256 and its double form key transaction ids, sighash preimages and
//! Base58Check checksums. Hash160 names P2PKH and P2SH destinations.
//! SHA-512 and the two HMACs feed BIP32 and ECIES key schedules.

use hmac::{Hmac, Mac};
use ripemd::Ripemd160;
use sha2::{Digest, Sha256, Sha512};

/// Compute the SHA-256 digest of `data`.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Compute SHA-256(SHA-256(data)).
///
/// This is the hash behind transaction ids, sighash digests and every
/// Base58Check checksum.
pub fn sha256d(data: &[u8]) -> [u8; 32] {
    sha256(&sha256(data))
}

/// Compute the RIPEMD-160 digest of `data`.
pub fn ripemd160(data: &[u8]) -> [u8; 20] {
    Ripemd160::digest(data).into()
}

/// Compute RIPEMD-160(SHA-256(data)), the 20-byte hash carried by addresses.
pub fn hash160(data: &[u8]) -> [u8; 20] {
    ripemd160(&sha256(data))
}

/// Compute the SHA-512 digest of `data`.
pub fn sha512(data: &[u8]) -> [u8; 64] {
    Sha512::digest(data).into()
}

/// Compute HMAC-SHA256 of `data` under `key`.
///
/// # Arguments
/// * `key` - The HMAC key bytes (any length).
/// * `data` - The message bytes to authenticate.
///
/// # Returns
/// A 32-byte tag.
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// Compute HMAC-SHA512 of `data` under `key`.
///
/// BIP32 uses this for both the master node (`key = "Bitcoin seed"`) and
/// every child derivation step.
///
/// # Arguments
/// * `key` - The HMAC key bytes (any length).
/// * `data` - The message bytes to authenticate.
///
/// # Returns
/// A 64-byte tag.
pub fn hmac_sha512(key: &[u8], data: &[u8]) -> [u8; 64] {
    let mut mac = Hmac::<Sha512>::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ABC: &[u8] = b"abc";

    // ---- SHA-256 / SHA-256d ----

    #[test]
    fn test_sha256_abc() {
        assert_eq!(
            hex::encode(sha256(ABC)),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_sha256d_empty() {
        assert_eq!(
            hex::encode(sha256d(b"")),
            "5df6e0e2761359d30a8275058e299fcc0381534545f55cf43e41983f5d4c9456"
        );
    }

    // ---- RIPEMD-160 / Hash160 ----

    #[test]
    fn test_ripemd160_empty() {
        assert_eq!(
            hex::encode(ripemd160(b"")),
            "9c1185a5c5e9fc54612808977ee8f548b2258d31"
        );
    }

    #[test]
    fn test_hash160_empty() {
        assert_eq!(
            hex::encode(hash160(b"")),
            "b472a266d0bd89c13706a4132ccfb16f7c3b9fcb"
        );
    }

    // ---- SHA-512 ----

    #[test]
    fn test_sha512_abc() {
        assert_eq!(
            hex::encode(sha512(ABC)),
            "ddaf35a193617abacc417349ae20413112e6fa4e89a97ea20a9eeee64b55d39a\
             2192992a274fc1a836ba3c23a3feebbd454d4423643ce80e2a9ac94fa54ca49f"
        );
    }

    // ---- HMAC (RFC 4231 case 2) ----

    #[test]
    fn test_hmac_sha256_jefe() {
        let mac = hmac_sha256(b"Jefe", b"what do ya want for nothing?");
        assert_eq!(
            hex::encode(mac),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_hmac_sha512_jefe() {
        let mac = hmac_sha512(b"Jefe", b"what do ya want for nothing?");
        assert_eq!(
            hex::encode(mac),
            "164b7a7bfcf819e2e395fbe73b56e0a387bd64222e831fd610270cd7ea250554\
             9758bf75c05a994a6d034f65f8f0e6fdcaeab1a34d4a6b4b636e070a38bce737"
        );
    }
}
