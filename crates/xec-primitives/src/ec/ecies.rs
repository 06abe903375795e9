//! ECIES message encryption in the Electrum "BIE1" format.
//!
//! `base64("BIE1" || ephemeral pubkey (33) || AES-128-CBC(msg) || HMAC-SHA256)`.
//! The AES key, IV and MAC key all come from `sha512` of the compressed
//! ECDH point.

use base64::Engine;

use crate::aes::{cbc_decrypt, cbc_encrypt, constant_time_eq};
use crate::ec::private_key::PrivateKey;
use crate::ec::public_key::PublicKey;
use crate::hash::{hmac_sha256, sha512};
use crate::PrimitivesError;

pub const MAGIC: &[u8; 4] = b"BIE1";

/// Magic, ephemeral key, one AES block and the MAC.
const MIN_PAYLOAD_LEN: usize = 4 + 33 + 16 + 32;

struct KeySchedule {
    iv: [u8; 16],
    key_e: [u8; 16],
    key_m: [u8; 32],
}

fn key_schedule(shared: &PublicKey) -> KeySchedule {
    let key = sha512(&shared.to_compressed());
    let mut ks = KeySchedule {
        iv: [0u8; 16],
        key_e: [0u8; 16],
        key_m: [0u8; 32],
    };
    ks.iv.copy_from_slice(&key[..16]);
    ks.key_e.copy_from_slice(&key[16..32]);
    ks.key_m.copy_from_slice(&key[32..]);
    ks
}

/// Encrypt `message` to `recipient` with a fresh ephemeral key.
pub fn encrypt(recipient: &PublicKey, message: &[u8]) -> Result<String, PrimitivesError> {
    encrypt_with_ephemeral(recipient, message, &PrivateKey::generate())
}

fn encrypt_with_ephemeral(
    recipient: &PublicKey,
    message: &[u8],
    ephemeral: &PrivateKey,
) -> Result<String, PrimitivesError> {
    let ks = key_schedule(&ephemeral.ecdh(recipient)?);
    let ciphertext = cbc_encrypt(&ks.key_e, &ks.iv, message);

    let mut payload = Vec::with_capacity(4 + 33 + ciphertext.len() + 32);
    payload.extend_from_slice(MAGIC);
    payload.extend_from_slice(&ephemeral.pub_key().to_compressed());
    payload.extend_from_slice(&ciphertext);
    let mac = hmac_sha256(&ks.key_m, &payload);
    payload.extend_from_slice(&mac);
    Ok(base64::engine::general_purpose::STANDARD.encode(payload))
}

/// Decrypt a base64 BIE1 payload.
///
/// # Returns
/// The plaintext, `InvalidPassword` when the MAC does not match (wrong
/// key), or `DecryptionError` for a malformed payload.
pub fn decrypt(key: &PrivateKey, encoded: &str) -> Result<Vec<u8>, PrimitivesError> {
    let payload = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| PrimitivesError::DecryptionError(format!("invalid base64: {e}")))?;
    if payload.len() < MIN_PAYLOAD_LEN {
        return Err(PrimitivesError::DecryptionError(
            "invalid ciphertext: length".to_string(),
        ));
    }
    if &payload[..4] != MAGIC {
        return Err(PrimitivesError::DecryptionError(
            "invalid ciphertext: invalid magic bytes".to_string(),
        ));
    }
    let ephemeral = PublicKey::from_bytes(&payload[4..37]).map_err(|_| {
        PrimitivesError::DecryptionError("invalid ciphertext: invalid ephemeral pubkey".to_string())
    })?;
    let (body, mac) = payload.split_at(payload.len() - 32);

    let ks = key_schedule(&key.ecdh(&ephemeral)?);
    if !constant_time_eq(&hmac_sha256(&ks.key_m, body), mac) {
        return Err(PrimitivesError::InvalidPassword);
    }
    cbc_decrypt(&ks.key_e, &ks.iv, &body[37..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::sha256;

    const VECTOR: &str = "QklFMQMjvRTdvK92ex/AM94T97vML/BTWU0MU4cncikNlV/V8odD8VGKxl/ti8n59gEWiVoFoCxQboaWI70XYm4Qu3+qiHx1Z/oQe7fs929FXFbRaQ==";

    fn recipient() -> PrivateKey {
        PrivateKey::from_bytes(&sha256(b"ecies recipient")).unwrap()
    }

    #[test]
    fn test_fixed_ephemeral_vector() {
        let ephemeral = PrivateKey::from_bytes(&sha256(b"ecies ephemeral")).unwrap();
        let out = encrypt_with_ephemeral(&recipient().pub_key(), b"hello eCash", &ephemeral).unwrap();
        assert_eq!(out, VECTOR);
        assert_eq!(decrypt(&recipient(), VECTOR).unwrap(), b"hello eCash");
    }

    #[test]
    fn test_roundtrip_random_ephemeral() {
        let key = PrivateKey::generate();
        let msg = vec![0xa5u8; 100];
        let enc = encrypt(&key.public_key(false), &msg).unwrap();
        assert_eq!(decrypt(&key, &enc).unwrap(), msg);
        let empty = encrypt(&key.pub_key(), b"").unwrap();
        assert!(decrypt(&key, &empty).unwrap().is_empty());
    }

    #[test]
    fn test_wrong_key_is_invalid_password() {
        let other = PrivateKey::generate();
        assert!(matches!(
            decrypt(&other, VECTOR),
            Err(PrimitivesError::InvalidPassword)
        ));
    }

    #[test]
    fn test_malformed_payloads() {
        let raw = base64::engine::general_purpose::STANDARD.decode(VECTOR).unwrap();
        let b64 = |b: &[u8]| base64::engine::general_purpose::STANDARD.encode(b);

        assert!(matches!(
            decrypt(&recipient(), &b64(&raw[..84])),
            Err(PrimitivesError::DecryptionError(_))
        ));
        let mut bad_magic = raw.clone();
        bad_magic[3] = b'2';
        assert!(matches!(
            decrypt(&recipient(), &b64(&bad_magic)),
            Err(PrimitivesError::DecryptionError(_))
        ));
        let mut bad_point = raw.clone();
        bad_point[4] = 0x05;
        assert!(matches!(
            decrypt(&recipient(), &b64(&bad_point)),
            Err(PrimitivesError::DecryptionError(_))
        ));
        let mut bad_mac = raw;
        let last = bad_mac.len() - 1;
        bad_mac[last] ^= 1;
        assert!(matches!(
            decrypt(&recipient(), &b64(&bad_mac)),
            Err(PrimitivesError::InvalidPassword)
        ));
        assert!(decrypt(&recipient(), "not base64!").is_err());
    }
}
