//! AES block modes used by ECIES and BIP38.
//!
//! CBC with PKCS7 padding over AES-128 for encrypted messages, and raw
//! ECB over AES-256 for the 16-byte halves of a BIP38 key. Both are
//! built directly on the `aes` block cipher.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes128, Aes256};

use crate::PrimitivesError;

pub const BLOCK_LEN: usize = 16;

/// AES-128-CBC encrypt with PKCS7 padding.
pub fn cbc_encrypt(key: &[u8; 16], iv: &[u8; 16], plaintext: &[u8]) -> Vec<u8> {
    let cipher = Aes128::new(GenericArray::from_slice(key));
    let pad = BLOCK_LEN - plaintext.len() % BLOCK_LEN;
    let mut padded = Vec::with_capacity(plaintext.len() + pad);
    padded.extend_from_slice(plaintext);
    padded.resize(plaintext.len() + pad, pad as u8);

    let mut prev = *iv;
    let mut out = Vec::with_capacity(padded.len());
    for chunk in padded.chunks_exact(BLOCK_LEN) {
        let mut block = GenericArray::clone_from_slice(chunk);
        for (b, p) in block.iter_mut().zip(prev.iter()) {
            *b ^= p;
        }
        cipher.encrypt_block(&mut block);
        prev.copy_from_slice(&block);
        out.extend_from_slice(&block);
    }
    out
}

/// AES-128-CBC decrypt and strip PKCS7 padding.
///
/// # Returns
/// `DecryptionError` if the ciphertext is not a whole number of blocks or
/// the padding is malformed.
pub fn cbc_decrypt(
    key: &[u8; 16],
    iv: &[u8; 16],
    ciphertext: &[u8],
) -> Result<Vec<u8>, PrimitivesError> {
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_LEN != 0 {
        return Err(PrimitivesError::DecryptionError(format!(
            "ciphertext length {} is not a positive multiple of {}",
            ciphertext.len(),
            BLOCK_LEN
        )));
    }
    let cipher = Aes128::new(GenericArray::from_slice(key));
    let mut prev = *iv;
    let mut out = Vec::with_capacity(ciphertext.len());
    for chunk in ciphertext.chunks_exact(BLOCK_LEN) {
        let mut block = GenericArray::clone_from_slice(chunk);
        cipher.decrypt_block(&mut block);
        for (b, p) in block.iter_mut().zip(prev.iter()) {
            *b ^= p;
        }
        prev.copy_from_slice(chunk);
        out.extend_from_slice(&block);
    }

    let pad = out[out.len() - 1] as usize;
    if pad == 0 || pad > BLOCK_LEN || out[out.len() - pad..].iter().any(|b| *b as usize != pad) {
        return Err(PrimitivesError::DecryptionError("invalid padding".to_string()));
    }
    out.truncate(out.len() - pad);
    Ok(out)
}

/// AES-256-ECB over a whole number of blocks, no padding.
pub fn ecb_encrypt(key: &[u8; 32], data: &[u8]) -> Result<Vec<u8>, PrimitivesError> {
    ecb(key, data, true)
}

pub fn ecb_decrypt(key: &[u8; 32], data: &[u8]) -> Result<Vec<u8>, PrimitivesError> {
    ecb(key, data, false)
}

fn ecb(key: &[u8; 32], data: &[u8], encrypt: bool) -> Result<Vec<u8>, PrimitivesError> {
    if data.len() % BLOCK_LEN != 0 {
        return Err(PrimitivesError::EncryptionError(format!(
            "ECB input of {} bytes is not block aligned",
            data.len()
        )));
    }
    let cipher = Aes256::new(GenericArray::from_slice(key));
    let mut out = Vec::with_capacity(data.len());
    for chunk in data.chunks_exact(BLOCK_LEN) {
        let mut block = GenericArray::clone_from_slice(chunk);
        if encrypt {
            cipher.encrypt_block(&mut block);
        } else {
            cipher.decrypt_block(&mut block);
        }
        out.extend_from_slice(&block);
    }
    Ok(out)
}

/// Constant-time comparison of two byte slices.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    /// NIST SP 800-38A F.2.1, first block.
    #[test]
    fn test_cbc_known_block() {
        let key: [u8; 16] = hex::decode("2b7e151628aed2a6abf7158809cf4f3c")
            .unwrap()
            .try_into()
            .unwrap();
        let iv: [u8; 16] = hex::decode("000102030405060708090a0b0c0d0e0f")
            .unwrap()
            .try_into()
            .unwrap();
        let pt = hex::decode("6bc1bee22e409f96e93d7e117393172a").unwrap();
        let ct = cbc_encrypt(&key, &iv, &pt);
        // A full block of input gains a full block of padding.
        assert_eq!(ct.len(), 32);
        assert_eq!(hex::encode(&ct[..16]), "7649abac8119b246cee98e9b12e9197d");
        assert_eq!(cbc_decrypt(&key, &iv, &ct).unwrap(), pt);
    }

    #[test]
    fn test_cbc_rejects_bad_padding_and_length() {
        let key = [3u8; 16];
        let iv = [4u8; 16];
        let mut ct = cbc_encrypt(&key, &iv, b"short");
        assert_eq!(cbc_decrypt(&key, &iv, &ct).unwrap(), b"short");
        assert!(cbc_decrypt(&key, &iv, &ct[..15]).is_err());
        assert!(cbc_decrypt(&key, &iv, &[]).is_err());
        ct[15] ^= 0xff;
        assert!(cbc_decrypt(&key, &iv, &ct).is_err());
    }

    /// FIPS-197 C.3 AES-256 example.
    #[test]
    fn test_ecb_aes256_vector() {
        let key: [u8; 32] =
            hex::decode("000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f")
                .unwrap()
                .try_into()
                .unwrap();
        let pt = hex::decode("00112233445566778899aabbccddeeff").unwrap();
        let ct = ecb_encrypt(&key, &pt).unwrap();
        assert_eq!(hex::encode(&ct), "8ea2b7ca516745bfeafc49904b496089");
        assert_eq!(ecb_decrypt(&key, &ct).unwrap(), pt);
        assert!(ecb_encrypt(&key, &pt[..5]).is_err());
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
    }
}
